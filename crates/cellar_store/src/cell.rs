//! Cell, mutation, and row-range primitives shared by the store and its
//! clients.
//!
//! A cell is the atom of the store: `(row, family, qualifier) -> value`,
//! sorted lexicographically by the three key components in that order. A
//! mutation groups column updates for one row and is applied atomically at
//! the row level.

/// Sort key of one cell: row, then column family, then column qualifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CellKey {
    pub row: Vec<u8>,
    pub family: Vec<u8>,
    pub qualifier: Vec<u8>,
}

impl CellKey {
    pub fn new(
        row: impl Into<Vec<u8>>,
        family: impl Into<Vec<u8>>,
        qualifier: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            row: row.into(),
            family: family.into(),
            qualifier: qualifier.into(),
        }
    }
}

/// One stored cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    pub key: CellKey,
    pub value: Vec<u8>,
}

/// One column write inside a mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnUpdate {
    pub family: Vec<u8>,
    pub qualifier: Vec<u8>,
    pub value: Vec<u8>,
}

/// A set of column updates sharing one row, committed atomically at the
/// row level. The store only supports append-style writes; there is no
/// per-cell delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation {
    row: Vec<u8>,
    updates: Vec<ColumnUpdate>,
}

impl Mutation {
    pub fn new(row: impl Into<Vec<u8>>) -> Self {
        Self {
            row: row.into(),
            updates: Vec::new(),
        }
    }

    /// Queue a `(family, qualifier) -> value` write for this row.
    pub fn put(
        &mut self,
        family: impl Into<Vec<u8>>,
        qualifier: impl Into<Vec<u8>>,
        value: impl Into<Vec<u8>>,
    ) {
        self.updates.push(ColumnUpdate {
            family: family.into(),
            qualifier: qualifier.into(),
            value: value.into(),
        });
    }

    pub fn row(&self) -> &[u8] {
        &self.row
    }

    pub fn updates(&self) -> &[ColumnUpdate] {
        &self.updates
    }

    /// Rough buffered size used by writers for flush accounting.
    pub fn estimated_size(&self) -> usize {
        self.row.len()
            + self
                .updates
                .iter()
                .map(|u| u.family.len() + u.qualifier.len() + u.value.len())
                .sum::<usize>()
    }

    /// Expand into one cell per column update.
    pub fn into_cells(self) -> Vec<Cell> {
        let row = self.row;
        self.updates
            .into_iter()
            .map(|u| Cell {
                key: CellKey {
                    row: row.clone(),
                    family: u.family,
                    qualifier: u.qualifier,
                },
                value: u.value,
            })
            .collect()
    }
}

/// Immediate successor of a byte string in lexicographic order.
pub fn successor(row: &[u8]) -> Vec<u8> {
    let mut next = Vec::with_capacity(row.len() + 1);
    next.extend_from_slice(row);
    next.push(0);
    next
}

/// A contiguous span of rows with per-end inclusivity. `None` endpoints are
/// unbounded. Ranges address whole rows: a point range covers every cell of
/// that row.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RowRange {
    pub start: Option<Vec<u8>>,
    pub start_inclusive: bool,
    pub end: Option<Vec<u8>>,
    pub end_inclusive: bool,
}

impl RowRange {
    /// The unbounded range.
    pub fn all() -> Self {
        Self {
            start: None,
            start_inclusive: false,
            end: None,
            end_inclusive: false,
        }
    }

    /// A range covering exactly one row.
    pub fn exact(row: impl Into<Vec<u8>>) -> Self {
        let row = row.into();
        Self {
            start: Some(row.clone()),
            start_inclusive: true,
            end: Some(row),
            end_inclusive: true,
        }
    }

    pub fn new(
        start: Option<Vec<u8>>,
        start_inclusive: bool,
        end: Option<Vec<u8>>,
        end_inclusive: bool,
    ) -> Self {
        Self {
            start,
            start_inclusive,
            end,
            end_inclusive,
        }
    }

    /// True when the range pins a single row on both ends.
    pub fn is_point(&self) -> bool {
        match (&self.start, &self.end) {
            (Some(start), Some(end)) => {
                start == end && self.start_inclusive && self.end_inclusive
            }
            _ => false,
        }
    }

    /// Half-open `[lo, hi)` form over raw row bytes. Exclusive starts and
    /// inclusive ends are normalized through the byte-string successor.
    pub fn normalized(&self) -> (Option<Vec<u8>>, Option<Vec<u8>>) {
        let lo = self.start.as_ref().map(|start| {
            if self.start_inclusive {
                start.clone()
            } else {
                successor(start)
            }
        });
        let hi = self.end.as_ref().map(|end| {
            if self.end_inclusive {
                successor(end)
            } else {
                end.clone()
            }
        });
        (lo, hi)
    }

    /// True when `row` sorts before the start of this range.
    pub fn before_start(&self, row: &[u8]) -> bool {
        match &self.start {
            None => false,
            Some(start) => {
                if self.start_inclusive {
                    row < start.as_slice()
                } else {
                    row <= start.as_slice()
                }
            }
        }
    }

    /// True when `row` sorts after the end of this range.
    pub fn after_end(&self, row: &[u8]) -> bool {
        match &self.end {
            None => false,
            Some(end) => {
                if self.end_inclusive {
                    row > end.as_slice()
                } else {
                    row >= end.as_slice()
                }
            }
        }
    }

    pub fn contains(&self, row: &[u8]) -> bool {
        !self.before_start(row) && !self.after_end(row)
    }
}
