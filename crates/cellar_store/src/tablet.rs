//! Tablet bookkeeping for the embedded node.
//!
//! Each table is partitioned into tablets by a sorted set of split points;
//! a tablet covers `(previous split, split]` and the default tablet covers
//! everything after the last split. Tablet ownership is published through a
//! synthetic metadata catalog table so location discovery works the same
//! way it would against a remote cluster: by scanning the catalog's `loc`
//! column family.

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, BTreeSet};
use std::hash::{Hash, Hasher};

use crate::cell::{Cell, CellKey, RowRange};
use crate::kv::TableId;

/// Name of the metadata catalog table every node maintains.
pub const METADATA_TABLE: &str = "cellar.metadata";
/// Column family of tablet-location entries in the metadata catalog.
pub const METADATA_LOCATION_FAMILY: &[u8] = b"loc";

/// Scopes at which a server-side iterator applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum IteratorScope {
    Scan,
    MinorCompaction,
    MajorCompaction,
}

impl IteratorScope {
    /// All three scopes.
    pub fn all() -> BTreeSet<IteratorScope> {
        [
            IteratorScope::Scan,
            IteratorScope::MinorCompaction,
            IteratorScope::MajorCompaction,
        ]
        .into_iter()
        .collect()
    }
}

/// Server-side combiner families the node understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CombinerKind {
    SummingCombiner,
}

/// Configuration of one server-side iterator attached to a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IteratorSetting {
    pub priority: u32,
    pub name: String,
    pub kind: CombinerKind,
    pub options: BTreeMap<String, String>,
    pub scopes: BTreeSet<IteratorScope>,
}

impl IteratorSetting {
    pub fn new(priority: u32, name: impl Into<String>, kind: CombinerKind) -> Self {
        Self {
            priority,
            name: name.into(),
            kind,
            options: BTreeMap::new(),
            scopes: IteratorScope::all(),
        }
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }
}

/// Node-side state of one table.
#[derive(Debug, Clone)]
pub struct TableState {
    pub id: TableId,
    pub name: String,
    pub splits: BTreeSet<Vec<u8>>,
    pub locality_groups: BTreeMap<String, BTreeSet<Vec<u8>>>,
    pub iterators: Vec<IteratorSetting>,
}

impl TableState {
    pub fn new(id: TableId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            splits: BTreeSet::new(),
            locality_groups: BTreeMap::new(),
            iterators: Vec::new(),
        }
    }

    /// True when an attached summing combiner covers every column of the
    /// table. Values under such a table are merged on write, the embedded
    /// equivalent of compaction-time combining.
    pub fn summing_all_columns(&self) -> bool {
        self.iterators.iter().any(|setting| {
            setting.kind == CombinerKind::SummingCombiner
                && !setting.scopes.is_empty()
                && setting.options.get("all").map(String::as_str) == Some("true")
        })
    }

    /// Host serving the tablet that ends at `end` (`None` = default tablet).
    pub fn tablet_location(&self, end: Option<&[u8]>, servers: &[String]) -> String {
        let mut hasher = DefaultHasher::new();
        self.id.hash(&mut hasher);
        end.hash(&mut hasher);
        let index = (hasher.finish() % servers.len().max(1) as u64) as usize;
        servers[index].clone()
    }

    /// Metadata catalog cells describing this table's tablets: one `loc`
    /// entry per split end-key plus the default tablet entry.
    pub fn metadata_cells(&self, servers: &[String]) -> Vec<Cell> {
        let mut cells = Vec::with_capacity(self.splits.len() + 1);
        for split in &self.splits {
            cells.push(Cell {
                key: CellKey::new(
                    metadata_row(self.id, Some(split)),
                    METADATA_LOCATION_FAMILY.to_vec(),
                    b"1".to_vec(),
                ),
                value: self
                    .tablet_location(Some(split.as_slice()), servers)
                    .into_bytes(),
            });
        }
        cells.push(Cell {
            key: CellKey::new(
                metadata_row(self.id, None),
                METADATA_LOCATION_FAMILY.to_vec(),
                b"1".to_vec(),
            ),
            value: self.tablet_location(None, servers).into_bytes(),
        });
        cells
    }

    /// Fragments of `range` induced by tablet boundaries. A boundary at
    /// split `s` separates `(.., s]` from `(s, ..)`.
    pub fn split_range(&self, range: &RowRange) -> Vec<RowRange> {
        let (lo, hi) = range.normalized();
        let cuts: Vec<&Vec<u8>> = self
            .splits
            .iter()
            .filter(|split| {
                let boundary = crate::cell::successor(split);
                let above_lo = match &lo {
                    None => true,
                    Some(lo) => boundary > *lo,
                };
                let below_hi = match &hi {
                    None => true,
                    Some(hi) => boundary < *hi,
                };
                above_lo && below_hi
            })
            .collect();
        if cuts.is_empty() {
            return vec![range.clone()];
        }

        let mut fragments = Vec::with_capacity(cuts.len() + 1);
        let mut previous: Option<&Vec<u8>> = None;
        for &cut in &cuts {
            let (start, start_inclusive) = match previous {
                None => (range.start.clone(), range.start_inclusive),
                Some(prev) => (Some(prev.clone()), false),
            };
            fragments.push(RowRange::new(start, start_inclusive, Some(cut.clone()), true));
            previous = Some(cut);
        }
        if let Some(last) = previous {
            fragments.push(RowRange::new(
                Some(last.clone()),
                false,
                range.end.clone(),
                range.end_inclusive,
            ));
        }
        fragments
    }
}

/// Catalog row for a tablet of `table`: `<id>;<end>` for split tablets and
/// `<id><` for the default (last) tablet. `<` sorts after `;`, so a scan in
/// key order visits split tablets by ascending end-key and the default
/// tablet last.
pub fn metadata_row(table: TableId, end: Option<&[u8]>) -> Vec<u8> {
    let mut row = table.to_string().into_bytes();
    match end {
        Some(end) => {
            row.push(b';');
            row.extend_from_slice(end);
        }
        None => row.push(b'<'),
    }
    row
}

/// Row range covering every catalog entry of `table`.
pub fn metadata_table_range(table: TableId) -> RowRange {
    RowRange::new(
        Some(metadata_row(table, Some(b""))),
        true,
        Some(metadata_row(table, None)),
        true,
    )
}
