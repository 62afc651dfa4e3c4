//! Tablet storage engines.
//!
//! This module provides the `TabletEngine` abstraction and two engine
//! implementations: `MemoryEngine` (in-memory, used by tests and embedded
//! nodes without a data directory) and `FjallEngine` (on-disk). Engines
//! store cells sorted by `(row, family, qualifier)` per table and answer
//! half-open row-interval scans; everything above that (column filtering,
//! combiners, tablet boundaries) lives in the node.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::path::Path;
use std::sync::RwLock;

use fjall::{Keyspace, PartitionCreateOptions, PartitionHandle};
use tracing::warn;

use crate::cell::{Cell, CellKey};
use crate::{Result, StoreError};

/// Identifier the node assigns to each table.
pub type TableId = u32;

/// Sorted cell storage for the node.
///
/// Implementations must keep cells in `(row, family, qualifier)` order per
/// table and serve scans over half-open row intervals. Writes overwrite:
/// the newest value for a key wins.
pub trait TabletEngine: Send + Sync + 'static {
    /// Read the current value of one cell.
    fn get(&self, table: TableId, key: &CellKey) -> Result<Option<Vec<u8>>>;
    /// Write cells, replacing any existing values for the same keys.
    fn put(&self, table: TableId, cells: Vec<Cell>) -> Result<()>;
    /// All cells whose row lies in `[lo, hi)`, in key order. `None` bounds
    /// are unbounded.
    fn scan_rows(&self, table: TableId, lo: Option<&[u8]>, hi: Option<&[u8]>)
        -> Result<Vec<Cell>>;
    /// Remove all cells whose row lies in `[lo, hi)`.
    fn remove_rows(&self, table: TableId, lo: Option<&[u8]>, hi: Option<&[u8]>) -> Result<()>;
}

/// In-memory engine backed by one BTreeMap per table.
#[derive(Default)]
pub struct MemoryEngine {
    tables: RwLock<HashMap<TableId, BTreeMap<CellKey, Vec<u8>>>>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }
}

fn row_bounds(lo: Option<&[u8]>, hi: Option<&[u8]>) -> (Bound<CellKey>, Bound<CellKey>) {
    let lower = match lo {
        Some(row) => Bound::Included(CellKey::new(row.to_vec(), Vec::new(), Vec::new())),
        None => Bound::Unbounded,
    };
    let upper = match hi {
        Some(row) => Bound::Excluded(CellKey::new(row.to_vec(), Vec::new(), Vec::new())),
        None => Bound::Unbounded,
    };
    (lower, upper)
}

impl TabletEngine for MemoryEngine {
    fn get(&self, table: TableId, key: &CellKey) -> Result<Option<Vec<u8>>> {
        let guard = self
            .tables
            .read()
            .map_err(|_| StoreError::Backend("engine lock poisoned".into()))?;
        Ok(guard.get(&table).and_then(|cells| cells.get(key).cloned()))
    }

    fn put(&self, table: TableId, cells: Vec<Cell>) -> Result<()> {
        let mut guard = self
            .tables
            .write()
            .map_err(|_| StoreError::Backend("engine lock poisoned".into()))?;
        let entry = guard.entry(table).or_default();
        for cell in cells {
            entry.insert(cell.key, cell.value);
        }
        Ok(())
    }

    fn scan_rows(
        &self,
        table: TableId,
        lo: Option<&[u8]>,
        hi: Option<&[u8]>,
    ) -> Result<Vec<Cell>> {
        let guard = self
            .tables
            .read()
            .map_err(|_| StoreError::Backend("engine lock poisoned".into()))?;
        let Some(cells) = guard.get(&table) else {
            return Ok(Vec::new());
        };
        Ok(cells
            .range(row_bounds(lo, hi))
            .map(|(key, value)| Cell {
                key: key.clone(),
                value: value.clone(),
            })
            .collect())
    }

    fn remove_rows(&self, table: TableId, lo: Option<&[u8]>, hi: Option<&[u8]>) -> Result<()> {
        let mut guard = self
            .tables
            .write()
            .map_err(|_| StoreError::Backend("engine lock poisoned".into()))?;
        if let Some(cells) = guard.get_mut(&table) {
            let doomed: Vec<CellKey> = cells
                .range(row_bounds(lo, hi))
                .map(|(key, _)| key.clone())
                .collect();
            for key in doomed {
                cells.remove(&key);
            }
        }
        Ok(())
    }
}

/// On-disk engine backed by a single fjall partition.
///
/// Cell keys are flattened into one byte string with an order-preserving
/// tuple encoding (`0x01` component tag, `0x00 -> 0x00 0xFF` escape, `0x00`
/// terminator) prefixed by the big-endian table id, so the partition's
/// native ordering matches `(table, row, family, qualifier)`.
pub struct FjallEngine {
    _keyspace: Keyspace,
    cells: PartitionHandle,
}

impl FjallEngine {
    /// Open (or create) the engine under `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let keyspace = fjall::Config::new(path).open()?;
        let cells = keyspace.open_partition("cells", PartitionCreateOptions::default())?;
        Ok(Self {
            _keyspace: keyspace,
            cells,
        })
    }
}

fn push_component(out: &mut Vec<u8>, part: &[u8]) {
    out.push(0x01);
    for &byte in part {
        if byte == 0x00 {
            out.extend_from_slice(&[0x00, 0xFF]);
        } else {
            out.push(byte);
        }
    }
    out.push(0x00);
}

fn encode_cell_key(table: TableId, key: &CellKey) -> Vec<u8> {
    let mut out = Vec::with_capacity(16 + key.row.len() + key.family.len() + key.qualifier.len());
    out.extend_from_slice(&table.to_be_bytes());
    push_component(&mut out, &key.row);
    push_component(&mut out, &key.family);
    push_component(&mut out, &key.qualifier);
    out
}

/// Smallest encoded key with row >= `row` in `table`; a strict prefix of
/// every encoded key of that row.
fn encode_row_floor(table: TableId, row: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + row.len());
    out.extend_from_slice(&table.to_be_bytes());
    // A bare row component is a strict prefix of every full key of the row.
    push_component(&mut out, row);
    out
}

fn parse_component(bytes: &[u8], cursor: &mut usize) -> Option<Vec<u8>> {
    if bytes.get(*cursor).copied() != Some(0x01) {
        return None;
    }
    *cursor += 1;
    let mut out = Vec::new();
    loop {
        let byte = *bytes.get(*cursor)?;
        *cursor += 1;
        if byte != 0x00 {
            out.push(byte);
            continue;
        }
        if bytes.get(*cursor).copied() == Some(0xFF) {
            *cursor += 1;
            out.push(0x00);
        } else {
            return Some(out);
        }
    }
}

fn decode_cell_key(bytes: &[u8]) -> Option<CellKey> {
    if bytes.len() < 4 {
        return None;
    }
    let mut cursor = 4usize;
    let row = parse_component(bytes, &mut cursor)?;
    let family = parse_component(bytes, &mut cursor)?;
    let qualifier = parse_component(bytes, &mut cursor)?;
    if cursor != bytes.len() {
        return None;
    }
    Some(CellKey {
        row,
        family,
        qualifier,
    })
}

fn encoded_bounds(
    table: TableId,
    lo: Option<&[u8]>,
    hi: Option<&[u8]>,
) -> (Bound<Vec<u8>>, Bound<Vec<u8>>) {
    let lower = match lo {
        Some(row) => Bound::Included(encode_row_floor(table, row)),
        None => Bound::Included(table.to_be_bytes().to_vec()),
    };
    let upper = match hi {
        Some(row) => Bound::Excluded(encode_row_floor(table, row)),
        None => match table.checked_add(1) {
            Some(next) => Bound::Excluded(next.to_be_bytes().to_vec()),
            None => Bound::Unbounded,
        },
    };
    (lower, upper)
}

impl TabletEngine for FjallEngine {
    fn get(&self, table: TableId, key: &CellKey) -> Result<Option<Vec<u8>>> {
        let raw = self.cells.get(encode_cell_key(table, key))?;
        Ok(raw.map(|value| value.to_vec()))
    }

    fn put(&self, table: TableId, cells: Vec<Cell>) -> Result<()> {
        for cell in cells {
            self.cells
                .insert(encode_cell_key(table, &cell.key), cell.value)?;
        }
        Ok(())
    }

    fn scan_rows(
        &self,
        table: TableId,
        lo: Option<&[u8]>,
        hi: Option<&[u8]>,
    ) -> Result<Vec<Cell>> {
        let mut out = Vec::new();
        for item in self.cells.range(encoded_bounds(table, lo, hi)) {
            let (raw_key, raw_value) = item?;
            match decode_cell_key(raw_key.as_ref()) {
                Some(key) => out.push(Cell {
                    key,
                    value: raw_value.to_vec(),
                }),
                None => {
                    warn!(len = raw_key.len(), "skipping undecodable engine key");
                }
            }
        }
        Ok(out)
    }

    fn remove_rows(&self, table: TableId, lo: Option<&[u8]>, hi: Option<&[u8]>) -> Result<()> {
        let mut doomed = Vec::new();
        for item in self.cells.range(encoded_bounds(table, lo, hi)) {
            let (raw_key, _) = item?;
            doomed.push(raw_key.to_vec());
        }
        for key in doomed {
            self.cells.remove(key)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell(row: &[u8], family: &[u8], qualifier: &[u8], value: &[u8]) -> Cell {
        Cell {
            key: CellKey::new(row.to_vec(), family.to_vec(), qualifier.to_vec()),
            value: value.to_vec(),
        }
    }

    #[test]
    fn tuple_encoding_preserves_cell_key_order() {
        let mut keys = vec![
            CellKey::new(b"row".to_vec(), b"cf".to_vec(), b"a".to_vec()),
            CellKey::new(b"row\x00".to_vec(), b"cf".to_vec(), b"a".to_vec()),
            CellKey::new(b"row".to_vec(), b"cf".to_vec(), b"\xFF".to_vec()),
            CellKey::new(b"rov".to_vec(), b"zz".to_vec(), b"zz".to_vec()),
            CellKey::new(b"row\x01".to_vec(), b"aa".to_vec(), b"aa".to_vec()),
        ];
        let mut encoded: Vec<(Vec<u8>, CellKey)> = keys
            .iter()
            .map(|key| (encode_cell_key(7, key), key.clone()))
            .collect();
        keys.sort();
        encoded.sort();
        let decoded: Vec<CellKey> = encoded.into_iter().map(|(_, key)| key).collect();
        assert_eq!(keys, decoded);
    }

    #[test]
    fn tuple_encoding_round_trips() {
        let key = CellKey::new(b"r\x00w".to_vec(), b"c\x00".to_vec(), b"\x00q".to_vec());
        let encoded = encode_cell_key(3, &key);
        assert_eq!(decode_cell_key(&encoded), Some(key));
    }

    #[test]
    fn memory_engine_scans_half_open_row_intervals() {
        let engine = MemoryEngine::new();
        engine
            .put(
                1,
                vec![
                    cell(b"a", b"cf", b"q", b"1"),
                    cell(b"b", b"cf", b"q", b"2"),
                    cell(b"c", b"cf", b"q", b"3"),
                ],
            )
            .unwrap();

        let hits = engine.scan_rows(1, Some(b"b"), Some(b"c")).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].key.row, b"b");

        let all = engine.scan_rows(1, None, None).unwrap();
        assert_eq!(all.len(), 3);
        assert!(engine.scan_rows(2, None, None).unwrap().is_empty());
    }

    #[test]
    fn memory_engine_overwrites_and_removes() {
        let engine = MemoryEngine::new();
        engine.put(1, vec![cell(b"a", b"cf", b"q", b"1")]).unwrap();
        engine.put(1, vec![cell(b"a", b"cf", b"q", b"9")]).unwrap();
        let key = CellKey::new(b"a".to_vec(), b"cf".to_vec(), b"q".to_vec());
        assert_eq!(engine.get(1, &key).unwrap(), Some(b"9".to_vec()));

        engine.remove_rows(1, None, None).unwrap();
        assert_eq!(engine.get(1, &key).unwrap(), None);
    }

    #[test]
    fn fjall_engine_matches_memory_semantics() {
        let dir = tempfile::TempDir::new().unwrap();
        let engine = FjallEngine::open(dir.path()).unwrap();
        engine
            .put(
                1,
                vec![
                    cell(b"row\x00", b"cf", b"q", b"null-extended"),
                    cell(b"row", b"cf", b"q", b"plain"),
                    cell(b"rox", b"cf", b"q", b"later"),
                ],
            )
            .unwrap();
        engine.put(2, vec![cell(b"row", b"cf", b"q", b"other")]).unwrap();

        let hits = engine.scan_rows(1, None, None).unwrap();
        let rows: Vec<&[u8]> = hits.iter().map(|c| c.key.row.as_slice()).collect();
        assert_eq!(rows, vec![b"row".as_slice(), b"row\x00", b"rox"]);

        let bounded = engine.scan_rows(1, Some(b"row\x00"), Some(b"rox")).unwrap();
        assert_eq!(bounded.len(), 1);
        assert_eq!(bounded[0].key.row, b"row\x00");

        engine.remove_rows(1, Some(b"row"), Some(b"row\x00")).unwrap();
        assert_eq!(engine.scan_rows(1, None, None).unwrap().len(), 2);
    }
}
