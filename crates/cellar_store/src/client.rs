//! Client surface of the store.
//!
//! `CellarClient` is the handle the connector layers hold: buffered batch
//! writers, range scanners with column projection, tablet-boundary range
//! splitting, server-side iterator attachment, and tablet-location
//! discovery through the metadata catalog. Every method that would be an
//! RPC against a remote cluster is async; the embedded node resolves them
//! in-process.

use std::collections::{BTreeMap, BTreeSet};
use std::mem;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tracing::debug;

use crate::cell::{Cell, CellKey, Mutation, RowRange};
use crate::kv::TabletEngine;
use crate::tablet::{
    metadata_row, metadata_table_range, IteratorSetting, TableState, METADATA_LOCATION_FAMILY,
    METADATA_TABLE,
};
use crate::{Result, StoreError};

/// Scan-time security labels. The embedded node records but does not
/// enforce them; enforcement belongs to the real backend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Authorizations(Vec<String>);

impl Authorizations {
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn new(labels: Vec<String>) -> Self {
        Self(labels)
    }

    pub fn labels(&self) -> &[String] {
        &self.0
    }
}

/// Column projection for scans: empty means fetch everything, otherwise a
/// cell passes when its family is fetched or its exact column is.
#[derive(Debug, Clone, Default)]
pub struct ColumnFilter {
    families: BTreeSet<Vec<u8>>,
    columns: BTreeSet<(Vec<u8>, Vec<u8>)>,
}

impl ColumnFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.families.is_empty() && self.columns.is_empty()
    }

    pub fn add_family(&mut self, family: impl Into<Vec<u8>>) {
        self.families.insert(family.into());
    }

    pub fn add_column(&mut self, family: impl Into<Vec<u8>>, qualifier: impl Into<Vec<u8>>) {
        self.columns.insert((family.into(), qualifier.into()));
    }

    pub fn matches(&self, key: &CellKey) -> bool {
        if self.is_empty() {
            return true;
        }
        self.families.contains(&key.family)
            || self
                .columns
                .iter()
                .any(|(family, qualifier)| *family == key.family && *qualifier == key.qualifier)
    }
}

/// One scan request: a set of row ranges plus a column projection.
#[derive(Debug, Clone)]
pub struct ScanSpec {
    pub ranges: Vec<RowRange>,
    pub columns: ColumnFilter,
}

impl ScanSpec {
    pub fn over(range: RowRange) -> Self {
        Self {
            ranges: vec![range],
            columns: ColumnFilter::all(),
        }
    }

    pub fn over_ranges(ranges: Vec<RowRange>) -> Self {
        Self {
            ranges,
            columns: ColumnFilter::all(),
        }
    }

    pub fn fetch_family(mut self, family: impl Into<Vec<u8>>) -> Self {
        self.columns.add_family(family);
        self
    }

    pub fn fetch_column(
        mut self,
        family: impl Into<Vec<u8>>,
        qualifier: impl Into<Vec<u8>>,
    ) -> Self {
        self.columns.add_column(family, qualifier);
        self
    }
}

/// Buffering configuration shared by a group of writers.
#[derive(Debug, Clone)]
pub struct BatchWriterConfig {
    /// Buffered bytes that trigger an automatic flush.
    pub max_memory_bytes: usize,
    /// Target latency bound for buffered mutations. The embedded node has
    /// no background flusher; callers flush explicitly.
    pub max_latency: Duration,
    /// Writer-thread hint forwarded to the backend.
    pub max_write_threads: usize,
}

impl Default for BatchWriterConfig {
    fn default() -> Self {
        Self {
            max_memory_bytes: 50 << 20,
            max_latency: Duration::from_secs(2),
            max_write_threads: 3,
        }
    }
}

/// Buffered writer bound to one table. `flush` blocks until buffered
/// mutations are durable in the backend; `close` implies a final flush.
pub struct BatchWriter {
    node: Arc<Node>,
    table: String,
    config: BatchWriterConfig,
    buffer: Vec<Mutation>,
    buffered_bytes: usize,
}

impl BatchWriter {
    /// Buffer one mutation, flushing if the memory bound is reached.
    pub async fn write(&mut self, mutation: Mutation) -> Result<()> {
        self.buffered_bytes += mutation.estimated_size();
        self.buffer.push(mutation);
        if self.buffered_bytes >= self.config.max_memory_bytes {
            self.flush().await?;
        }
        Ok(())
    }

    /// Push every buffered mutation to the backend.
    pub async fn flush(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let batch = mem::take(&mut self.buffer);
        self.buffered_bytes = 0;
        self.node.apply(&self.table, batch)
    }

    /// Final flush and release of the writer.
    pub async fn close(mut self) -> Result<()> {
        self.flush().await
    }
}

/// Shared handle to a store node. Clones are cheap and refer to the same
/// node; the node lives as long as any handle does.
#[derive(Clone)]
pub struct CellarClient {
    node: Arc<Node>,
}

impl CellarClient {
    pub(crate) fn new(node: Arc<Node>) -> Self {
        Self { node }
    }

    /// Create an empty table.
    pub async fn create_table(&self, table: &str) -> Result<()> {
        self.node.create_table(table)
    }

    pub async fn table_exists(&self, table: &str) -> Result<bool> {
        Ok(self.node.lookup(table).is_ok())
    }

    /// Drop a table and all of its cells.
    pub async fn delete_table(&self, table: &str) -> Result<()> {
        self.node.delete_table(table)
    }

    /// Replace the locality-group assignment of a table.
    pub async fn set_locality_groups(
        &self,
        table: &str,
        groups: BTreeMap<String, BTreeSet<Vec<u8>>>,
    ) -> Result<()> {
        self.node.with_table_mut(table, |state| {
            state.locality_groups = groups;
            Ok(())
        })
    }

    pub async fn locality_groups(
        &self,
        table: &str,
    ) -> Result<BTreeMap<String, BTreeSet<Vec<u8>>>> {
        Ok(self.node.lookup(table)?.locality_groups)
    }

    /// Install a server-side iterator on a table.
    pub async fn attach_iterator(&self, table: &str, setting: IteratorSetting) -> Result<()> {
        self.node.with_table_mut(table, |state| {
            if state.iterators.iter().any(|it| it.name == setting.name) {
                return Err(StoreError::Backend(format!(
                    "iterator '{}' already attached to table '{}'",
                    setting.name, state.name
                )));
            }
            state.iterators.push(setting);
            Ok(())
        })
    }

    /// Add tablet split points to a table and republish its catalog rows.
    pub async fn add_splits(&self, table: &str, splits: Vec<Vec<u8>>) -> Result<()> {
        self.node.add_splits(table, splits)
    }

    /// Open a buffered writer for a table.
    pub async fn batch_writer(&self, table: &str, config: BatchWriterConfig) -> Result<BatchWriter> {
        self.node.lookup(table)?;
        Ok(BatchWriter {
            node: Arc::clone(&self.node),
            table: table.to_string(),
            config,
            buffer: Vec::new(),
            buffered_bytes: 0,
        })
    }

    /// Point/range scan. Results are deduplicated and in key order.
    pub async fn scan(
        &self,
        table: &str,
        _auths: &Authorizations,
        spec: ScanSpec,
    ) -> Result<Vec<Cell>> {
        self.node.scan(table, &spec)
    }

    /// Parallel scan over many ranges. `threads` is a worker hint for real
    /// backends; the embedded node walks the ranges sequentially.
    pub async fn batch_scan(
        &self,
        table: &str,
        _auths: &Authorizations,
        threads: usize,
        spec: ScanSpec,
    ) -> Result<Vec<Cell>> {
        debug!(table, threads, ranges = spec.ranges.len(), "batch scan");
        self.node.scan(table, &spec)
    }

    /// Sub-ranges of `range` induced by the table's tablet boundaries.
    pub async fn split_range_by_tablets(
        &self,
        table: &str,
        range: &RowRange,
    ) -> Result<Vec<RowRange>> {
        Ok(self.node.lookup(table)?.split_range(range))
    }

    /// Host serving `key`'s tablet, discovered by scanning the metadata
    /// catalog's `loc` family for the least tablet end-key >= `key`. With
    /// no key, the default (last) tablet's host is returned.
    pub async fn tablet_location(&self, table: &str, key: Option<&[u8]>) -> Result<String> {
        self.node.tablet_location(table, key)
    }

    /// Host of the default tablet.
    pub async fn default_tablet_location(&self, table: &str) -> Result<String> {
        self.node.tablet_location(table, None)
    }
}

/// Embedded store node: one engine plus table/tablet bookkeeping.
pub(crate) struct Node {
    engine: Arc<dyn TabletEngine>,
    tables: RwLock<BTreeMap<String, TableState>>,
    next_table_id: AtomicU32,
    tablet_servers: Vec<String>,
}

impl Node {
    pub(crate) fn new(engine: Arc<dyn TabletEngine>, tablet_servers: Vec<String>) -> Self {
        let mut tables = BTreeMap::new();
        // The metadata catalog occupies table id 0 from birth.
        tables.insert(
            METADATA_TABLE.to_string(),
            TableState::new(0, METADATA_TABLE),
        );
        Self {
            engine,
            tables: RwLock::new(tables),
            next_table_id: AtomicU32::new(1),
            tablet_servers,
        }
    }

    fn lock_read(&self) -> Result<std::sync::RwLockReadGuard<'_, BTreeMap<String, TableState>>> {
        self.tables
            .read()
            .map_err(|_| StoreError::Backend("table registry lock poisoned".into()))
    }

    fn lock_write(&self) -> Result<std::sync::RwLockWriteGuard<'_, BTreeMap<String, TableState>>> {
        self.tables
            .write()
            .map_err(|_| StoreError::Backend("table registry lock poisoned".into()))
    }

    fn lookup(&self, table: &str) -> Result<TableState> {
        self.lock_read()?
            .get(table)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(table.to_string()))
    }

    fn with_table_mut<T>(
        &self,
        table: &str,
        apply: impl FnOnce(&mut TableState) -> Result<T>,
    ) -> Result<T> {
        let mut guard = self.lock_write()?;
        let state = guard
            .get_mut(table)
            .ok_or_else(|| StoreError::NotFound(table.to_string()))?;
        apply(state)
    }

    fn create_table(&self, table: &str) -> Result<()> {
        let state = {
            let mut guard = self.lock_write()?;
            if guard.contains_key(table) {
                return Err(StoreError::Backend(format!(
                    "table '{table}' already exists"
                )));
            }
            let id = self.next_table_id.fetch_add(1, Ordering::SeqCst);
            let state = TableState::new(id, table);
            guard.insert(table.to_string(), state.clone());
            state
        };
        debug!(table, id = state.id, "created table");
        self.engine
            .put(0, state.metadata_cells(&self.tablet_servers))
    }

    fn delete_table(&self, table: &str) -> Result<()> {
        let state = {
            let mut guard = self.lock_write()?;
            guard
                .remove(table)
                .ok_or_else(|| StoreError::NotFound(table.to_string()))?
        };
        self.engine.remove_rows(state.id, None, None)?;
        let (lo, hi) = metadata_table_range(state.id).normalized();
        self.engine.remove_rows(0, lo.as_deref(), hi.as_deref())
    }

    fn add_splits(&self, table: &str, splits: Vec<Vec<u8>>) -> Result<()> {
        let state = self.with_table_mut(table, |state| {
            state.splits.extend(splits);
            Ok(state.clone())
        })?;
        self.engine
            .put(0, state.metadata_cells(&self.tablet_servers))
    }

    fn apply(&self, table: &str, mutations: Vec<Mutation>) -> Result<()> {
        let state = self.lookup(table)?;
        let combine = state.summing_all_columns();
        let mut cells = Vec::new();
        for mutation in mutations {
            cells.extend(mutation.into_cells());
        }
        if combine {
            // Write-time combining stands in for the backend's
            // compaction-time combiner application.
            for cell in &mut cells {
                if let Some(existing) = self.engine.get(state.id, &cell.key)? {
                    cell.value = combined_value(&existing, &cell.value);
                }
                self.engine.put(state.id, vec![cell.clone()])?;
            }
            Ok(())
        } else {
            self.engine.put(state.id, cells)
        }
    }

    fn scan(&self, table: &str, spec: &ScanSpec) -> Result<Vec<Cell>> {
        let state = self.lookup(table)?;
        // Overlapping ranges may surface the same cell twice; merge through
        // a map keyed by cell key so results stay sorted and unique.
        let mut merged: BTreeMap<CellKey, Vec<u8>> = BTreeMap::new();
        for range in &spec.ranges {
            let (lo, hi) = range.normalized();
            for cell in self
                .engine
                .scan_rows(state.id, lo.as_deref(), hi.as_deref())?
            {
                if spec.columns.matches(&cell.key) {
                    merged.insert(cell.key, cell.value);
                }
            }
        }
        Ok(merged
            .into_iter()
            .map(|(key, value)| Cell { key, value })
            .collect())
    }

    fn tablet_location(&self, table: &str, key: Option<&[u8]>) -> Result<String> {
        let state = self.lookup(table)?;
        let spec = ScanSpec::over(metadata_table_range(state.id))
            .fetch_family(METADATA_LOCATION_FAMILY.to_vec());
        let entries = self.scan(METADATA_TABLE, &spec)?;
        let prefix_len = state.id.to_string().len() + 1;
        let default_row = metadata_row(state.id, None);

        if let Some(key) = key {
            for cell in &entries {
                if cell.key.row == default_row {
                    break;
                }
                let end = &cell.key.row[prefix_len..];
                if end >= key {
                    return location_value(cell);
                }
            }
        }
        entries
            .iter()
            .find(|cell| cell.key.row == default_row)
            .map(location_value)
            .unwrap_or_else(|| {
                Err(StoreError::Backend(format!(
                    "no default tablet registered for table '{table}'"
                )))
            })
    }
}

fn location_value(cell: &Cell) -> Result<String> {
    String::from_utf8(cell.value.clone())
        .map_err(|_| StoreError::Backend("malformed tablet location entry".into()))
}

/// Summing-combiner merge of two values: ASCII decimal operands add,
/// anything else resolves to the newest value (lossy string encoding).
fn combined_value(existing: &[u8], new: &[u8]) -> Vec<u8> {
    let parse = |bytes: &[u8]| -> Option<i64> {
        std::str::from_utf8(bytes).ok()?.parse::<i64>().ok()
    };
    match (parse(existing), parse(new)) {
        (Some(left), Some(right)) => (left + right).to_string().into_bytes(),
        _ => new.to_vec(),
    }
}
