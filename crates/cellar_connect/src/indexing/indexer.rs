//! Write path of the inverted index and its metrics.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use cellar_store::{
    Authorizations, BatchWriter, BatchWriterConfig, CellarClient, Mutation, RowRange, ScanSpec,
};
use tracing::debug;

use crate::error::{ConnectorError, Result};
use crate::indexing::keys::{
    index_column_family, CARDINALITY_QUALIFIER, FIRST_ROW_QUALIFIER, LAST_ROW_QUALIFIER,
    METRICS_TABLE_ROWS_FAMILY, METRICS_TABLE_ROW_ID,
};
use crate::schema::{ColumnType, TableRecord};
use crate::serializer::RowSerializer;

/// Maintains the inverted index and per-value cardinality metrics for one
/// table.
///
/// For every data mutation, `index` derives one index cell per indexed
/// scalar value (one per distinct element for array values) and counts the
/// derived cells in an in-memory per-batch metrics map. `flush` drains the
/// data and index writers first and only then publishes the metrics deltas,
/// so the metrics table never claims more than the index holds. The
/// metrics table's summing combiner folds per-batch deltas into totals
/// server-side; re-flushing an already flushed batch would therefore
/// double-count and must not happen.
///
/// Single-writer: `index`, `flush`, and `close` must be called from one
/// logical task.
impl std::fmt::Debug for Indexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Indexer").finish_non_exhaustive()
    }
}

pub struct Indexer {
    auths: Authorizations,
    table: TableRecord,
    serializer: Arc<dyn RowSerializer>,
    /// Indexed qualifiers per family.
    indexed: BTreeMap<Vec<u8>, BTreeSet<Vec<u8>>>,
    /// Element types of indexed array columns, keyed by `(family, qualifier)`.
    array_types: BTreeMap<(Vec<u8>, Vec<u8>), ColumnType>,
    data_writer: BatchWriter,
    index_writer: BatchWriter,
    metrics_writer: BatchWriter,
    /// Per-batch cardinality deltas: value bytes -> index family -> count.
    metrics: BTreeMap<Vec<u8>, BTreeMap<Vec<u8>, u64>>,
    /// Per-batch count of indexed mutations.
    row_count: u64,
    /// Smallest and largest row ids seen over the indexer's lifetime.
    first_row: Option<Vec<u8>>,
    last_row: Option<Vec<u8>>,
}

impl Indexer {
    /// Open writers for the data, index, and metrics tables of `table`.
    pub async fn new(
        client: CellarClient,
        auths: Authorizations,
        table: TableRecord,
        config: BatchWriterConfig,
    ) -> Result<Self> {
        table.validate()?;
        if !table.indexed() {
            return Err(ConnectorError::Misconfiguration(format!(
                "table '{}' has no indexed columns",
                table.full_table_name()
            )));
        }

        let mut indexed: BTreeMap<Vec<u8>, BTreeSet<Vec<u8>>> = BTreeMap::new();
        let mut array_types = BTreeMap::new();
        for column in table.indexed_columns() {
            let (Some(family), Some(qualifier)) = (&column.family, &column.qualifier) else {
                continue;
            };
            let family = family.as_bytes().to_vec();
            let qualifier = qualifier.as_bytes().to_vec();
            indexed
                .entry(family.clone())
                .or_default()
                .insert(qualifier.clone());
            if let Some(element) = column.column_type.array_element() {
                array_types.insert((family, qualifier), element.clone());
            }
        }

        let data_writer = client
            .batch_writer(&table.full_table_name(), config.clone())
            .await?;
        let index_writer = client
            .batch_writer(&table.index_table_name(), config.clone())
            .await?;
        let metrics_writer = client
            .batch_writer(&table.metrics_table_name(), config)
            .await?;

        debug!(
            table = %table.full_table_name(),
            indexed_families = indexed.len(),
            "opened indexer"
        );
        let serializer = table.serializer_instance();
        Ok(Self {
            auths,
            table,
            serializer,
            indexed,
            array_types,
            data_writer,
            index_writer,
            metrics_writer,
            metrics: BTreeMap::new(),
            row_count: 0,
            first_row: None,
            last_row: None,
        })
    }

    /// Table this indexer writes.
    pub fn table(&self) -> &TableRecord {
        &self.table
    }

    /// Credentials the indexer was opened with.
    pub fn authorizations(&self) -> &Authorizations {
        &self.auths
    }

    /// Write one data mutation and derive its index and metrics entries.
    pub async fn index(&mut self, mutation: Mutation) -> Result<()> {
        let row_id = mutation.row().to_vec();
        self.data_writer.write(mutation.clone()).await?;

        self.row_count += 1;
        if self
            .first_row
            .as_ref()
            .map(|first| row_id < *first)
            .unwrap_or(true)
        {
            self.first_row = Some(row_id.clone());
        }
        if self
            .last_row
            .as_ref()
            .map(|last| row_id > *last)
            .unwrap_or(true)
        {
            self.last_row = Some(row_id.clone());
        }

        for update in mutation.updates() {
            let Some(qualifiers) = self.indexed.get(&update.family) else {
                continue;
            };
            if !qualifiers.contains(&update.qualifier) {
                continue;
            }

            let index_family = index_column_family(&update.family, &update.qualifier);
            let index_values = match self
                .array_types
                .get(&(update.family.clone(), update.qualifier.clone()))
            {
                Some(element_type) => {
                    // One cell per distinct element of the array value.
                    let elements = self
                        .serializer
                        .array_elements(element_type, &update.value)?;
                    elements.into_iter().collect::<BTreeSet<_>>()
                }
                None => BTreeSet::from([update.value.clone()]),
            };

            for value in index_values {
                let mut index_mutation = Mutation::new(value.clone());
                index_mutation.put(index_family.clone(), row_id.clone(), Vec::new());
                self.index_writer.write(index_mutation).await?;

                *self
                    .metrics
                    .entry(value)
                    .or_default()
                    .entry(index_family.clone())
                    .or_default() += 1;
            }
        }
        Ok(())
    }

    /// Drain the data and index writers, then publish the per-batch
    /// metrics deltas and drain the metrics writer. Counters reset; the
    /// lifetime first/last row trackers do not.
    pub async fn flush(&mut self) -> Result<()> {
        self.data_writer.flush().await?;
        self.index_writer.flush().await?;

        for (value, families) in &self.metrics {
            let mut mutation = Mutation::new(value.clone());
            for (family, count) in families {
                mutation.put(
                    family.clone(),
                    CARDINALITY_QUALIFIER.to_vec(),
                    count.to_string().into_bytes(),
                );
            }
            self.metrics_writer.write(mutation).await?;
        }
        if self.row_count > 0 {
            let mut sentinel = Mutation::new(METRICS_TABLE_ROW_ID.to_vec());
            sentinel.put(
                METRICS_TABLE_ROWS_FAMILY.to_vec(),
                CARDINALITY_QUALIFIER.to_vec(),
                self.row_count.to_string().into_bytes(),
            );
            if let Some(first) = &self.first_row {
                sentinel.put(
                    METRICS_TABLE_ROWS_FAMILY.to_vec(),
                    FIRST_ROW_QUALIFIER.to_vec(),
                    first.clone(),
                );
            }
            if let Some(last) = &self.last_row {
                sentinel.put(
                    METRICS_TABLE_ROWS_FAMILY.to_vec(),
                    LAST_ROW_QUALIFIER.to_vec(),
                    last.clone(),
                );
            }
            self.metrics_writer.write(sentinel).await?;
        }
        self.metrics_writer.flush().await?;

        debug!(
            table = %self.table.full_table_name(),
            rows = self.row_count,
            "flushed index batch"
        );
        self.metrics.clear();
        self.row_count = 0;
        Ok(())
    }

    /// Final flush, then close all three writers.
    pub async fn close(mut self) -> Result<()> {
        self.flush().await?;
        self.data_writer.close().await?;
        self.index_writer.close().await?;
        self.metrics_writer.close().await?;
        Ok(())
    }

    /// Read the first/last indexed row ids from a metrics table. Either
    /// side is `None` until something has been indexed.
    pub async fn min_max_row_ids(
        client: &CellarClient,
        auths: &Authorizations,
        metrics_table: &str,
    ) -> Result<(Option<Vec<u8>>, Option<Vec<u8>>)> {
        let spec = ScanSpec::over(RowRange::exact(METRICS_TABLE_ROW_ID.to_vec()))
            .fetch_column(METRICS_TABLE_ROWS_FAMILY.to_vec(), FIRST_ROW_QUALIFIER.to_vec())
            .fetch_column(METRICS_TABLE_ROWS_FAMILY.to_vec(), LAST_ROW_QUALIFIER.to_vec());
        let cells = client.scan(metrics_table, auths, spec).await?;

        let mut first = None;
        let mut last = None;
        for cell in cells {
            if cell.key.qualifier == FIRST_ROW_QUALIFIER {
                first = Some(cell.value);
            } else if cell.key.qualifier == LAST_ROW_QUALIFIER {
                last = Some(cell.value);
            }
        }
        Ok((first, last))
    }
}
