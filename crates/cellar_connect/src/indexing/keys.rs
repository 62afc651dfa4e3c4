//! Sentinel bytes and derived names of the index and metrics tables.

use std::collections::{BTreeMap, BTreeSet};

use cellar_store::{CombinerKind, IteratorSetting};

use crate::schema::{full_table_name, TableRecord};

/// Row id of the global-statistics sentinel row in the metrics table.
pub const METRICS_TABLE_ROW_ID: &[u8] = b"___METRICS_TABLE___";
/// Column family of the global row statistics.
pub const METRICS_TABLE_ROWS_FAMILY: &[u8] = b"___rows___";
/// Qualifier of per-key and global cardinality cells.
pub const CARDINALITY_QUALIFIER: &[u8] = b"___card___";
/// Qualifier of the smallest indexed row id.
pub const FIRST_ROW_QUALIFIER: &[u8] = b"___first_row___";
/// Qualifier of the largest indexed row id.
pub const LAST_ROW_QUALIFIER: &[u8] = b"___last_row___";

const METRIC_ITERATOR_NAME: &str = "cellar_metrics_sum";

/// Index column family for a source column: `family || '_' || qualifier`.
pub fn index_column_family(family: &[u8], qualifier: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(family.len() + 1 + qualifier.len());
    out.extend_from_slice(family);
    out.push(b'_');
    out.extend_from_slice(qualifier);
    out
}

/// Name of the index table backing `schema.table`.
pub fn index_table_name(schema: &str, table: &str) -> String {
    full_table_name(schema, table) + "_idx"
}

/// Name of the metrics table backing `schema.table`.
pub fn metrics_table_name(schema: &str, table: &str) -> String {
    full_table_name(schema, table) + "_idx_metrics"
}

/// Summing combiner attached to the metrics table: every column, string
/// decimal encoding, maximum priority, all scopes.
pub fn metric_iterator() -> IteratorSetting {
    IteratorSetting::new(u32::MAX, METRIC_ITERATOR_NAME, CombinerKind::SummingCombiner)
        .with_option("all", "true")
        .with_option("type", "STRING")
}

/// One locality group per indexed column, named after and containing only
/// that column's index family. Applied to both the index and metrics
/// tables so a scan over one index column touches one group's files.
pub fn locality_groups(table: &TableRecord) -> BTreeMap<String, BTreeSet<Vec<u8>>> {
    let mut groups = BTreeMap::new();
    for column in table.indexed_columns() {
        let (Some(family), Some(qualifier)) = (&column.family, &column.qualifier) else {
            continue;
        };
        let index_family = index_column_family(family.as_bytes(), qualifier.as_bytes());
        let name = String::from_utf8_lossy(&index_family).into_owned();
        groups.insert(name, BTreeSet::from([index_family]));
    }
    groups
}
