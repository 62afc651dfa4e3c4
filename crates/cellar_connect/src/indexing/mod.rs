//! Secondary-index subsystem.
//!
//! This module owns the write path of the inverted index and its metrics:
//! - sentinel bytes and derived names shared with the planner,
//! - locality-group and combiner configuration for the index tables,
//! - the `Indexer`, which derives index and metrics mutations from every
//!   data mutation.

pub mod indexer;
pub mod keys;

pub use indexer::Indexer;
pub use keys::{
    index_column_family, index_table_name, locality_groups, metric_iterator, metrics_table_name,
    CARDINALITY_QUALIFIER, FIRST_ROW_QUALIFIER, LAST_ROW_QUALIFIER, METRICS_TABLE_ROWS_FAMILY,
    METRICS_TABLE_ROW_ID,
};
