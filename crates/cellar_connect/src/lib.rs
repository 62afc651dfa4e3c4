//! Cellar connector core: a relational table abstraction over the Cellar
//! cell store.
//!
//! A declared table `T` is backed by three store tables: the data table
//! (rows keyed by a user-chosen row-id column), the inverted index
//! `T_idx` (`value -> family_qualifier -> source row id`), and the
//! statistics table `T_idx_metrics` (per-value cardinalities plus a
//! global sentinel row with row count and first/last row ids, folded
//! server-side by a summing combiner).
//!
//! Two subsystems share that data model:
//! - `indexing`: the write path. The `Indexer` derives index and metrics
//!   mutations from every data mutation and owns the index tables'
//!   writers for its lifetime.
//! - `planner`: the read path. The `SplitPlanner` consults the metrics to
//!   decide between a full scan and secondary-index probes, intersects
//!   per-column candidate row sets, and packages the surviving ranges
//!   into host-pinned splits.
//!
//! SQL binding, query execution, and DDL orchestration are external
//! collaborators: they hand mutations to the `Indexer`, call
//! `SplitPlanner::get_tablet_splits`, and persist the serde-serializable
//! `TableRecord` metadata.

pub mod error;
pub mod indexing;
pub mod planner;
pub mod schema;
pub mod serializer;
pub mod session;

pub use error::{ConnectorError, Result};
pub use indexing::Indexer;
pub use planner::{Bound, ColumnConstraint, Domain, LogicalRange, SplitPlanner, TabletSplitMetadata};
pub use schema::{ColumnRecord, ColumnType, TableRecord};
pub use serializer::{
    LexicoderSerializer, RowSerializer, SerializerKind, StringSerializer, Value,
};
pub use session::PlannerSession;
