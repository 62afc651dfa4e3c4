//! Index-driven split planning.
//!
//! The planner turns a predicate over one table into parallel work units:
//! it translates the row-id domain into storage ranges, probes the metrics
//! table for per-column cardinalities, resolves candidate row-id sets
//! through the secondary index when that is selective enough, splits the
//! surviving ranges on tablet boundaries, optionally bisects them into
//! artificial sub-ranges, and bins the result into host-pinned splits.

pub mod predicates;
pub mod ranges;
pub mod splits;

pub use predicates::{Bound, ColumnConstraint, Domain, LogicalRange};
pub use ranges::{midpoint, TabletSplitMetadata};
pub use splits::SplitPlanner;
