//! Per-session planner knobs.

/// Session-scoped configuration consulted by the split planner.
#[derive(Debug, Clone)]
pub struct PlannerSession {
    /// Translate the row-id predicate into storage ranges instead of a
    /// full-table range.
    pub optimize_range_predicate_pushdown: bool,
    /// Consult the secondary index and metrics tables when indexed column
    /// constraints are present.
    pub secondary_index_enabled: bool,
    /// Split candidate ranges on tablet boundaries.
    pub optimize_range_splits: bool,
    /// Smallest-cardinality fraction of the table above which the planner
    /// intersects all indexed columns instead of probing only the
    /// lowest-cardinality one. In `[0, 1]`.
    pub lowest_cardinality_threshold: f64,
    /// Fraction of the table the index result must stay strictly below for
    /// the index-driven plan to be kept. In `[0, 1]`.
    pub index_ratio: f64,
    /// Levels of byte-midpoint bisection applied to candidate ranges.
    pub num_artificial_splits: u32,
    /// Number of ranges binned into each split.
    pub ranges_per_split: usize,
}

impl Default for PlannerSession {
    fn default() -> Self {
        Self {
            optimize_range_predicate_pushdown: true,
            secondary_index_enabled: true,
            optimize_range_splits: true,
            lowest_cardinality_threshold: 0.01,
            index_ratio: 0.01,
            num_artificial_splits: 0,
            ranges_per_split: 10_000,
        }
    }
}
