//! The split planner.

use std::collections::BTreeSet;

use cellar_store::{Authorizations, CellarClient, RowRange, ScanSpec};
use tracing::debug;

use crate::error::{ConnectorError, Result};
use crate::indexing::keys::{
    index_column_family, index_table_name, metrics_table_name, CARDINALITY_QUALIFIER,
    METRICS_TABLE_ROWS_FAMILY, METRICS_TABLE_ROW_ID,
};
use crate::indexing::Indexer;
use crate::planner::predicates::{ColumnConstraint, Domain};
use crate::planner::ranges::{bin_ranges, generate_artificial_splits, in_any_range, TabletSplitMetadata};
use crate::schema::TableRecord;
use crate::serializer::RowSerializer;
use crate::session::PlannerSession;

/// Worker hint handed to the backend for parallel index probes.
const BATCH_SCAN_THREADS: usize = 10;
/// Host pinned to splits when no tablet location can be discovered.
const FALLBACK_SPLIT_HOST: &str = "localhost:9997";

/// Read-only planner over one store connection. Re-entrant: any number of
/// planning calls may run in parallel against the same tables.
pub struct SplitPlanner {
    client: CellarClient,
    auths: Authorizations,
}

impl SplitPlanner {
    pub fn new(client: CellarClient, auths: Authorizations) -> Self {
        Self { client, auths }
    }

    /// Plan the splits for a scan of `table` constrained by the optional
    /// row-id domain and the per-column constraints.
    ///
    /// An empty plan is a definitive answer: the predicate provably
    /// matches nothing. Backend faults surface as single errors; no
    /// partial plan is ever returned.
    pub async fn get_tablet_splits(
        &self,
        session: &PlannerSession,
        table: &TableRecord,
        row_id_domain: Option<&Domain>,
        constraints: &[ColumnConstraint],
    ) -> Result<Vec<TabletSplitMetadata>> {
        let data_table = table.full_table_name();
        debug!(table = %data_table, "planning tablet splits");
        let index_table = index_table_name(&table.schema, &table.table);
        let metrics_table = metrics_table_name(&table.schema, &table.table);
        let serializer = table.serializer_instance();

        // Row-id predicate pushdown: the coarse candidate set.
        let pushdown_ranges: Vec<RowRange> =
            if session.optimize_range_predicate_pushdown {
                match row_id_domain {
                    Some(domain) => domain.storage_ranges(serializer.as_ref())?,
                    None => vec![RowRange::all()],
                }
            } else {
                vec![RowRange::all()]
            };

        let indexed_constraints: Vec<&ColumnConstraint> =
            constraints.iter().filter(|c| c.indexed).collect();

        let mut column_ranges: Vec<RowRange> = Vec::new();
        if session.secondary_index_enabled && !indexed_constraints.is_empty() {
            debug!(
                columns = indexed_constraints.len(),
                "secondary index enabled with indexed column constraints"
            );

            let mut cardinalities = Vec::with_capacity(indexed_constraints.len());
            for constraint in &indexed_constraints {
                let cardinality = self
                    .column_cardinality(&metrics_table, serializer.as_ref(), constraint)
                    .await?;
                debug!(column = %constraint.name, cardinality, "cardinality probe");
                cardinalities.push((*constraint, cardinality));
            }
            cardinalities.sort_by_key(|(_, cardinality)| *cardinality);

            let (lowest_constraint, lowest_cardinality) = cardinalities[0];
            if lowest_cardinality == 0 {
                debug!("query is provably empty, returning no splits");
                return Ok(Vec::new());
            }

            let num_rows = self.num_rows_in_table(&metrics_table).await?;
            let lowest_ratio = lowest_cardinality as f64 / num_rows as f64;
            let use_intersection = lowest_ratio > session.lowest_cardinality_threshold;
            debug!(
                lowest_cardinality,
                num_rows,
                lowest_ratio,
                threshold = session.lowest_cardinality_threshold,
                use_intersection,
                "index mode decision"
            );

            let probe_constraints: Vec<&ColumnConstraint> = if use_intersection {
                indexed_constraints.clone()
            } else {
                vec![lowest_constraint]
            };
            let row_ids = self
                .index_row_ids(
                    &index_table,
                    serializer.as_ref(),
                    &probe_constraints,
                    &pushdown_ranges,
                )
                .await?;

            let ratio = row_ids.len() as f64 / num_rows as f64;
            debug!(
                candidate_rows = row_ids.len(),
                num_rows,
                ratio,
                threshold = session.index_ratio,
                "index ratio gate"
            );
            if ratio < session.index_ratio {
                if row_ids.is_empty() {
                    // The intersection emptied out: provably no results.
                    debug!("index intersection is empty, returning no splits");
                    return Ok(Vec::new());
                }
                column_ranges = row_ids.into_iter().map(RowRange::exact).collect();
            }
        } else {
            debug!("secondary index disabled or no indexed column constraints");
        }

        let candidate_ranges = if column_ranges.is_empty() {
            pushdown_ranges
        } else {
            column_ranges
        };

        // Tablet alignment.
        let split_ranges = if session.optimize_range_splits {
            let mut aligned = Vec::with_capacity(candidate_ranges.len());
            for range in &candidate_ranges {
                if range.is_point() {
                    aligned.push(range.clone());
                } else {
                    aligned.extend(
                        self.client
                            .split_range_by_tablets(&data_table, range)
                            .await?,
                    );
                }
            }
            aligned
        } else {
            candidate_ranges
        };

        // Artificial bisection.
        let final_ranges = if session.num_artificial_splits > 0
            && self.client.table_exists(&metrics_table).await?
        {
            let (first_row, last_row) =
                Indexer::min_max_row_ids(&self.client, &self.auths, &metrics_table).await?;
            match (first_row, last_row) {
                (Some(first), Some(last)) => {
                    debug!(
                        levels = session.num_artificial_splits,
                        "generating artificial splits"
                    );
                    generate_artificial_splits(
                        &first,
                        &last,
                        session.num_artificial_splits,
                        split_ranges,
                    )
                }
                _ => {
                    debug!("first/last row unavailable, skipping artificial splits");
                    split_ranges
                }
            }
        } else {
            split_ranges
        };

        let host = self
            .client
            .default_tablet_location(&data_table)
            .await
            .unwrap_or_else(|_| FALLBACK_SPLIT_HOST.to_string());
        let splits = bin_ranges(&host, session.ranges_per_split, final_ranges);
        debug!(
            table = %data_table,
            splits = splits.len(),
            "planned tablet splits"
        );
        Ok(splits)
    }

    /// Sum the `___card___` cells of one indexed column over the ranges its
    /// domain selects.
    async fn column_cardinality(
        &self,
        metrics_table: &str,
        serializer: &dyn RowSerializer,
        constraint: &ColumnConstraint,
    ) -> Result<u64> {
        let domain = constraint.require_domain()?;
        let ranges = domain.storage_ranges(serializer)?;
        let family = index_column_family(&constraint.family, &constraint.qualifier);
        let spec = ScanSpec::over_ranges(ranges)
            .fetch_column(family, CARDINALITY_QUALIFIER.to_vec());
        let cells = self
            .client
            .batch_scan(metrics_table, &self.auths, BATCH_SCAN_THREADS, spec)
            .await?;

        let mut total = 0u64;
        for cell in cells {
            total += parse_metric(&cell.value)?;
        }
        Ok(total)
    }

    /// Total indexed rows from the metrics sentinel row; zero when the
    /// table has never been flushed.
    async fn num_rows_in_table(&self, metrics_table: &str) -> Result<u64> {
        let spec = ScanSpec::over(RowRange::exact(METRICS_TABLE_ROW_ID.to_vec()))
            .fetch_column(METRICS_TABLE_ROWS_FAMILY.to_vec(), CARDINALITY_QUALIFIER.to_vec());
        let cells = self.client.scan(metrics_table, &self.auths, spec).await?;
        if cells.len() > 1 {
            return Err(ConnectorError::Invariant(
                "more than one sentinel metrics row observed".to_string(),
            ));
        }
        match cells.first() {
            Some(cell) => parse_metric(&cell.value),
            None => Ok(0),
        }
    }

    /// Row ids selected by the index for every probe column, filtered to
    /// the pushdown ranges and intersected across columns.
    async fn index_row_ids(
        &self,
        index_table: &str,
        serializer: &dyn RowSerializer,
        constraints: &[&ColumnConstraint],
        pushdown_ranges: &[RowRange],
    ) -> Result<BTreeSet<Vec<u8>>> {
        let mut intersected: Option<BTreeSet<Vec<u8>>> = None;
        for constraint in constraints {
            let domain = constraint.require_domain()?;
            let ranges = domain.storage_ranges(serializer)?;
            let family = index_column_family(&constraint.family, &constraint.qualifier);
            let spec = ScanSpec::over_ranges(ranges).fetch_family(family);
            let cells = self
                .client
                .batch_scan(index_table, &self.auths, BATCH_SCAN_THREADS, spec)
                .await?;

            let mut column_rows = BTreeSet::new();
            for cell in cells {
                let row_id = cell.key.qualifier;
                if in_any_range(&row_id, pushdown_ranges) {
                    column_rows.insert(row_id);
                }
            }
            debug!(
                column = %constraint.name,
                rows = column_rows.len(),
                "index probe"
            );

            intersected = Some(match intersected {
                None => column_rows,
                Some(accumulated) => accumulated
                    .intersection(&column_rows)
                    .cloned()
                    .collect(),
            });
        }
        Ok(intersected.unwrap_or_default())
    }
}

fn parse_metric(value: &[u8]) -> Result<u64> {
    std::str::from_utf8(value)
        .ok()
        .and_then(|text| text.parse::<u64>().ok())
        .ok_or_else(|| {
            ConnectorError::Invariant(format!(
                "metrics value is not an ASCII decimal: {value:?}"
            ))
        })
}
