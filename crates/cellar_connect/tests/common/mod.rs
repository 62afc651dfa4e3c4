//! Shared helpers for integration tests.
#![allow(dead_code)]

use anyhow::{Context, Result};
use cellar_connect::indexing::{locality_groups, metric_iterator};
use cellar_connect::{ColumnRecord, ColumnType, SerializerKind, TableRecord};
use cellar_store::{start_embedded_node, Cell, CellarClient, EmbeddedNodeConfig};

/// Start an in-memory embedded node.
pub fn embedded_client() -> Result<CellarClient> {
    start_embedded_node(EmbeddedNodeConfig::default()).context("start embedded node")
}

fn column(
    name: &str,
    column_type: ColumnType,
    ordinal: usize,
    indexed: bool,
) -> ColumnRecord {
    ColumnRecord {
        name: name.to_string(),
        family: Some("cf".to_string()),
        qualifier: Some(name.to_string()),
        column_type,
        ordinal,
        indexed,
        comment: String::new(),
    }
}

/// The table used across scenarios: a varchar row id plus indexed age,
/// firstname, and array columns.
pub fn people_table() -> TableRecord {
    TableRecord {
        schema: "default".to_string(),
        table: "index_test_table".to_string(),
        columns: vec![
            ColumnRecord {
                name: "id".to_string(),
                family: None,
                qualifier: None,
                column_type: ColumnType::Varchar,
                ordinal: 0,
                indexed: false,
                comment: String::new(),
            },
            column("age", ColumnType::Bigint, 1, true),
            column("firstname", ColumnType::Varchar, 2, true),
            column(
                "arr",
                ColumnType::Array(Box::new(ColumnType::Varchar)),
                3,
                true,
            ),
        ],
        row_id: "id".to_string(),
        external: false,
        serializer: SerializerKind::Lexicoder,
        scan_auths: None,
    }
}

/// Create the data, index, and metrics tables for `table`, apply locality
/// groups, and attach the metrics combiner — the DDL-time setup the
/// connector's table lifecycle performs.
pub async fn create_table_objects(client: &CellarClient, table: &TableRecord) -> Result<()> {
    client
        .create_table(&table.full_table_name())
        .await
        .context("create data table")?;
    if table.indexed() {
        let groups = locality_groups(table);
        client
            .create_table(&table.index_table_name())
            .await
            .context("create index table")?;
        client
            .set_locality_groups(&table.index_table_name(), groups.clone())
            .await?;
        client
            .create_table(&table.metrics_table_name())
            .await
            .context("create metrics table")?;
        client
            .set_locality_groups(&table.metrics_table_name(), groups)
            .await?;
        client
            .attach_iterator(&table.metrics_table_name(), metric_iterator())
            .await
            .context("attach metrics combiner")?;
    }
    Ok(())
}

/// Assert one scanned cell matches the expected key and value.
pub fn assert_cell(cell: &Cell, row: &[u8], family: &str, qualifier: &[u8], value: &[u8]) {
    assert_eq!(cell.key.row, row, "row of {cell:?}");
    assert_eq!(cell.key.family, family.as_bytes(), "family of {cell:?}");
    assert_eq!(cell.key.qualifier, qualifier, "qualifier of {cell:?}");
    assert_eq!(cell.value, value, "value of {cell:?}");
}
