//! End-to-end indexing scenarios against an embedded node.

mod common;

use anyhow::Result;
use cellar_connect::{
    ColumnType, ConnectorError, Indexer, LexicoderSerializer, RowSerializer, SerializerKind,
    Value,
};
use cellar_store::{
    Authorizations, BatchWriterConfig, CellarClient, EmbeddedNodeConfig, Mutation, RowRange,
    ScanSpec,
};

use common::{assert_cell, create_table_objects, embedded_client, people_table};

const SENTINEL_ROW: &[u8] = b"___METRICS_TABLE___";

fn encode(column_type: &ColumnType, value: &Value) -> Vec<u8> {
    LexicoderSerializer
        .encode(column_type, value)
        .expect("encode test value")
}

fn varchar_array(values: &[&str]) -> Value {
    Value::Array(
        values
            .iter()
            .map(|v| Value::Varchar((*v).to_string()))
            .collect(),
    )
}

fn person_mutation(row: &[u8], age: &[u8], firstname: &str, arr: &[&str]) -> Mutation {
    let mut mutation = Mutation::new(row.to_vec());
    mutation.put(*b"cf", *b"age", age.to_vec());
    mutation.put(
        *b"cf",
        *b"firstname",
        encode(&ColumnType::Varchar, &Value::Varchar(firstname.to_string())),
    );
    mutation.put(
        *b"cf",
        *b"arr",
        encode(
            &ColumnType::Array(Box::new(ColumnType::Varchar)),
            &varchar_array(arr),
        ),
    );
    mutation
}

async fn scan_all(client: &CellarClient, table: &str) -> Result<Vec<cellar_store::Cell>> {
    Ok(client
        .scan(table, &Authorizations::empty(), ScanSpec::over(RowRange::all()))
        .await?)
}

#[tokio::test]
async fn mutation_indexing_builds_index_and_metrics() -> Result<()> {
    let client = embedded_client()?;
    let table = people_table();
    create_table_objects(&client, &table).await?;

    let age_value = encode(&ColumnType::Bigint, &Value::Bigint(27));
    let m1 = person_mutation(b"row1", &age_value, "alice", &["abc", "def", "ghi"]);
    let m2 = person_mutation(b"row2", &age_value, "bob", &["ghi", "mno", "abc"]);

    let mut indexer = Indexer::new(
        client.clone(),
        Authorizations::empty(),
        table.clone(),
        BatchWriterConfig::default(),
    )
    .await?;

    indexer.index(m1).await?;
    indexer.flush().await?;

    // One index cell per indexed scalar, one per distinct array element.
    let index_cells = scan_all(&client, &table.index_table_name()).await?;
    assert_eq!(index_cells.len(), 5);
    assert_cell(&index_cells[0], b"abc", "cf_arr", b"row1", b"");
    assert_cell(&index_cells[1], b"alice", "cf_firstname", b"row1", b"");
    assert_cell(&index_cells[2], b"def", "cf_arr", b"row1", b"");
    assert_cell(&index_cells[3], b"ghi", "cf_arr", b"row1", b"");
    assert_cell(&index_cells[4], &age_value, "cf_age", b"row1", b"");

    let metrics = scan_all(&client, &table.metrics_table_name()).await?;
    assert_eq!(metrics.len(), 8);
    assert_cell(&metrics[0], SENTINEL_ROW, "___rows___", b"___card___", b"1");
    assert_cell(&metrics[1], SENTINEL_ROW, "___rows___", b"___first_row___", b"row1");
    assert_cell(&metrics[2], SENTINEL_ROW, "___rows___", b"___last_row___", b"row1");
    assert_cell(&metrics[3], b"abc", "cf_arr", b"___card___", b"1");
    assert_cell(&metrics[4], b"alice", "cf_firstname", b"___card___", b"1");
    assert_cell(&metrics[5], b"def", "cf_arr", b"___card___", b"1");
    assert_cell(&metrics[6], b"ghi", "cf_arr", b"___card___", b"1");
    assert_cell(&metrics[7], &age_value, "cf_age", b"___card___", b"1");

    indexer.index(m2).await?;
    indexer.close().await?;

    // Overlapping values now carry both source rows.
    let index_cells = scan_all(&client, &table.index_table_name()).await?;
    assert_eq!(index_cells.len(), 10);
    assert_cell(&index_cells[0], b"abc", "cf_arr", b"row1", b"");
    assert_cell(&index_cells[1], b"abc", "cf_arr", b"row2", b"");
    assert_cell(&index_cells[2], b"alice", "cf_firstname", b"row1", b"");
    assert_cell(&index_cells[3], b"bob", "cf_firstname", b"row2", b"");
    assert_cell(&index_cells[4], b"def", "cf_arr", b"row1", b"");
    assert_cell(&index_cells[5], b"ghi", "cf_arr", b"row1", b"");
    assert_cell(&index_cells[6], b"ghi", "cf_arr", b"row2", b"");
    assert_cell(&index_cells[7], b"mno", "cf_arr", b"row2", b"");
    assert_cell(&index_cells[8], &age_value, "cf_age", b"row1", b"");
    assert_cell(&index_cells[9], &age_value, "cf_age", b"row2", b"");

    // The summing combiner folded the two per-batch deltas.
    let metrics = scan_all(&client, &table.metrics_table_name()).await?;
    assert_eq!(metrics.len(), 10);
    assert_cell(&metrics[0], SENTINEL_ROW, "___rows___", b"___card___", b"2");
    assert_cell(&metrics[1], SENTINEL_ROW, "___rows___", b"___first_row___", b"row1");
    assert_cell(&metrics[2], SENTINEL_ROW, "___rows___", b"___last_row___", b"row2");
    assert_cell(&metrics[3], b"abc", "cf_arr", b"___card___", b"2");
    assert_cell(&metrics[4], b"alice", "cf_firstname", b"___card___", b"1");
    assert_cell(&metrics[5], b"bob", "cf_firstname", b"___card___", b"1");
    assert_cell(&metrics[6], b"def", "cf_arr", b"___card___", b"1");
    assert_cell(&metrics[7], b"ghi", "cf_arr", b"___card___", b"2");
    assert_cell(&metrics[8], b"mno", "cf_arr", b"___card___", b"1");
    assert_cell(&metrics[9], &age_value, "cf_age", b"___card___", b"2");

    let (first, last) = Indexer::min_max_row_ids(
        &client,
        &Authorizations::empty(),
        &table.metrics_table_name(),
    )
    .await?;
    assert_eq!(first.as_deref(), Some(b"row1".as_slice()));
    assert_eq!(last.as_deref(), Some(b"row2".as_slice()));

    Ok(())
}

#[tokio::test]
async fn unindexed_tables_are_rejected() -> Result<()> {
    let client = embedded_client()?;
    let mut table = people_table();
    for column in &mut table.columns {
        column.indexed = false;
    }
    client.create_table(&table.full_table_name()).await?;

    let err = Indexer::new(
        client,
        Authorizations::empty(),
        table,
        BatchWriterConfig::default(),
    )
    .await
    .expect_err("unindexed table must not open an indexer");
    assert!(matches!(err, ConnectorError::Misconfiguration(_)));
    Ok(())
}

#[tokio::test]
async fn string_serialized_array_tables_are_rejected() -> Result<()> {
    let client = embedded_client()?;
    let mut table = people_table();
    table.serializer = SerializerKind::String;
    client.create_table(&table.full_table_name()).await?;

    let err = Indexer::new(
        client,
        Authorizations::empty(),
        table,
        BatchWriterConfig::default(),
    )
    .await
    .expect_err("string serializer cannot index array columns");
    assert!(matches!(err, ConnectorError::Misconfiguration(_)));
    Ok(())
}

#[tokio::test]
async fn indexing_survives_a_persistent_engine() -> Result<()> {
    let dir = tempfile::TempDir::new()?;
    let client = cellar_store::start_embedded_node(EmbeddedNodeConfig {
        data_dir: Some(dir.path().to_path_buf()),
        ..EmbeddedNodeConfig::default()
    })?;
    let table = people_table();
    create_table_objects(&client, &table).await?;

    let age_value = encode(&ColumnType::Bigint, &Value::Bigint(27));
    let mut indexer = Indexer::new(
        client.clone(),
        Authorizations::empty(),
        table.clone(),
        BatchWriterConfig::default(),
    )
    .await?;
    indexer
        .index(person_mutation(b"row1", &age_value, "alice", &["abc", "def", "ghi"]))
        .await?;
    indexer.close().await?;

    assert_eq!(scan_all(&client, &table.index_table_name()).await?.len(), 5);
    assert_eq!(
        scan_all(&client, &table.metrics_table_name()).await?.len(),
        8
    );
    Ok(())
}
