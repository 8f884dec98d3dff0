use std::collections::HashMap;
use std::sync::Arc;

use arrow_array::{Int64Array, RecordBatch, StringArray};
use arrow_schema::{DataType, Field, Schema as ArrowSchema};
use parquet::arrow::ArrowWriter;
use tempfile::TempDir;

use icebox::catalog::{Catalog, TableCreateOptions};
use icebox::error::Error as IceboxError;
use icebox::spec::{NestedField, Operation, PrimitiveType, Schema, Type};
use icebox::table::writer::{self, WriteOptions};
use icebox::table::{compaction, scan};
use icebox::{CancelToken, NamespaceIdent, TableIdent};
use icebox_service::{start_with_config, IceboxService, ServiceConfig};
use more_asserts as ma;

fn table_schema() -> Schema {
    Schema::new(
        0,
        vec![
            NestedField::required(1, "id", Type::Primitive(PrimitiveType::Long)),
            NestedField::optional(2, "name", Type::Primitive(PrimitiveType::String)),
        ],
    )
}

fn rows(start: i64, count: usize) -> RecordBatch {
    let schema = Arc::new(ArrowSchema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("name", DataType::Utf8, true),
    ]));
    let ids: Vec<i64> = (start..start + count as i64).collect();
    let names: Vec<String> = ids.iter().map(|id| format!("row-{id}")).collect();
    RecordBatch::try_new(
        schema,
        vec![
            Arc::new(Int64Array::from(ids)),
            Arc::new(StringArray::from(names)),
        ],
    )
    .unwrap()
}

async fn new_service(tmp_dir: &TempDir) -> IceboxService {
    start_with_config(ServiceConfig::local("icebox_test", tmp_dir.path().to_str().unwrap()))
        .await
        .unwrap()
}

async fn create_populated_table(
    service: &IceboxService,
    cancel: &CancelToken,
    identifier: &TableIdent,
    row_count: usize,
) -> icebox::Table {
    let catalog = service.catalog();
    catalog
        .create_namespace(identifier.namespace(), HashMap::new(), cancel)
        .await
        .unwrap();
    let table = catalog
        .create_table(identifier, table_schema(), TableCreateOptions::default(), cancel)
        .await
        .unwrap();
    writer::append(
        catalog.as_ref(),
        &table,
        &[rows(0, row_count)],
        &WriteOptions::default(),
        cancel,
    )
    .await
    .unwrap()
}

fn count_of(result: &icebox_datafusion::QueryResult) -> i64 {
    result.batches[0]
        .column(0)
        .as_any()
        .downcast_ref::<Int64Array>()
        .unwrap()
        .value(0)
}

// Scenario: create a namespace with properties, load them back.
#[tokio::test]
async fn test_namespace_properties_round_trip() {
    let tmp_dir = TempDir::new().unwrap();
    let service = new_service(&tmp_dir).await;
    let cancel = CancelToken::new();
    let namespace = NamespaceIdent::parse("analytics").unwrap();

    service
        .catalog()
        .create_namespace(
            &namespace,
            HashMap::from([("desc".to_string(), "x".to_string())]),
            &cancel,
        )
        .await
        .unwrap();

    let properties = service
        .catalog()
        .load_namespace_properties(&namespace, &cancel)
        .await
        .unwrap();
    assert_eq!(
        properties,
        HashMap::from([
            ("desc".to_string(), "x".to_string()),
            ("exists".to_string(), "true".to_string()),
        ])
    );
}

// Scenario: create a table and confirm it is registered.
#[tokio::test]
async fn test_create_table_exists() {
    let tmp_dir = TempDir::new().unwrap();
    let service = new_service(&tmp_dir).await;
    let cancel = CancelToken::new();
    let namespace = NamespaceIdent::parse("ns").unwrap();
    service
        .catalog()
        .create_namespace(&namespace, HashMap::new(), &cancel)
        .await
        .unwrap();

    let identifier = TableIdent::parse("ns.t").unwrap();
    service
        .catalog()
        .create_table(&identifier, table_schema(), TableCreateOptions::default(), &cancel)
        .await
        .unwrap();
    assert!(service.catalog().table_exists(&identifier, &cancel).await.unwrap());
}

// Scenario: creating a table under a missing namespace fails.
#[tokio::test]
async fn test_create_table_missing_namespace() {
    let tmp_dir = TempDir::new().unwrap();
    let service = new_service(&tmp_dir).await;
    let cancel = CancelToken::new();
    let identifier = TableIdent::parse("ns2.t").unwrap();
    assert!(matches!(
        service
            .catalog()
            .create_table(&identifier, table_schema(), TableCreateOptions::default(), &cancel)
            .await,
        Err(IceboxError::NoSuchNamespace(_))
    ));
}

// Scenario: append 100 rows, count them through SQL.
#[tokio::test]
async fn test_append_and_count() {
    let tmp_dir = TempDir::new().unwrap();
    let service = new_service(&tmp_dir).await;
    let cancel = CancelToken::new();
    let identifier = TableIdent::parse("ns.t").unwrap();
    create_populated_table(&service, &cancel, &identifier, 100).await;

    let result = service
        .query("SELECT COUNT(*) FROM ns.t", &cancel)
        .await
        .unwrap();
    assert_eq!(count_of(&result), 100);
}

// Scenario: time travel back to the snapshot before a second append.
#[tokio::test]
async fn test_time_travel_count() {
    let tmp_dir = TempDir::new().unwrap();
    let service = new_service(&tmp_dir).await;
    let cancel = CancelToken::new();
    let identifier = TableIdent::parse("ns.t").unwrap();
    let table = create_populated_table(&service, &cancel, &identifier, 100).await;
    let first_snapshot = table.metadata().current_snapshot_id.unwrap();

    writer::append(
        service.catalog().as_ref(),
        &table,
        &[rows(100, 50)],
        &WriteOptions::default(),
        &cancel,
    )
    .await
    .unwrap();

    let now = service.query("SELECT COUNT(*) FROM ns.t", &cancel).await.unwrap();
    assert_eq!(count_of(&now), 150);

    let pinned = service
        .query_as_of(
            "SELECT COUNT(*) FROM ns.t",
            &identifier,
            &first_snapshot.to_string(),
            &cancel,
        )
        .await
        .unwrap();
    assert_eq!(count_of(&pinned), 100);
}

// Scenario: two appends against the same expected parent; the loser gets a
// conflict and must reload.
#[tokio::test]
async fn test_conflicting_commit() {
    let tmp_dir = TempDir::new().unwrap();
    let service = new_service(&tmp_dir).await;
    let cancel = CancelToken::new();
    let identifier = TableIdent::parse("ns.t").unwrap();
    let stale = create_populated_table(&service, &cancel, &identifier, 10).await;

    writer::append(
        service.catalog().as_ref(),
        &stale,
        &[rows(10, 10)],
        &WriteOptions::default(),
        &cancel,
    )
    .await
    .unwrap();

    let second = writer::append(
        service.catalog().as_ref(),
        &stale,
        &[rows(20, 10)],
        &WriteOptions::default(),
        &cancel,
    )
    .await;
    assert!(matches!(second, Err(IceboxError::ConflictingCommit(_))));

    // reload-and-retry succeeds
    let fresh = service.catalog().load_table(&identifier, &cancel).await.unwrap();
    writer::append(
        service.catalog().as_ref(),
        &fresh,
        &[rows(20, 10)],
        &WriteOptions::default(),
        &cancel,
    )
    .await
    .unwrap();
}

// Scenario: drop the table, then the namespace.
#[tokio::test]
async fn test_drop_table_and_namespace() {
    let tmp_dir = TempDir::new().unwrap();
    let service = new_service(&tmp_dir).await;
    let cancel = CancelToken::new();
    let identifier = TableIdent::parse("ns.t").unwrap();
    create_populated_table(&service, &cancel, &identifier, 5).await;

    service.catalog().drop_table(&identifier, &cancel).await.unwrap();
    service
        .catalog()
        .drop_namespace(identifier.namespace(), &cancel)
        .await
        .unwrap();

    assert!(matches!(
        service.catalog().load_table(&identifier, &cancel).await,
        Err(IceboxError::NoSuchTable(_))
    ));
    assert!(!service
        .catalog()
        .namespace_exists(identifier.namespace(), &cancel)
        .await
        .unwrap());
}

#[tokio::test]
async fn test_import_parquet_creates_and_counts() {
    let tmp_dir = TempDir::new().unwrap();
    let service = new_service(&tmp_dir).await;
    let cancel = CancelToken::new();

    // produce a standalone parquet file to import
    let source_path = tmp_dir.path().join("trips.parquet");
    let file = std::fs::File::create(&source_path).unwrap();
    let batch = rows(0, 42);
    let mut parquet_writer = ArrowWriter::try_new(file, batch.schema(), None).unwrap();
    parquet_writer.write(&batch).unwrap();
    parquet_writer.close().unwrap();

    let namespace = NamespaceIdent::parse("imports").unwrap();
    service
        .catalog()
        .create_namespace(&namespace, HashMap::new(), &cancel)
        .await
        .unwrap();
    let identifier = TableIdent::parse("imports.trips").unwrap();
    let outcome = service
        .import(&identifier, source_path.to_str().unwrap(), &cancel)
        .await
        .unwrap();
    assert!(outcome.created);
    assert_eq!(outcome.records, 42);

    let result = service
        .query("SELECT COUNT(*) FROM imports.trips", &cancel)
        .await
        .unwrap();
    assert_eq!(count_of(&result), 42);

    // the inferred schema carries breadth-first ids from 1
    let table = service.catalog().load_table(&identifier, &cancel).await.unwrap();
    let schema = table.metadata().current_schema().unwrap().clone();
    assert_eq!(schema.field_by_name("id").unwrap().id, 1);
    assert_eq!(schema.field_by_name("name").unwrap().id, 2);
}

#[tokio::test]
async fn test_compaction_preserves_rows_and_dereferences_files() {
    let tmp_dir = TempDir::new().unwrap();
    let service = new_service(&tmp_dir).await;
    let cancel = CancelToken::new();
    let identifier = TableIdent::parse("ns.t").unwrap();
    let catalog = service.catalog();

    // three appends leave three data files behind
    let mut table = create_populated_table(&service, &cancel, &identifier, 30).await;
    for start in [30i64, 60] {
        table = writer::append(
            catalog.as_ref(),
            &table,
            &[rows(start, 30)],
            &WriteOptions::default(),
            &cancel,
        )
        .await
        .unwrap();
    }
    let files_before = scan::snapshot_data_files(&table, None).await.unwrap();
    assert_eq!(files_before.len(), 3);

    let table = compaction::compact(
        catalog.as_ref(),
        &table,
        compaction::FileSelection::All,
        &cancel,
    )
    .await
    .unwrap();

    let files_after = scan::snapshot_data_files(&table, None).await.unwrap();
    assert_eq!(files_after.len(), 1);
    assert_eq!(files_after[0].record_count, 90);
    ma::assert_gt!(files_after[0].file_size_in_bytes, 0);
    assert_eq!(
        table.metadata().current_snapshot().unwrap().summary.operation,
        Operation::Replace
    );

    // superseded files stay on storage, merely unreferenced
    for file in &files_before {
        assert!(table.file_io().exists(&file.file_path).await.unwrap());
    }

    let result = service.query("SELECT COUNT(*) FROM ns.t", &cancel).await.unwrap();
    assert_eq!(count_of(&result), 90);
}

#[tokio::test]
async fn test_overwrite_dereferences_previous_contents() {
    let tmp_dir = TempDir::new().unwrap();
    let service = new_service(&tmp_dir).await;
    let cancel = CancelToken::new();
    let identifier = TableIdent::parse("ns.t").unwrap();
    let table = create_populated_table(&service, &cancel, &identifier, 100).await;

    let table = writer::overwrite(
        service.catalog().as_ref(),
        &table,
        &[rows(0, 7)],
        &WriteOptions::default(),
        &cancel,
    )
    .await
    .unwrap();
    assert_eq!(
        table.metadata().current_snapshot().unwrap().summary.operation,
        Operation::Overwrite
    );

    let result = service.query("SELECT COUNT(*) FROM ns.t", &cancel).await.unwrap();
    assert_eq!(count_of(&result), 7);
}

#[tokio::test]
async fn test_snapshot_log_timestamps_monotonic() {
    let tmp_dir = TempDir::new().unwrap();
    let service = new_service(&tmp_dir).await;
    let cancel = CancelToken::new();
    let identifier = TableIdent::parse("ns.t").unwrap();
    let mut table = create_populated_table(&service, &cancel, &identifier, 10).await;
    for start in [10i64, 20, 30] {
        table = writer::append(
            service.catalog().as_ref(),
            &table,
            &[rows(start, 10)],
            &WriteOptions::default(),
            &cancel,
        )
        .await
        .unwrap();
    }

    let log = &table.metadata().snapshot_log;
    assert_eq!(log.len(), 4);
    for pair in log.windows(2) {
        assert!(pair[0].timestamp_ms <= pair[1].timestamp_ms);
    }

    // snapshot summaries carry exact record counts
    let current = table.metadata().current_snapshot().unwrap();
    assert_eq!(current.summary.additional.get("added-records").unwrap(), "10");
    assert_eq!(current.summary.additional.get("total-records").unwrap(), "40");
}

#[tokio::test]
async fn test_json_catalog_backend() {
    let tmp_dir = TempDir::new().unwrap();
    let base = tmp_dir.path().to_str().unwrap();
    let config = ServiceConfig {
        name: "icebox_json".to_string(),
        catalog: icebox_service::CatalogConfig {
            kind: icebox_service::CatalogKind::Json,
            sqlite: None,
            json: Some(icebox_service::JsonCatalogConfig {
                uri: format!("{base}/catalog.json"),
                warehouse: format!("{base}/warehouse"),
            }),
        },
        storage: icebox_service::StorageConfig {
            kind: icebox_service::StorageKind::Fs,
            filesystem: Some(icebox_service::FilesystemConfig {
                root_path: format!("{base}/warehouse"),
            }),
        },
    };
    let service = start_with_config(config).await.unwrap();
    let cancel = CancelToken::new();
    let identifier = TableIdent::parse("ns.t").unwrap();
    create_populated_table(&service, &cancel, &identifier, 25).await;

    let result = service.query("SELECT COUNT(*) FROM ns.t", &cancel).await.unwrap();
    assert_eq!(count_of(&result), 25);

    // the registry document itself is a readable JSON file
    let registry = std::fs::read_to_string(format!("{base}/catalog.json")).unwrap();
    assert!(registry.contains("\"ns\""));
}
