use std::collections::HashMap;

use icebox::catalog::{Catalog, TableCreateOptions};
use icebox::error::Error;
use icebox::metadata::{TableRequirement, TableUpdate};
use icebox::spec::{
    NestedField, Operation, PrimitiveType, Schema, Snapshot, Summary, Type,
};
use icebox::storage::FileIO;
use icebox::{CancelToken, NamespaceIdent, TableIdent};

use crate::sqlite::sqlite_catalog::SqliteCatalog;

/// Test catalog name.
const CATALOG_NAME: &str = "icebox_test";
/// Test warehouse root inside the memory backend.
const WAREHOUSE: &str = "/warehouse";

async fn new_test_catalog() -> SqliteCatalog {
    SqliteCatalog::new(CATALOG_NAME, ":memory:", WAREHOUSE, FileIO::memory())
        .await
        .unwrap()
}

fn simple_schema() -> Schema {
    Schema::new(
        0,
        vec![
            NestedField::required(1, "id", Type::Primitive(PrimitiveType::Long)),
            NestedField::optional(2, "name", Type::Primitive(PrimitiveType::String)),
        ],
    )
}

fn snapshot(id: i64, timestamp_ms: i64, manifest_list: &str) -> Snapshot {
    Snapshot {
        snapshot_id: id,
        parent_snapshot_id: None,
        sequence_number: 1,
        timestamp_ms,
        manifest_list: manifest_list.to_string(),
        summary: Summary::new(Operation::Append),
        schema_id: Some(0),
    }
}

#[tokio::test]
async fn test_namespace_lifecycle() {
    let catalog = new_test_catalog().await;
    let cancel = CancelToken::new();
    let namespace = NamespaceIdent::parse("analytics").unwrap();

    assert!(!catalog.namespace_exists(&namespace, &cancel).await.unwrap());

    catalog
        .create_namespace(
            &namespace,
            HashMap::from([("desc".to_string(), "x".to_string())]),
            &cancel,
        )
        .await
        .unwrap();
    assert!(catalog.namespace_exists(&namespace, &cancel).await.unwrap());

    // properties include everything supplied plus the sentinel
    let properties = catalog
        .load_namespace_properties(&namespace, &cancel)
        .await
        .unwrap();
    assert_eq!(properties.get("desc").unwrap(), "x");
    assert_eq!(properties.get("exists").unwrap(), "true");

    catalog.drop_namespace(&namespace, &cancel).await.unwrap();
    assert!(!catalog.namespace_exists(&namespace, &cancel).await.unwrap());
}

#[tokio::test]
async fn test_create_namespace_twice_fails() {
    let catalog = new_test_catalog().await;
    let cancel = CancelToken::new();
    let namespace = NamespaceIdent::parse("dup").unwrap();
    catalog
        .create_namespace(&namespace, HashMap::new(), &cancel)
        .await
        .unwrap();
    assert!(matches!(
        catalog.create_namespace(&namespace, HashMap::new(), &cancel).await,
        Err(Error::NamespaceAlreadyExists(_))
    ));
}

#[tokio::test]
async fn test_drop_missing_namespace_fails() {
    let catalog = new_test_catalog().await;
    let cancel = CancelToken::new();
    let namespace = NamespaceIdent::parse("ghost").unwrap();
    assert!(matches!(
        catalog.drop_namespace(&namespace, &cancel).await,
        Err(Error::NoSuchNamespace(_))
    ));
}

#[tokio::test]
async fn test_update_namespace_properties_summary() {
    let catalog = new_test_catalog().await;
    let cancel = CancelToken::new();
    let namespace = NamespaceIdent::parse("props").unwrap();
    catalog
        .create_namespace(
            &namespace,
            HashMap::from([("keep".to_string(), "1".to_string()), ("drop".to_string(), "2".to_string())]),
            &cancel,
        )
        .await
        .unwrap();

    let summary = catalog
        .update_namespace_properties(
            &namespace,
            vec!["drop".to_string(), "absent".to_string(), "exists".to_string()],
            HashMap::from([("added".to_string(), "3".to_string())]),
            &cancel,
        )
        .await
        .unwrap();

    // removed and missing partition the removals; the sentinel is reported
    // missing, never removed
    assert_eq!(summary.removed, vec!["drop".to_string()]);
    assert_eq!(summary.missing, vec!["absent".to_string(), "exists".to_string()]);
    assert_eq!(summary.updated, vec!["added".to_string()]);

    let properties = catalog
        .load_namespace_properties(&namespace, &cancel)
        .await
        .unwrap();
    assert!(properties.contains_key("keep"));
    assert!(!properties.contains_key("drop"));
    assert_eq!(properties.get("added").unwrap(), "3");
    assert_eq!(properties.get("exists").unwrap(), "true");
}

#[tokio::test]
async fn test_list_namespaces_strict_descendants() {
    let catalog = new_test_catalog().await;
    let cancel = CancelToken::new();
    for path in ["a", "a.b", "a.b.c", "ab", "z"] {
        catalog
            .create_namespace(&NamespaceIdent::parse(path).unwrap(), HashMap::new(), &cancel)
            .await
            .unwrap();
    }

    let all = catalog.list_namespaces(None, &cancel).await.unwrap();
    assert_eq!(all.len(), 5);

    let parent = NamespaceIdent::parse("a").unwrap();
    let descendants = catalog.list_namespaces(Some(&parent), &cancel).await.unwrap();
    // excludes the parent itself and the sibling "ab"
    assert_eq!(
        descendants,
        vec![
            NamespaceIdent::parse("a.b").unwrap(),
            NamespaceIdent::parse("a.b.c").unwrap(),
        ]
    );
}

#[tokio::test]
async fn test_create_table_and_load() {
    let catalog = new_test_catalog().await;
    let cancel = CancelToken::new();
    let namespace = NamespaceIdent::parse("ns").unwrap();
    catalog.create_namespace(&namespace, HashMap::new(), &cancel).await.unwrap();

    let identifier = TableIdent::new(namespace, "t").unwrap();
    let table = catalog
        .create_table(&identifier, simple_schema(), TableCreateOptions::default(), &cancel)
        .await
        .unwrap();
    assert_eq!(table.location(), "/warehouse/ns/t");
    assert!(table.metadata_location().ends_with("metadata/v1.metadata.json"));
    assert!(catalog.table_exists(&identifier, &cancel).await.unwrap());

    let loaded = catalog.load_table(&identifier, &cancel).await.unwrap();
    assert_eq!(loaded.metadata(), table.metadata());
    assert_eq!(loaded.metadata().current_schema().unwrap(), &simple_schema());
    assert_eq!(loaded.catalog_name(), CATALOG_NAME);
}

#[tokio::test]
async fn test_create_table_in_missing_namespace_fails() {
    let catalog = new_test_catalog().await;
    let cancel = CancelToken::new();
    let identifier = TableIdent::parse("ns2.t").unwrap();
    assert!(matches!(
        catalog
            .create_table(&identifier, simple_schema(), TableCreateOptions::default(), &cancel)
            .await,
        Err(Error::NoSuchNamespace(_))
    ));
}

#[tokio::test]
async fn test_create_duplicate_table_fails() {
    let catalog = new_test_catalog().await;
    let cancel = CancelToken::new();
    let namespace = NamespaceIdent::parse("ns").unwrap();
    catalog.create_namespace(&namespace, HashMap::new(), &cancel).await.unwrap();
    let identifier = TableIdent::new(namespace, "t").unwrap();
    catalog
        .create_table(&identifier, simple_schema(), TableCreateOptions::default(), &cancel)
        .await
        .unwrap();
    assert!(matches!(
        catalog
            .create_table(&identifier, simple_schema(), TableCreateOptions::default(), &cancel)
            .await,
        Err(Error::TableAlreadyExists(_))
    ));
}

#[tokio::test]
async fn test_commit_advances_pointer_and_version() {
    let catalog = new_test_catalog().await;
    let cancel = CancelToken::new();
    let namespace = NamespaceIdent::parse("ns").unwrap();
    catalog.create_namespace(&namespace, HashMap::new(), &cancel).await.unwrap();
    let identifier = TableIdent::new(namespace, "t").unwrap();
    let table = catalog
        .create_table(&identifier, simple_schema(), TableCreateOptions::default(), &cancel)
        .await
        .unwrap();

    let manifest_list = format!("{}/metadata/snap-77-manifest-list.avro", table.location());
    let (metadata, location) = catalog
        .commit_table(
            &table,
            vec![TableRequirement::AssertCurrentSnapshotId { snapshot_id: None }],
            vec![
                TableUpdate::AddSnapshot {
                    snapshot: snapshot(77, 1_700_000_000_000, &manifest_list),
                },
                TableUpdate::SetCurrentSnapshot { snapshot_id: 77 },
            ],
            &cancel,
        )
        .await
        .unwrap();
    assert!(location.ends_with("metadata/v2.metadata.json"));
    assert_eq!(metadata.current_snapshot_id, Some(77));
    assert_eq!(metadata.metadata_log.len(), 1);

    // a fresh load observes the committed snapshot
    let reloaded = catalog.load_table(&identifier, &cancel).await.unwrap();
    assert_eq!(reloaded.metadata().current_snapshot_id, Some(77));
    assert_eq!(reloaded.metadata_location(), location);
}

#[tokio::test]
async fn test_commit_requirement_violation_is_conflict() {
    let catalog = new_test_catalog().await;
    let cancel = CancelToken::new();
    let namespace = NamespaceIdent::parse("ns").unwrap();
    catalog.create_namespace(&namespace, HashMap::new(), &cancel).await.unwrap();
    let identifier = TableIdent::new(namespace, "t").unwrap();
    let table = catalog
        .create_table(&identifier, simple_schema(), TableCreateOptions::default(), &cancel)
        .await
        .unwrap();

    let result = catalog
        .commit_table(
            &table,
            vec![TableRequirement::AssertCurrentSnapshotId {
                snapshot_id: Some(123),
            }],
            vec![],
            &cancel,
        )
        .await;
    assert!(matches!(result, Err(Error::ConflictingCommit(_))));
}

#[tokio::test]
async fn test_rename_table_keeps_metadata() {
    let catalog = new_test_catalog().await;
    let cancel = CancelToken::new();
    for path in ["src", "dst"] {
        catalog
            .create_namespace(&NamespaceIdent::parse(path).unwrap(), HashMap::new(), &cancel)
            .await
            .unwrap();
    }
    let from = TableIdent::parse("src.t").unwrap();
    let to = TableIdent::parse("dst.renamed").unwrap();
    let created = catalog
        .create_table(&from, simple_schema(), TableCreateOptions::default(), &cancel)
        .await
        .unwrap();

    catalog.rename_table(&from, &to, &cancel).await.unwrap();

    assert!(matches!(
        catalog.load_table(&from, &cancel).await,
        Err(Error::NoSuchTable(_))
    ));
    let renamed = catalog.load_table(&to, &cancel).await.unwrap();
    assert_eq!(renamed.metadata(), created.metadata());
}

#[tokio::test]
async fn test_rename_table_error_cases() {
    let catalog = new_test_catalog().await;
    let cancel = CancelToken::new();
    let namespace = NamespaceIdent::parse("ns").unwrap();
    catalog.create_namespace(&namespace, HashMap::new(), &cancel).await.unwrap();
    let a = TableIdent::parse("ns.a").unwrap();
    let b = TableIdent::parse("ns.b").unwrap();
    catalog
        .create_table(&a, simple_schema(), TableCreateOptions::default(), &cancel)
        .await
        .unwrap();
    catalog
        .create_table(&b, simple_schema(), TableCreateOptions::default(), &cancel)
        .await
        .unwrap();

    assert!(matches!(
        catalog.rename_table(&TableIdent::parse("ns.ghost").unwrap(), &b, &cancel).await,
        Err(Error::NoSuchTable(_))
    ));
    assert!(matches!(
        catalog
            .rename_table(&a, &TableIdent::parse("nowhere.a").unwrap(), &cancel)
            .await,
        Err(Error::NoSuchNamespace(_))
    ));
    assert!(matches!(
        catalog.rename_table(&a, &b, &cancel).await,
        Err(Error::TableAlreadyExists(_))
    ));
}

#[tokio::test]
async fn test_drop_table_then_namespace() {
    let catalog = new_test_catalog().await;
    let cancel = CancelToken::new();
    let namespace = NamespaceIdent::parse("ns").unwrap();
    catalog.create_namespace(&namespace, HashMap::new(), &cancel).await.unwrap();
    let identifier = TableIdent::parse("ns.t").unwrap();
    catalog
        .create_table(&identifier, simple_schema(), TableCreateOptions::default(), &cancel)
        .await
        .unwrap();

    // a populated namespace refuses to drop
    assert!(matches!(
        catalog.drop_namespace(&namespace, &cancel).await,
        Err(Error::NamespaceNotEmpty(_))
    ));

    catalog.drop_table(&identifier, &cancel).await.unwrap();
    assert!(matches!(
        catalog.load_table(&identifier, &cancel).await,
        Err(Error::NoSuchTable(_))
    ));

    catalog.drop_namespace(&namespace, &cancel).await.unwrap();
    assert!(!catalog.namespace_exists(&namespace, &cancel).await.unwrap());
}

#[tokio::test]
async fn test_list_tables() {
    let catalog = new_test_catalog().await;
    let cancel = CancelToken::new();
    let namespace = NamespaceIdent::parse("ns").unwrap();
    catalog.create_namespace(&namespace, HashMap::new(), &cancel).await.unwrap();
    for name in ["zeta", "alpha"] {
        catalog
            .create_table(
                &TableIdent::new(namespace.clone(), name).unwrap(),
                simple_schema(),
                TableCreateOptions::default(),
                &cancel,
            )
            .await
            .unwrap();
    }

    let tables = catalog.list_tables(&namespace, &cancel).await.unwrap();
    assert_eq!(
        tables,
        vec![
            TableIdent::parse("ns.alpha").unwrap(),
            TableIdent::parse("ns.zeta").unwrap(),
        ]
    );

    assert!(matches!(
        catalog
            .list_tables(&NamespaceIdent::parse("ghost").unwrap(), &cancel)
            .await,
        Err(Error::NoSuchNamespace(_))
    ));
}

#[tokio::test]
async fn test_cancelled_token_stops_operations() {
    let catalog = new_test_catalog().await;
    let cancel = CancelToken::new();
    cancel.cancel();
    let namespace = NamespaceIdent::parse("late").unwrap();
    assert!(matches!(
        catalog.create_namespace(&namespace, HashMap::new(), &cancel).await,
        Err(Error::Cancelled(_))
    ));
}

#[tokio::test]
async fn test_file_backed_registry_persists() {
    let tmp_dir = tempfile::tempdir().unwrap();
    let db_path = tmp_dir.path().join("catalog.db");
    let db_path = db_path.to_str().unwrap();
    let warehouse = tmp_dir.path().join("warehouse");
    let warehouse = warehouse.to_str().unwrap();
    let cancel = CancelToken::new();
    let namespace = NamespaceIdent::parse("durable").unwrap();

    {
        let catalog = SqliteCatalog::new(CATALOG_NAME, db_path, warehouse, FileIO::local())
            .await
            .unwrap();
        catalog.create_namespace(&namespace, HashMap::new(), &cancel).await.unwrap();
        catalog
            .create_table(
                &TableIdent::new(namespace.clone(), "t").unwrap(),
                simple_schema(),
                TableCreateOptions::default(),
                &cancel,
            )
            .await
            .unwrap();
    }

    // a second catalog over the same file sees everything
    let reopened = SqliteCatalog::new(CATALOG_NAME, db_path, warehouse, FileIO::local())
        .await
        .unwrap();
    assert!(reopened.namespace_exists(&namespace, &cancel).await.unwrap());
    let table = reopened
        .load_table(&TableIdent::parse("durable.t").unwrap(), &cancel)
        .await
        .unwrap();
    assert_eq!(table.metadata().current_schema().unwrap(), &simple_schema());
}
