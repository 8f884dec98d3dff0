use std::collections::HashMap;

use icebox::catalog::{Catalog, TableCreateOptions};
use icebox::error::Error;
use icebox::metadata::{TableRequirement, TableUpdate};
use icebox::spec::{NestedField, PrimitiveType, Schema, Type};
use icebox::storage::FileIO;
use icebox::{CancelToken, NamespaceIdent, TableIdent};

use crate::json::json_catalog::JsonCatalog;

const REGISTRY_URI: &str = "/registry/catalog.json";
const WAREHOUSE: &str = "/warehouse";

async fn new_test_catalog() -> JsonCatalog {
    JsonCatalog::new("icebox_json_test", REGISTRY_URI, WAREHOUSE, FileIO::memory())
        .await
        .unwrap()
}

fn simple_schema() -> Schema {
    Schema::new(
        0,
        vec![NestedField::required(1, "id", Type::Primitive(PrimitiveType::Long))],
    )
}

#[tokio::test]
async fn test_namespace_lifecycle() {
    let catalog = new_test_catalog().await;
    let cancel = CancelToken::new();
    let namespace = NamespaceIdent::parse("analytics").unwrap();

    catalog
        .create_namespace(
            &namespace,
            HashMap::from([("desc".to_string(), "x".to_string())]),
            &cancel,
        )
        .await
        .unwrap();
    assert!(catalog.namespace_exists(&namespace, &cancel).await.unwrap());
    assert!(matches!(
        catalog.create_namespace(&namespace, HashMap::new(), &cancel).await,
        Err(Error::NamespaceAlreadyExists(_))
    ));

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
async fn test_table_lifecycle_and_registry_persistence() {
    let file_io = FileIO::memory();
    let cancel = CancelToken::new();
    let namespace = NamespaceIdent::parse("ns").unwrap();
    let identifier = TableIdent::parse("ns.t").unwrap();

    {
        let catalog = JsonCatalog::new("icebox_json_test", REGISTRY_URI, WAREHOUSE, file_io.clone())
            .await
            .unwrap();
        catalog.create_namespace(&namespace, HashMap::new(), &cancel).await.unwrap();
        catalog
            .create_table(&identifier, simple_schema(), TableCreateOptions::default(), &cancel)
            .await
            .unwrap();
    }

    // a second catalog over the same registry file sees the table
    let reopened = JsonCatalog::new("icebox_json_test", REGISTRY_URI, WAREHOUSE, file_io)
        .await
        .unwrap();
    assert!(reopened.table_exists(&identifier, &cancel).await.unwrap());
    let table = reopened.load_table(&identifier, &cancel).await.unwrap();
    assert_eq!(table.location(), "/warehouse/ns/t");
    assert!(table.metadata_location().ends_with("metadata/v1.metadata.json"));

    assert_eq!(
        reopened.list_tables(&namespace, &cancel).await.unwrap(),
        vec![identifier.clone()]
    );

    reopened.drop_table(&identifier, &cancel).await.unwrap();
    assert!(matches!(
        reopened.load_table(&identifier, &cancel).await,
        Err(Error::NoSuchTable(_))
    ));
}

#[tokio::test]
async fn test_commit_and_conflict() {
    let catalog = new_test_catalog().await;
    let cancel = CancelToken::new();
    let namespace = NamespaceIdent::parse("ns").unwrap();
    catalog.create_namespace(&namespace, HashMap::new(), &cancel).await.unwrap();
    let identifier = TableIdent::parse("ns.t").unwrap();
    let table = catalog
        .create_table(&identifier, simple_schema(), TableCreateOptions::default(), &cancel)
        .await
        .unwrap();

    let (metadata, location) = catalog
        .commit_table(
            &table,
            vec![TableRequirement::AssertCurrentSnapshotId { snapshot_id: None }],
            vec![TableUpdate::SetProperties {
                updates: HashMap::from([("icebox.owner".to_string(), "demo".to_string())]),
            }],
            &cancel,
        )
        .await
        .unwrap();
    assert!(location.ends_with("metadata/v2.metadata.json"));
    assert_eq!(metadata.properties.get("icebox.owner").unwrap(), "demo");

    // a requirement pinned to a snapshot that never existed conflicts
    assert!(matches!(
        catalog
            .commit_table(
                &table,
                vec![TableRequirement::AssertCurrentSnapshotId {
                    snapshot_id: Some(1),
                }],
                vec![],
                &cancel,
            )
            .await,
        Err(Error::ConflictingCommit(_))
    ));
}

#[tokio::test]
async fn test_drop_namespace_with_table_refused() {
    let catalog = new_test_catalog().await;
    let cancel = CancelToken::new();
    let namespace = NamespaceIdent::parse("ns").unwrap();
    catalog.create_namespace(&namespace, HashMap::new(), &cancel).await.unwrap();
    catalog
        .create_table(
            &TableIdent::parse("ns.t").unwrap(),
            simple_schema(),
            TableCreateOptions::default(),
            &cancel,
        )
        .await
        .unwrap();
    assert!(matches!(
        catalog.drop_namespace(&namespace, &cancel).await,
        Err(Error::NamespaceNotEmpty(_))
    ));
}

#[tokio::test]
async fn test_rename_table_moves_record() {
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
    assert!(!catalog.table_exists(&from, &cancel).await.unwrap());
    let renamed = catalog.load_table(&to, &cancel).await.unwrap();
    assert_eq!(renamed.metadata(), created.metadata());
}

#[tokio::test]
async fn test_list_namespaces_descendants() {
    let catalog = new_test_catalog().await;
    let cancel = CancelToken::new();
    for path in ["a", "a.b", "ab"] {
        catalog
            .create_namespace(&NamespaceIdent::parse(path).unwrap(), HashMap::new(), &cancel)
            .await
            .unwrap();
    }
    let parent = NamespaceIdent::parse("a").unwrap();
    assert_eq!(
        catalog.list_namespaces(Some(&parent), &cancel).await.unwrap(),
        vec![NamespaceIdent::parse("a.b").unwrap()]
    );
}
