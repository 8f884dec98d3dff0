use std::collections::HashMap;

use async_trait::async_trait;

use crate::cancel::CancelToken;
use crate::error::Result;
use crate::ident::{NamespaceIdent, TableIdent};
use crate::metadata::{TableRequirement, TableUpdate};
use crate::spec::{Schema, TableMetadata};
use crate::storage::FileIO;
use crate::table::Table;

/// Options for table creation.
#[derive(Clone, Debug, Default)]
pub struct TableCreateOptions {
    /// Explicit table location; defaults to `warehouse/ns/.../table`.
    pub location: Option<String>,
    pub properties: HashMap<String, String>,
}

/// Outcome of a namespace property update: `removed` and `missing` partition
/// the requested removals, `updated` lists the upserted keys.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PropertyUpdateSummary {
    pub removed: Vec<String>,
    pub updated: Vec<String>,
    pub missing: Vec<String>,
}

/// The catalog: single source of truth for namespaces, table registration
/// and the current-metadata pointer. All mutating table operations traverse
/// the catalog; the pointer swap inside `commit_table` is the linearization
/// point for commits.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// The catalog's identifying name, stored with every record.
    fn name(&self) -> &str;

    /// Storage handle used for metadata and data files.
    fn file_io(&self) -> &FileIO;

    /// Fails `NamespaceAlreadyExists` if present. Writes the sentinel row and
    /// property rows atomically.
    async fn create_namespace(
        &self,
        namespace: &NamespaceIdent,
        properties: HashMap<String, String>,
        cancel: &CancelToken,
    ) -> Result<()>;

    /// Fails `NoSuchNamespace` if absent, `NamespaceNotEmpty` if any table
    /// remains under it.
    async fn drop_namespace(&self, namespace: &NamespaceIdent, cancel: &CancelToken) -> Result<()>;

    async fn namespace_exists(
        &self,
        namespace: &NamespaceIdent,
        cancel: &CancelToken,
    ) -> Result<bool>;

    /// Full property map including the `exists` sentinel.
    async fn load_namespace_properties(
        &self,
        namespace: &NamespaceIdent,
        cancel: &CancelToken,
    ) -> Result<HashMap<String, String>>;

    /// Atomic removals-then-updates transaction. A request to remove the
    /// sentinel is ignored and reported as missing.
    async fn update_namespace_properties(
        &self,
        namespace: &NamespaceIdent,
        removals: Vec<String>,
        updates: HashMap<String, String>,
        cancel: &CancelToken,
    ) -> Result<PropertyUpdateSummary>;

    /// All namespaces, or only the strict descendants of `parent`.
    async fn list_namespaces(
        &self,
        parent: Option<&NamespaceIdent>,
        cancel: &CancelToken,
    ) -> Result<Vec<NamespaceIdent>>;

    /// Writes the initial metadata file and inserts the table record with a
    /// null previous pointer.
    async fn create_table(
        &self,
        identifier: &TableIdent,
        schema: Schema,
        options: TableCreateOptions,
        cancel: &CancelToken,
    ) -> Result<Table>;

    async fn load_table(&self, identifier: &TableIdent, cancel: &CancelToken) -> Result<Table>;

    /// Verifies `requirements` against the metadata current at commit time,
    /// applies `updates`, writes the next metadata file, and atomically flips
    /// the pointer. Zero rows affected by the conditional pointer update
    /// means a concurrent commit won: `ConflictingCommit`.
    async fn commit_table(
        &self,
        table: &Table,
        requirements: Vec<TableRequirement>,
        updates: Vec<TableUpdate>,
        cancel: &CancelToken,
    ) -> Result<(TableMetadata, String)>;

    /// Removes the table record. Files remain on storage for recovery.
    async fn drop_table(&self, identifier: &TableIdent, cancel: &CancelToken) -> Result<()>;

    async fn rename_table(
        &self,
        from: &TableIdent,
        to: &TableIdent,
        cancel: &CancelToken,
    ) -> Result<()>;

    async fn list_tables(
        &self,
        namespace: &NamespaceIdent,
        cancel: &CancelToken,
    ) -> Result<Vec<TableIdent>>;

    async fn table_exists(&self, identifier: &TableIdent, cancel: &CancelToken) -> Result<bool>;
}
