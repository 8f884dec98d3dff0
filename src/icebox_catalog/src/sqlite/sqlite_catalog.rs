use std::collections::HashMap;
use std::str::FromStr;

use async_trait::async_trait;
use icebox_error::ErrorStruct;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use tracing::debug;

use icebox::catalog::{Catalog, PropertyUpdateSummary, TableCreateOptions};
use icebox::error::{Error, Result};
use icebox::metadata::{
    apply_updates, metadata_file_path, new_table_metadata, parse_metadata_version,
    push_metadata_log, TableRequirement, TableUpdate,
};
use icebox::spec::{PartitionSpec, Schema, SortOrder, TableMetadata};
use icebox::storage::FileIO;
use icebox::{CancelToken, NamespaceIdent, Table, TableIdent};

use crate::validate::{validate_namespace, validate_table_ident};

/// Sentinel property marking namespace presence.
const NAMESPACE_EXISTS_KEY: &str = "exists";
const NAMESPACE_EXISTS_VALUE: &str = "true";

const CREATE_TABLES_TABLE: &str = "CREATE TABLE IF NOT EXISTS iceberg_tables (
    catalog_name TEXT NOT NULL,
    table_namespace TEXT NOT NULL,
    table_name TEXT NOT NULL,
    metadata_location TEXT,
    previous_metadata_location TEXT,
    PRIMARY KEY (catalog_name, table_namespace, table_name)
)";

const CREATE_NAMESPACE_PROPERTIES_TABLE: &str =
    "CREATE TABLE IF NOT EXISTS iceberg_namespace_properties (
    catalog_name TEXT NOT NULL,
    namespace TEXT NOT NULL,
    property_key TEXT NOT NULL,
    property_value TEXT,
    PRIMARY KEY (catalog_name, namespace, property_key)
)";

/// Catalog store over a SQLite registry. Namespace paths are persisted
/// dot-joined; the commit pointer swap is a conditional UPDATE, which makes
/// it the linearization point for commits on a table.
pub struct SqliteCatalog {
    name: String,
    warehouse: String,
    pool: SqlitePool,
    file_io: FileIO,
}

fn backend_err(source: sqlx::Error) -> Error {
    Error::CatalogBackend(
        ErrorStruct::permanent(format!("sqlite catalog error: {source}")).with_source(source),
    )
}

impl SqliteCatalog {
    /// Opens (or creates) the registry at `database_path`; `":memory:"` keeps
    /// it in process memory.
    pub async fn new(
        name: impl Into<String>,
        database_path: &str,
        warehouse: impl Into<String>,
        file_io: FileIO,
    ) -> Result<Self> {
        let in_memory = database_path == ":memory:";
        let uri = if in_memory {
            "sqlite::memory:".to_string()
        } else {
            format!("sqlite://{database_path}")
        };
        let options = SqliteConnectOptions::from_str(&uri)
            .map_err(backend_err)?
            .create_if_missing(true);
        // a single pinned connection keeps an in-memory database alive and
        // shared; file-backed registries can fan out
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };
        let pool = pool_options.connect_with(options).await.map_err(backend_err)?;

        let catalog = Self {
            name: name.into(),
            warehouse: warehouse.into().trim_end_matches('/').to_string(),
            pool,
            file_io,
        };
        catalog.initialize().await?;
        Ok(catalog)
    }

    /// Creates both registry tables idempotently.
    async fn initialize(&self) -> Result<()> {
        sqlx::query(CREATE_TABLES_TABLE)
            .execute(&self.pool)
            .await
            .map_err(backend_err)?;
        sqlx::query(CREATE_NAMESPACE_PROPERTIES_TABLE)
            .execute(&self.pool)
            .await
            .map_err(backend_err)?;
        Ok(())
    }

    pub fn warehouse(&self) -> &str {
        &self.warehouse
    }

    fn default_table_location(&self, identifier: &TableIdent) -> String {
        format!(
            "{}/{}/{}",
            self.warehouse,
            identifier.namespace().join("/"),
            identifier.name()
        )
    }

    async fn namespace_row_count(&self, namespace: &NamespaceIdent) -> Result<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS cnt FROM iceberg_namespace_properties
             WHERE catalog_name = ? AND namespace = ?",
        )
        .bind(&self.name)
        .bind(namespace.encode())
        .fetch_one(&self.pool)
        .await
        .map_err(backend_err)?;
        Ok(row.get::<i64, _>("cnt"))
    }

    async fn table_count_under(&self, namespace: &NamespaceIdent) -> Result<i64> {
        let encoded = namespace.encode();
        let row = sqlx::query(
            "SELECT COUNT(*) AS cnt FROM iceberg_tables
             WHERE catalog_name = ? AND (table_namespace = ? OR table_namespace LIKE ?)",
        )
        .bind(&self.name)
        .bind(&encoded)
        .bind(format!("{encoded}.%"))
        .fetch_one(&self.pool)
        .await
        .map_err(backend_err)?;
        Ok(row.get::<i64, _>("cnt"))
    }

    async fn current_metadata_location(&self, identifier: &TableIdent) -> Result<String> {
        let row = sqlx::query(
            "SELECT metadata_location FROM iceberg_tables
             WHERE catalog_name = ? AND table_namespace = ? AND table_name = ?",
        )
        .bind(&self.name)
        .bind(identifier.namespace().encode())
        .bind(identifier.name())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend_err)?;
        match row {
            Some(row) => row
                .get::<Option<String>, _>("metadata_location")
                .ok_or_else(|| Error::no_such_table(identifier)),
            None => Err(Error::no_such_table(identifier)),
        }
    }

    async fn read_metadata(&self, location: &str) -> Result<TableMetadata> {
        let bytes = self.file_io.read(location).await?;
        TableMetadata::parse(&bytes)
    }
}

#[async_trait]
impl Catalog for SqliteCatalog {
    fn name(&self) -> &str {
        &self.name
    }

    fn file_io(&self) -> &FileIO {
        &self.file_io
    }

    async fn create_namespace(
        &self,
        namespace: &NamespaceIdent,
        properties: HashMap<String, String>,
        cancel: &CancelToken,
    ) -> Result<()> {
        validate_namespace(namespace)?;
        cancel.check("create_namespace")?;
        if self.namespace_row_count(namespace).await? > 0 {
            return Err(Error::namespace_already_exists(namespace));
        }

        let mut tx = self.pool.begin().await.map_err(backend_err)?;
        sqlx::query(
            "INSERT OR REPLACE INTO iceberg_namespace_properties
             (catalog_name, namespace, property_key, property_value) VALUES (?, ?, ?, ?)",
        )
        .bind(&self.name)
        .bind(namespace.encode())
        .bind(NAMESPACE_EXISTS_KEY)
        .bind(NAMESPACE_EXISTS_VALUE)
        .execute(&mut *tx)
        .await
        .map_err(backend_err)?;
        for (key, value) in &properties {
            sqlx::query(
                "INSERT OR REPLACE INTO iceberg_namespace_properties
                 (catalog_name, namespace, property_key, property_value) VALUES (?, ?, ?, ?)",
            )
            .bind(&self.name)
            .bind(namespace.encode())
            .bind(key)
            .bind(value)
            .execute(&mut *tx)
            .await
            .map_err(backend_err)?;
        }
        tx.commit().await.map_err(backend_err)?;
        debug!(namespace = %namespace, "created namespace");
        Ok(())
    }

    async fn drop_namespace(&self, namespace: &NamespaceIdent, cancel: &CancelToken) -> Result<()> {
        validate_namespace(namespace)?;
        cancel.check("drop_namespace")?;
        if self.namespace_row_count(namespace).await? == 0 {
            return Err(Error::no_such_namespace(namespace));
        }
        if self.table_count_under(namespace).await? > 0 {
            return Err(Error::namespace_not_empty(namespace));
        }
        sqlx::query(
            "DELETE FROM iceberg_namespace_properties WHERE catalog_name = ? AND namespace = ?",
        )
        .bind(&self.name)
        .bind(namespace.encode())
        .execute(&self.pool)
        .await
        .map_err(backend_err)?;
        debug!(namespace = %namespace, "dropped namespace");
        Ok(())
    }

    async fn namespace_exists(
        &self,
        namespace: &NamespaceIdent,
        cancel: &CancelToken,
    ) -> Result<bool> {
        validate_namespace(namespace)?;
        cancel.check("namespace_exists")?;
        Ok(self.namespace_row_count(namespace).await? > 0)
    }

    async fn load_namespace_properties(
        &self,
        namespace: &NamespaceIdent,
        cancel: &CancelToken,
    ) -> Result<HashMap<String, String>> {
        validate_namespace(namespace)?;
        cancel.check("load_namespace_properties")?;
        let rows = sqlx::query(
            "SELECT property_key, property_value FROM iceberg_namespace_properties
             WHERE catalog_name = ? AND namespace = ?",
        )
        .bind(&self.name)
        .bind(namespace.encode())
        .fetch_all(&self.pool)
        .await
        .map_err(backend_err)?;
        if rows.is_empty() {
            return Err(Error::no_such_namespace(namespace));
        }
        Ok(rows
            .into_iter()
            .map(|row| {
                (
                    row.get::<String, _>("property_key"),
                    row.get::<Option<String>, _>("property_value").unwrap_or_default(),
                )
            })
            .collect())
    }

    async fn update_namespace_properties(
        &self,
        namespace: &NamespaceIdent,
        removals: Vec<String>,
        updates: HashMap<String, String>,
        cancel: &CancelToken,
    ) -> Result<PropertyUpdateSummary> {
        validate_namespace(namespace)?;
        cancel.check("update_namespace_properties")?;
        if self.namespace_row_count(namespace).await? == 0 {
            return Err(Error::no_such_namespace(namespace));
        }

        let mut summary = PropertyUpdateSummary::default();
        let mut tx = self.pool.begin().await.map_err(backend_err)?;
        for key in &removals {
            // the sentinel cannot be removed; report the request as missing
            if key == NAMESPACE_EXISTS_KEY {
                summary.missing.push(key.clone());
                continue;
            }
            let result = sqlx::query(
                "DELETE FROM iceberg_namespace_properties
                 WHERE catalog_name = ? AND namespace = ? AND property_key = ?",
            )
            .bind(&self.name)
            .bind(namespace.encode())
            .bind(key)
            .execute(&mut *tx)
            .await
            .map_err(backend_err)?;
            if result.rows_affected() > 0 {
                summary.removed.push(key.clone());
            } else {
                summary.missing.push(key.clone());
            }
        }
        for (key, value) in &updates {
            sqlx::query(
                "INSERT OR REPLACE INTO iceberg_namespace_properties
                 (catalog_name, namespace, property_key, property_value) VALUES (?, ?, ?, ?)",
            )
            .bind(&self.name)
            .bind(namespace.encode())
            .bind(key)
            .bind(value)
            .execute(&mut *tx)
            .await
            .map_err(backend_err)?;
            summary.updated.push(key.clone());
        }
        tx.commit().await.map_err(backend_err)?;

        summary.removed.sort();
        summary.updated.sort();
        summary.missing.sort();
        Ok(summary)
    }

    async fn list_namespaces(
        &self,
        parent: Option<&NamespaceIdent>,
        cancel: &CancelToken,
    ) -> Result<Vec<NamespaceIdent>> {
        cancel.check("list_namespaces")?;
        if let Some(parent) = parent {
            validate_namespace(parent)?;
            if self.namespace_row_count(parent).await? == 0 {
                return Err(Error::no_such_namespace(parent));
            }
        }
        let rows = sqlx::query(
            "SELECT DISTINCT namespace FROM iceberg_namespace_properties
             WHERE catalog_name = ? ORDER BY namespace",
        )
        .bind(&self.name)
        .fetch_all(&self.pool)
        .await
        .map_err(backend_err)?;

        let mut namespaces = Vec::new();
        for row in rows {
            let namespace = NamespaceIdent::parse(&row.get::<String, _>("namespace"))?;
            match parent {
                // strict descendants only: longer than the parent, parent as
                // a prefix, never the parent itself
                Some(parent) => {
                    if namespace.is_descendant_of(parent) {
                        namespaces.push(namespace);
                    }
                }
                None => namespaces.push(namespace),
            }
        }
        Ok(namespaces)
    }

    async fn create_table(
        &self,
        identifier: &TableIdent,
        schema: Schema,
        options: TableCreateOptions,
        cancel: &CancelToken,
    ) -> Result<Table> {
        validate_table_ident(identifier)?;
        cancel.check("create_table")?;
        if self.namespace_row_count(identifier.namespace()).await? == 0 {
            return Err(Error::no_such_namespace(identifier.namespace()));
        }
        if self.table_exists(identifier, cancel).await? {
            return Err(Error::table_already_exists(identifier));
        }

        let location = options
            .location
            .unwrap_or_else(|| self.default_table_location(identifier));
        let metadata = new_table_metadata(
            schema,
            PartitionSpec::unpartitioned(),
            SortOrder::unsorted(),
            location.clone(),
            options.properties,
        );
        let metadata_location = metadata_file_path(&location, 1);
        self.file_io
            .write(&metadata_location, metadata.serialize()?)
            .await?;

        let inserted = sqlx::query(
            "INSERT OR IGNORE INTO iceberg_tables
             (catalog_name, table_namespace, table_name, metadata_location, previous_metadata_location)
             VALUES (?, ?, ?, ?, NULL)",
        )
        .bind(&self.name)
        .bind(identifier.namespace().encode())
        .bind(identifier.name())
        .bind(&metadata_location)
        .execute(&self.pool)
        .await
        .map_err(backend_err)?;
        if inserted.rows_affected() == 0 {
            // lost a create race; the freshly written metadata file is orphaned
            return Err(Error::table_already_exists(identifier));
        }
        debug!(table = %identifier, location = %location, "created table");

        Ok(Table::new(
            identifier.clone(),
            metadata,
            metadata_location,
            self.file_io.clone(),
            self.name.clone(),
        ))
    }

    async fn load_table(&self, identifier: &TableIdent, cancel: &CancelToken) -> Result<Table> {
        validate_table_ident(identifier)?;
        cancel.check("load_table")?;
        let metadata_location = self.current_metadata_location(identifier).await?;
        let metadata = self.read_metadata(&metadata_location).await?;
        Ok(Table::new(
            identifier.clone(),
            metadata,
            metadata_location,
            self.file_io.clone(),
            self.name.clone(),
        ))
    }

    async fn commit_table(
        &self,
        table: &Table,
        requirements: Vec<TableRequirement>,
        updates: Vec<TableUpdate>,
        cancel: &CancelToken,
    ) -> Result<(TableMetadata, String)> {
        let identifier = table.identifier();
        validate_table_ident(identifier)?;
        cancel.check("commit_table")?;

        let current_location = self.current_metadata_location(identifier).await?;
        let current = self.read_metadata(&current_location).await?;
        for requirement in &requirements {
            if let Err(reason) = requirement.check(&current) {
                debug!(table = %identifier, reason = %reason, "commit requirement violated");
                return Err(Error::conflicting_commit(identifier));
            }
        }

        let mut next = apply_updates(&current, &updates)?;
        push_metadata_log(&mut next, &current_location);
        let next_version = parse_metadata_version(&current_location)? + 1;
        let next_location = metadata_file_path(&next.location, next_version);

        // the metadata file lands before the pointer flips; failure here
        // leaves the previous state fully intact
        self.file_io.write(&next_location, next.serialize()?).await?;

        // last chance to abandon: past this point the commit is durable and
        // cancellation is ignored
        cancel.check("commit_table")?;
        let updated = sqlx::query(
            "UPDATE iceberg_tables
             SET metadata_location = ?, previous_metadata_location = ?
             WHERE catalog_name = ? AND table_namespace = ? AND table_name = ?
               AND metadata_location = ?",
        )
        .bind(&next_location)
        .bind(&current_location)
        .bind(&self.name)
        .bind(identifier.namespace().encode())
        .bind(identifier.name())
        .bind(&current_location)
        .execute(&self.pool)
        .await
        .map_err(backend_err)?;
        if updated.rows_affected() == 0 {
            // someone else moved the pointer; the file we wrote is orphaned
            return Err(Error::conflicting_commit(identifier));
        }
        debug!(table = %identifier, location = %next_location, "committed table metadata");
        Ok((next, next_location))
    }

    async fn drop_table(&self, identifier: &TableIdent, cancel: &CancelToken) -> Result<()> {
        validate_table_ident(identifier)?;
        cancel.check("drop_table")?;
        let deleted = sqlx::query(
            "DELETE FROM iceberg_tables
             WHERE catalog_name = ? AND table_namespace = ? AND table_name = ?",
        )
        .bind(&self.name)
        .bind(identifier.namespace().encode())
        .bind(identifier.name())
        .execute(&self.pool)
        .await
        .map_err(backend_err)?;
        if deleted.rows_affected() == 0 {
            return Err(Error::no_such_table(identifier));
        }
        // data and metadata files stay on storage for recovery
        debug!(table = %identifier, "dropped table record");
        Ok(())
    }

    async fn rename_table(
        &self,
        from: &TableIdent,
        to: &TableIdent,
        cancel: &CancelToken,
    ) -> Result<()> {
        validate_table_ident(from)?;
        validate_table_ident(to)?;
        cancel.check("rename_table")?;
        if !self.table_exists(from, cancel).await? {
            return Err(Error::no_such_table(from));
        }
        if self.namespace_row_count(to.namespace()).await? == 0 {
            return Err(Error::no_such_namespace(to.namespace()));
        }
        if self.table_exists(to, cancel).await? {
            return Err(Error::table_already_exists(to));
        }
        sqlx::query(
            "UPDATE iceberg_tables SET table_namespace = ?, table_name = ?
             WHERE catalog_name = ? AND table_namespace = ? AND table_name = ?",
        )
        .bind(to.namespace().encode())
        .bind(to.name())
        .bind(&self.name)
        .bind(from.namespace().encode())
        .bind(from.name())
        .execute(&self.pool)
        .await
        .map_err(backend_err)?;
        debug!(from = %from, to = %to, "renamed table");
        Ok(())
    }

    async fn list_tables(
        &self,
        namespace: &NamespaceIdent,
        cancel: &CancelToken,
    ) -> Result<Vec<TableIdent>> {
        validate_namespace(namespace)?;
        cancel.check("list_tables")?;
        if self.namespace_row_count(namespace).await? == 0 {
            return Err(Error::no_such_namespace(namespace));
        }
        let rows = sqlx::query(
            "SELECT table_name FROM iceberg_tables
             WHERE catalog_name = ? AND table_namespace = ? ORDER BY table_name",
        )
        .bind(&self.name)
        .bind(namespace.encode())
        .fetch_all(&self.pool)
        .await
        .map_err(backend_err)?;
        rows.into_iter()
            .map(|row| TableIdent::new(namespace.clone(), row.get::<String, _>("table_name")))
            .collect()
    }

    async fn table_exists(&self, identifier: &TableIdent, cancel: &CancelToken) -> Result<bool> {
        validate_table_ident(identifier)?;
        cancel.check("table_exists")?;
        let row = sqlx::query(
            "SELECT COUNT(*) AS cnt FROM iceberg_tables
             WHERE catalog_name = ? AND table_namespace = ? AND table_name = ?",
        )
        .bind(&self.name)
        .bind(identifier.namespace().encode())
        .bind(identifier.name())
        .fetch_one(&self.pool)
        .await
        .map_err(backend_err)?;
        Ok(row.get::<i64, _>("cnt") > 0)
    }
}
