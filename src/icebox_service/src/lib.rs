mod config;
mod error;
mod logging;

use std::sync::Arc;

use tracing::info;

use icebox::catalog::Catalog;
use icebox::storage::FileIO;
use icebox::table::import::{import_parquet, ImportOutcome};
use icebox::table::writer::WriteOptions;
use icebox::{CancelToken, TableIdent};
use icebox_catalog::{JsonCatalog, SqliteCatalog};
use icebox_datafusion::{QueryBridge, QueryBridgeConfig, QueryResult};

pub use config::{
    CatalogConfig, CatalogKind, FilesystemConfig, JsonCatalogConfig, ServiceConfig,
    SqliteCatalogConfig, StorageConfig, StorageKind,
};
pub use error::{Error, Result};
pub use logging::init_logging;

/// The assembled playground: a catalog over a local warehouse plus the SQL
/// bridge.
pub struct IceboxService {
    catalog: Arc<dyn Catalog>,
    bridge: QueryBridge,
}

/// Builds the service from a configuration document. Catalog and storage
/// backends outside the local feature set are recognized but refused.
pub async fn start_with_config(config: ServiceConfig) -> Result<IceboxService> {
    logging::init_logging();

    let (file_io, warehouse) = match config.storage.kind {
        StorageKind::Fs => {
            let filesystem = config
                .storage
                .filesystem
                .ok_or_else(|| Error::invalid_config("storage.filesystem.root_path is required"))?;
            (FileIO::local(), filesystem.root_path)
        }
        StorageKind::Mem => (FileIO::memory(), "/warehouse".to_string()),
        StorageKind::S3 => {
            return Err(icebox::Error::unsupported("s3 storage is not available in this build").into())
        }
    };

    let catalog: Arc<dyn Catalog> = match config.catalog.kind {
        CatalogKind::Sqlite => {
            let sqlite = config
                .catalog
                .sqlite
                .ok_or_else(|| Error::invalid_config("catalog.sqlite.path is required"))?;
            if sqlite.path != ":memory:" {
                if let Some(parent) = std::path::Path::new(&sqlite.path).parent() {
                    std::fs::create_dir_all(parent).map_err(icebox::Error::from)?;
                }
            }
            Arc::new(SqliteCatalog::new(config.name.clone(), &sqlite.path, warehouse, file_io).await?)
        }
        CatalogKind::Json => {
            let json = config.catalog.json.ok_or_else(|| {
                Error::invalid_config("catalog.json.uri and catalog.json.warehouse are required")
            })?;
            Arc::new(JsonCatalog::new(config.name.clone(), &json.uri, json.warehouse, file_io).await?)
        }
        CatalogKind::Rest => {
            return Err(icebox::Error::unsupported(
                "the rest catalog is not available in this build",
            )
            .into())
        }
    };

    let bridge = QueryBridge::new(catalog.clone(), QueryBridgeConfig::default());
    info!(catalog = %config.name, "icebox service started");
    Ok(IceboxService { catalog, bridge })
}

impl IceboxService {
    pub fn catalog(&self) -> &Arc<dyn Catalog> {
        &self.catalog
    }

    pub fn bridge(&self) -> &QueryBridge {
        &self.bridge
    }

    /// Imports a Parquet file, creating the table on first import, and
    /// refreshes its view registration.
    pub async fn import(
        &self,
        identifier: &TableIdent,
        source_path: &str,
        cancel: &CancelToken,
    ) -> Result<ImportOutcome> {
        let (_, outcome) = import_parquet(
            self.catalog.as_ref(),
            identifier,
            source_path,
            &WriteOptions::default(),
            cancel,
        )
        .await?;
        self.bridge.register_table(identifier, cancel).await?;
        Ok(outcome)
    }

    /// Registers every catalog table with the bridge.
    pub async fn register_all(&self, cancel: &CancelToken) -> Result<()> {
        for namespace in self.catalog.list_namespaces(None, cancel).await? {
            for identifier in self.catalog.list_tables(&namespace, cancel).await? {
                self.bridge.register_table(&identifier, cancel).await?;
            }
        }
        Ok(())
    }

    /// One-shot query over the current state of all tables.
    pub async fn query(&self, sql: &str, cancel: &CancelToken) -> Result<QueryResult> {
        self.register_all(cancel).await?;
        Ok(self.bridge.execute(sql, cancel).await?)
    }

    /// One-shot time-travel query over a single table.
    pub async fn query_as_of(
        &self,
        sql: &str,
        identifier: &TableIdent,
        as_of: &str,
        cancel: &CancelToken,
    ) -> Result<QueryResult> {
        self.register_all(cancel).await?;
        Ok(self.bridge.execute_as_of(sql, identifier, as_of, cancel).await?)
    }
}
