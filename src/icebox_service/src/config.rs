use serde::{Deserialize, Serialize};

/// The declarative configuration document. Loading it from a YAML file is a
/// collaborator concern; this module only fixes the recognized shape.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// The catalog's identifying name.
    pub name: String,
    pub catalog: CatalogConfig,
    pub storage: StorageConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CatalogConfig {
    #[serde(rename = "type")]
    pub kind: CatalogKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sqlite: Option<SqliteCatalogConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json: Option<JsonCatalogConfig>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CatalogKind {
    Sqlite,
    Rest,
    Json,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SqliteCatalogConfig {
    /// Filesystem path of the registry database, or `:memory:`.
    pub path: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JsonCatalogConfig {
    pub uri: String,
    pub warehouse: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(rename = "type")]
    pub kind: StorageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filesystem: Option<FilesystemConfig>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    Fs,
    Mem,
    S3,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FilesystemConfig {
    /// Warehouse root directory.
    pub root_path: String,
}

impl ServiceConfig {
    /// Everything under one base directory: a sqlite registry and a
    /// filesystem warehouse.
    pub fn local(name: impl Into<String>, base_path: &str) -> Self {
        let base = base_path.trim_end_matches('/');
        Self {
            name: name.into(),
            catalog: CatalogConfig {
                kind: CatalogKind::Sqlite,
                sqlite: Some(SqliteCatalogConfig {
                    path: format!("{base}/catalog.db"),
                }),
                json: None,
            },
            storage: StorageConfig {
                kind: StorageKind::Fs,
                filesystem: Some(FilesystemConfig {
                    root_path: format!("{base}/warehouse"),
                }),
            },
        }
    }
}
