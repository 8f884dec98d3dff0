use arrow_schema::ArrowError;
use icebox_error::{ErrorStatus, ErrorStruct};
use parquet::errors::ParquetError;
use std::result;
use thiserror::Error;

use crate::ident::{NamespaceIdent, TableIdent};

/// Error type shared by the icebox core. Each variant is a stable kind
/// suitable for programmatic matching; the payload carries a short message
/// and, where one exists, a suggested corrective action.
#[derive(Clone, Debug, Error)]
pub enum Error {
    #[error("{0}")]
    NoSuchNamespace(ErrorStruct),

    #[error("{0}")]
    NamespaceAlreadyExists(ErrorStruct),

    #[error("{0}")]
    NamespaceNotEmpty(ErrorStruct),

    #[error("{0}")]
    NoSuchTable(ErrorStruct),

    #[error("{0}")]
    TableAlreadyExists(ErrorStruct),

    #[error("{0}")]
    InvalidIdentifier(ErrorStruct),

    #[error("{0}")]
    SchemaMismatch(ErrorStruct),

    #[error("{0}")]
    SnapshotNotFound(ErrorStruct),

    #[error("{0}")]
    NoSnapshotBefore(ErrorStruct),

    #[error("{0}")]
    InvalidTimestamp(ErrorStruct),

    #[error("{0}")]
    ConflictingCommit(ErrorStruct),

    #[error("{0}")]
    NotFound(ErrorStruct),

    #[error("{0}")]
    AlreadyExists(ErrorStruct),

    #[error("{0}")]
    Cancelled(ErrorStruct),

    #[error("{0}")]
    UnsupportedOperation(ErrorStruct),

    #[error("{0}")]
    CorruptedMetadata(ErrorStruct),

    #[error("{0}")]
    CatalogBackend(ErrorStruct),

    #[error("{0}")]
    Io(ErrorStruct),

    #[error("{0}")]
    Arrow(ErrorStruct),

    #[error("{0}")]
    Parquet(ErrorStruct),

    #[error("{0}")]
    Avro(ErrorStruct),

    #[error("{0}")]
    Json(ErrorStruct),
}

pub type Result<T> = result::Result<T, Error>;

impl Error {
    #[track_caller]
    pub fn no_such_namespace(ns: &NamespaceIdent) -> Self {
        Error::NoSuchNamespace(ErrorStruct::permanent(format!(
            "namespace {ns} does not exist - create it first"
        )))
    }

    #[track_caller]
    pub fn namespace_already_exists(ns: &NamespaceIdent) -> Self {
        Error::NamespaceAlreadyExists(ErrorStruct::permanent(format!(
            "namespace {ns} already exists"
        )))
    }

    #[track_caller]
    pub fn namespace_not_empty(ns: &NamespaceIdent) -> Self {
        Error::NamespaceNotEmpty(ErrorStruct::permanent(format!(
            "namespace {ns} still contains tables - drop them first"
        )))
    }

    #[track_caller]
    pub fn no_such_table(ident: &TableIdent) -> Self {
        Error::NoSuchTable(ErrorStruct::permanent(format!(
            "table {ident} does not exist - create or import it first"
        )))
    }

    #[track_caller]
    pub fn table_already_exists(ident: &TableIdent) -> Self {
        Error::TableAlreadyExists(ErrorStruct::permanent(format!(
            "table {ident} already exists"
        )))
    }

    #[track_caller]
    pub fn invalid_identifier(reason: impl Into<String>) -> Self {
        Error::InvalidIdentifier(ErrorStruct::permanent(format!(
            "invalid identifier: {}",
            reason.into()
        )))
    }

    #[track_caller]
    pub fn schema_mismatch(reason: impl Into<String>) -> Self {
        Error::SchemaMismatch(ErrorStruct::permanent(format!(
            "input schema incompatible with table schema: {}",
            reason.into()
        )))
    }

    #[track_caller]
    pub fn snapshot_not_found(snapshot_id: i64) -> Self {
        Error::SnapshotNotFound(ErrorStruct::permanent(format!(
            "snapshot {snapshot_id} not found in table metadata"
        )))
    }

    #[track_caller]
    pub fn no_snapshot_before(timestamp_ms: i64) -> Self {
        Error::NoSnapshotBefore(ErrorStruct::permanent(format!(
            "no snapshot exists at or before timestamp {timestamp_ms} - the table is younger than the requested time"
        )))
    }

    #[track_caller]
    pub fn invalid_timestamp(input: &str) -> Self {
        Error::InvalidTimestamp(ErrorStruct::permanent(format!(
            "cannot parse {input:?} as a snapshot id or timestamp"
        )))
    }

    /// Commit conflicts are temporary: reload the table, re-apply, retry.
    #[track_caller]
    pub fn conflicting_commit(ident: &TableIdent) -> Self {
        Error::ConflictingCommit(ErrorStruct::temporary(format!(
            "concurrent commit detected on table {ident} - reload and retry"
        )))
    }

    #[track_caller]
    pub fn not_found(path: &str) -> Self {
        Error::NotFound(ErrorStruct::permanent(format!("file {path} not found")))
    }

    #[track_caller]
    pub fn already_exists(path: &str) -> Self {
        Error::AlreadyExists(ErrorStruct::permanent(format!("file {path} already exists")))
    }

    #[track_caller]
    pub fn cancelled(operation: &str) -> Self {
        Error::Cancelled(ErrorStruct::permanent(format!("operation {operation} cancelled")))
    }

    #[track_caller]
    pub fn unsupported(what: impl Into<String>) -> Self {
        Error::UnsupportedOperation(ErrorStruct::permanent(what.into()))
    }

    #[track_caller]
    pub fn corrupted_metadata(reason: impl Into<String>) -> Self {
        Error::CorruptedMetadata(ErrorStruct::permanent(format!(
            "table metadata is corrupt: {}",
            reason.into()
        )))
    }
}

impl From<std::io::Error> for Error {
    #[track_caller]
    fn from(source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            return Error::NotFound(
                ErrorStruct::permanent("file not found".to_string()).with_source(source),
            );
        }
        let status = match source.kind() {
            std::io::ErrorKind::TimedOut
            | std::io::ErrorKind::Interrupted
            | std::io::ErrorKind::WouldBlock
            | std::io::ErrorKind::ResourceBusy => ErrorStatus::Temporary,
            _ => ErrorStatus::Permanent,
        };
        Error::Io(ErrorStruct::new("IO error".to_string(), status).with_source(source))
    }
}

impl From<ArrowError> for Error {
    #[track_caller]
    fn from(source: ArrowError) -> Self {
        let status = match source {
            ArrowError::MemoryError(_) | ArrowError::IoError(_, _) => ErrorStatus::Temporary,
            _ => ErrorStatus::Permanent,
        };
        Error::Arrow(ErrorStruct::new(format!("Arrow error: {source}"), status).with_source(source))
    }
}

impl From<ParquetError> for Error {
    #[track_caller]
    fn from(source: ParquetError) -> Self {
        Error::Parquet(
            ErrorStruct::permanent(format!("Parquet error: {source}")).with_source(source),
        )
    }
}

impl From<apache_avro::Error> for Error {
    #[track_caller]
    fn from(source: apache_avro::Error) -> Self {
        Error::Avro(ErrorStruct::permanent(format!("Avro error: {source}")).with_source(source))
    }
}

impl From<serde_json::Error> for Error {
    #[track_caller]
    fn from(source: serde_json::Error) -> Self {
        Error::Json(
            ErrorStruct::permanent(format!("serde json error: {source}")).with_source(source),
        )
    }
}
