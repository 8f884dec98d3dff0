pub mod compaction;
pub mod import;
mod parquet_utils;
pub mod scan;
pub mod time_travel;
pub mod writer;

use crate::ident::TableIdent;
use crate::spec::TableMetadata;
use crate::storage::FileIO;

/// A loaded table: identifier, the metadata snapshot read at load time, and
/// the storage handle. Holds only the owning catalog's name, not a reference;
/// commits revalidate against the catalog, so a stale load surfaces as a
/// conflicting commit rather than a dangling pointer.
#[derive(Clone, Debug)]
pub struct Table {
    identifier: TableIdent,
    metadata: TableMetadata,
    metadata_location: String,
    file_io: FileIO,
    catalog_name: String,
}

impl Table {
    pub fn new(
        identifier: TableIdent,
        metadata: TableMetadata,
        metadata_location: String,
        file_io: FileIO,
        catalog_name: String,
    ) -> Self {
        Self {
            identifier,
            metadata,
            metadata_location,
            file_io,
            catalog_name,
        }
    }

    pub fn identifier(&self) -> &TableIdent {
        &self.identifier
    }

    pub fn metadata(&self) -> &TableMetadata {
        &self.metadata
    }

    pub fn metadata_location(&self) -> &str {
        &self.metadata_location
    }

    pub fn file_io(&self) -> &FileIO {
        &self.file_io
    }

    pub fn catalog_name(&self) -> &str {
        &self.catalog_name
    }

    pub fn location(&self) -> &str {
        &self.metadata.location
    }

    /// A copy of this table advanced to freshly committed metadata.
    pub fn with_metadata(&self, metadata: TableMetadata, metadata_location: String) -> Self {
        Self {
            identifier: self.identifier.clone(),
            metadata,
            metadata_location,
            file_io: self.file_io.clone(),
            catalog_name: self.catalog_name.clone(),
        }
    }
}
