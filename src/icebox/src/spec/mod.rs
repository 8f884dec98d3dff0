mod manifest;
mod partition;
mod schema;
mod snapshot;
mod sort;
mod table_metadata;
mod types;

pub use manifest::{
    read_manifest, read_manifest_list, write_manifest, write_manifest_list, DataFile,
    ManifestEntry, ManifestEntryStatus, ManifestFile, DATA_FILE_FORMAT_PARQUET,
};
pub use partition::{PartitionField, PartitionSpec};
pub use schema::Schema;
pub use snapshot::{MetadataLog, Operation, Snapshot, SnapshotLog, Summary};
pub use sort::{SortField, SortOrder};
pub use table_metadata::{TableMetadata, FORMAT_VERSION};
pub use types::{ListType, MapType, NestedField, PrimitiveType, StructType, Type};
