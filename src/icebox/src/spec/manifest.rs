use apache_avro::{from_value, Codec, Reader, Schema as AvroSchema, Writer};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::Result;

pub const DATA_FILE_FORMAT_PARQUET: &str = "PARQUET";

/// A physical columnar file in the table's data directory, with the
/// statistics a reader needs to plan a scan.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataFile {
    pub file_path: String,
    pub file_format: String,
    pub record_count: i64,
    pub file_size_in_bytes: i64,
}

impl DataFile {
    pub fn parquet(file_path: impl Into<String>, record_count: i64, file_size_in_bytes: i64) -> Self {
        Self {
            file_path: file_path.into(),
            file_format: DATA_FILE_FORMAT_PARQUET.to_string(),
            record_count,
            file_size_in_bytes,
        }
    }
}

/// Entry status inside a manifest, encoded as an int on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ManifestEntryStatus {
    Existing,
    Added,
    Deleted,
}

impl ManifestEntryStatus {
    fn as_i32(self) -> i32 {
        match self {
            ManifestEntryStatus::Existing => 0,
            ManifestEntryStatus::Added => 1,
            ManifestEntryStatus::Deleted => 2,
        }
    }

    fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(ManifestEntryStatus::Existing),
            1 => Some(ManifestEntryStatus::Added),
            2 => Some(ManifestEntryStatus::Deleted),
            _ => None,
        }
    }
}

impl Serialize for ManifestEntryStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_i32(self.as_i32())
    }
}

impl<'de> Deserialize<'de> for ManifestEntryStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = i32::deserialize(deserializer)?;
        ManifestEntryStatus::from_i32(value)
            .ok_or_else(|| D::Error::custom(format!("unknown manifest entry status {value}")))
    }
}

/// One line of a manifest: a data file and its membership status for the
/// owning snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub status: ManifestEntryStatus,
    pub snapshot_id: i64,
    pub data_file: DataFile,
}

/// One line of a manifest list: a manifest file and its per-manifest
/// statistics.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestFile {
    pub manifest_path: String,
    pub manifest_length: i64,
    pub partition_spec_id: i32,
    pub added_snapshot_id: i64,
    pub added_data_files_count: i32,
    pub existing_data_files_count: i32,
    pub deleted_data_files_count: i32,
    pub added_rows_count: i64,
    pub existing_rows_count: i64,
}

// Avro object-container schemas. Only the fields a reader needs for
// correctness are emitted; everything not written is defaulted.
const MANIFEST_ENTRY_AVRO_SCHEMA: &str = r#"
{
  "type": "record",
  "name": "manifest_entry",
  "fields": [
    {"name": "status", "type": "int"},
    {"name": "snapshot_id", "type": "long"},
    {"name": "data_file", "type": {
      "type": "record",
      "name": "data_file",
      "fields": [
        {"name": "file_path", "type": "string"},
        {"name": "file_format", "type": "string"},
        {"name": "record_count", "type": "long"},
        {"name": "file_size_in_bytes", "type": "long"}
      ]
    }}
  ]
}
"#;

const MANIFEST_FILE_AVRO_SCHEMA: &str = r#"
{
  "type": "record",
  "name": "manifest_file",
  "fields": [
    {"name": "manifest_path", "type": "string"},
    {"name": "manifest_length", "type": "long"},
    {"name": "partition_spec_id", "type": "int"},
    {"name": "added_snapshot_id", "type": "long"},
    {"name": "added_data_files_count", "type": "int"},
    {"name": "existing_data_files_count", "type": "int"},
    {"name": "deleted_data_files_count", "type": "int"},
    {"name": "added_rows_count", "type": "long"},
    {"name": "existing_rows_count", "type": "long"}
  ]
}
"#;

fn write_avro<T: Serialize>(schema_json: &str, records: &[T]) -> Result<Vec<u8>> {
    let schema = AvroSchema::parse_str(schema_json)?;
    let mut writer = Writer::with_codec(
        &schema,
        Vec::new(),
        Codec::Deflate(Default::default()),
    );
    for record in records {
        writer.append_ser(record)?;
    }
    Ok(writer.into_inner()?)
}

fn read_avro<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<Vec<T>> {
    let reader = Reader::new(bytes)?;
    let mut records = Vec::new();
    for value in reader {
        records.push(from_value::<T>(&value?)?);
    }
    Ok(records)
}

/// Serializes a manifest (data-file entries) to Avro OCF bytes.
pub fn write_manifest(entries: &[ManifestEntry]) -> Result<Vec<u8>> {
    write_avro(MANIFEST_ENTRY_AVRO_SCHEMA, entries)
}

pub fn read_manifest(bytes: &[u8]) -> Result<Vec<ManifestEntry>> {
    read_avro(bytes)
}

/// Serializes a manifest list (per-snapshot manifest inventory) to Avro OCF
/// bytes.
pub fn write_manifest_list(manifests: &[ManifestFile]) -> Result<Vec<u8>> {
    write_avro(MANIFEST_FILE_AVRO_SCHEMA, manifests)
}

pub fn read_manifest_list(bytes: &[u8]) -> Result<Vec<ManifestFile>> {
    read_avro(bytes)
}
