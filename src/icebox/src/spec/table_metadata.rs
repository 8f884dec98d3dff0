use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::partition::PartitionSpec;
use super::schema::Schema;
use super::snapshot::{MetadataLog, Snapshot, SnapshotLog};
use super::sort::SortOrder;
use crate::error::{Error, Result};

/// The only format version produced and accepted here.
pub const FORMAT_VERSION: u8 = 2;

/// The table metadata document: the complete description of a table's
/// current and historical state, serialized as one JSON file per commit.
/// Transitions produce a new object rather than mutating in place.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TableMetadata {
    pub format_version: u8,
    pub table_uuid: Uuid,
    pub location: String,
    pub last_sequence_number: i64,
    pub last_updated_ms: i64,
    pub last_column_id: i32,
    pub schemas: Vec<Schema>,
    pub current_schema_id: i32,
    pub partition_specs: Vec<PartitionSpec>,
    pub default_spec_id: i32,
    pub last_partition_id: i32,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub properties: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_snapshot_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub snapshots: Vec<Snapshot>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub snapshot_log: Vec<SnapshotLog>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub metadata_log: Vec<MetadataLog>,
    pub sort_orders: Vec<SortOrder>,
    pub default_sort_order_id: i64,
}

impl TableMetadata {
    pub fn current_schema(&self) -> Result<&Schema> {
        self.schemas
            .iter()
            .find(|s| s.schema_id == self.current_schema_id)
            .ok_or_else(|| {
                Error::corrupted_metadata(format!(
                    "current schema id {} not present in schema list",
                    self.current_schema_id
                ))
            })
    }

    pub fn snapshot_by_id(&self, snapshot_id: i64) -> Option<&Snapshot> {
        self.snapshots.iter().find(|s| s.snapshot_id == snapshot_id)
    }

    pub fn current_snapshot(&self) -> Option<&Snapshot> {
        self.current_snapshot_id.and_then(|id| self.snapshot_by_id(id))
    }

    /// Parses a metadata JSON document and verifies its invariants.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let metadata: TableMetadata = serde_json::from_slice(bytes)
            .map_err(|e| Error::corrupted_metadata(format!("metadata JSON does not parse: {e}")))?;
        metadata.validate()?;
        Ok(metadata)
    }

    /// Serializes to the canonical JSON document form.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Invariants: fixed format version, current schema present, current
    /// snapshot present in both snapshot list and log, snapshot-log
    /// timestamps monotonically non-decreasing.
    pub fn validate(&self) -> Result<()> {
        if self.format_version != FORMAT_VERSION {
            return Err(Error::corrupted_metadata(format!(
                "unsupported format version {}",
                self.format_version
            )));
        }
        self.current_schema()?;
        if let Some(current) = self.current_snapshot_id {
            if self.snapshot_by_id(current).is_none() {
                return Err(Error::corrupted_metadata(format!(
                    "current snapshot id {current} not present in snapshot list"
                )));
            }
            if !self.snapshot_log.iter().any(|l| l.snapshot_id == current) {
                return Err(Error::corrupted_metadata(format!(
                    "current snapshot id {current} not present in snapshot log"
                )));
            }
        }
        for pair in self.snapshot_log.windows(2) {
            if pair[0].timestamp_ms > pair[1].timestamp_ms {
                return Err(Error::corrupted_metadata(
                    "snapshot log timestamps are not monotonically non-decreasing",
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::snapshot::{Operation, Summary};
    use crate::spec::types::{NestedField, PrimitiveType, Type};

    fn sample_metadata() -> TableMetadata {
        TableMetadata {
            format_version: FORMAT_VERSION,
            table_uuid: Uuid::new_v4(),
            location: "file:///wh/ns/t".to_string(),
            last_sequence_number: 1,
            last_updated_ms: 1_700_000_000_000,
            last_column_id: 2,
            schemas: vec![Schema::new(
                0,
                vec![
                    NestedField::required(1, "id", Type::Primitive(PrimitiveType::Long)),
                    NestedField::optional(2, "name", Type::Primitive(PrimitiveType::String)),
                ],
            )],
            current_schema_id: 0,
            partition_specs: vec![PartitionSpec::unpartitioned()],
            default_spec_id: 0,
            last_partition_id: 999,
            properties: HashMap::from([("format-version".to_string(), "2".to_string())]),
            current_snapshot_id: Some(7),
            snapshots: vec![Snapshot {
                snapshot_id: 7,
                parent_snapshot_id: None,
                sequence_number: 1,
                timestamp_ms: 1_700_000_000_000,
                manifest_list: "file:///wh/ns/t/metadata/snap-7-manifest-list.avro".to_string(),
                summary: Summary::new(Operation::Append),
                schema_id: Some(0),
            }],
            snapshot_log: vec![SnapshotLog {
                snapshot_id: 7,
                timestamp_ms: 1_700_000_000_000,
            }],
            metadata_log: vec![],
            sort_orders: vec![SortOrder::unsorted()],
            default_sort_order_id: 0,
        }
    }

    #[test]
    fn test_metadata_json_round_trip() {
        let metadata = sample_metadata();
        let bytes = metadata.serialize().unwrap();
        let back = TableMetadata::parse(&bytes).unwrap();
        assert_eq!(back, metadata);
    }

    #[test]
    fn test_kebab_case_keys() {
        let bytes = sample_metadata().serialize().unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("\"format-version\""));
        assert!(text.contains("\"current-snapshot-id\""));
        assert!(text.contains("\"manifest-list\""));
    }

    #[test]
    fn test_validate_rejects_missing_current_snapshot() {
        let mut metadata = sample_metadata();
        metadata.current_snapshot_id = Some(999);
        assert!(matches!(
            metadata.validate(),
            Err(Error::CorruptedMetadata(_))
        ));
    }

    #[test]
    fn test_validate_rejects_unordered_snapshot_log() {
        let mut metadata = sample_metadata();
        metadata.snapshot_log.insert(
            0,
            SnapshotLog {
                snapshot_id: 6,
                timestamp_ms: 1_800_000_000_000,
            },
        );
        assert!(matches!(
            metadata.validate(),
            Err(Error::CorruptedMetadata(_))
        ));
    }

    #[test]
    fn test_parse_garbage_is_corrupted_metadata() {
        assert!(matches!(
            TableMetadata::parse(b"{\"not\": \"metadata\"}"),
            Err(Error::CorruptedMetadata(_))
        ));
    }
}
