use std::collections::HashMap;

use chrono::Utc;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::spec::{
    MetadataLog, PartitionSpec, Schema, Snapshot, SnapshotLog, SortOrder, TableMetadata,
    FORMAT_VERSION,
};

/// Builds the initial metadata document for a new table: format version 2, a
/// fresh UUID, schema-id 0, no snapshots.
pub fn new_table_metadata(
    schema: Schema,
    partition_spec: PartitionSpec,
    sort_order: SortOrder,
    location: impl Into<String>,
    properties: HashMap<String, String>,
) -> TableMetadata {
    let mut properties = properties;
    properties.insert("format-version".to_string(), FORMAT_VERSION.to_string());
    let last_column_id = schema.highest_field_id();
    let schema = Schema::new(0, schema.fields);
    TableMetadata {
        format_version: FORMAT_VERSION,
        table_uuid: Uuid::new_v4(),
        location: location.into(),
        last_sequence_number: 0,
        last_updated_ms: Utc::now().timestamp_millis(),
        last_column_id,
        schemas: vec![schema],
        current_schema_id: 0,
        partition_specs: vec![partition_spec],
        default_spec_id: 0,
        last_partition_id: 999,
        properties,
        current_snapshot_id: None,
        snapshots: Vec::new(),
        snapshot_log: Vec::new(),
        metadata_log: Vec::new(),
        sort_orders: vec![sort_order],
        default_sort_order_id: 0,
    }
}

/// A single metadata transition. Application is pure: no I/O, a new metadata
/// object per commit.
#[derive(Clone, Debug, PartialEq)]
pub enum TableUpdate {
    AssignUuid { uuid: Uuid },
    UpgradeFormatVersion { format_version: u8 },
    AddSchema { schema: Schema },
    SetCurrentSchema { schema_id: i32 },
    AddSnapshot { snapshot: Snapshot },
    SetCurrentSnapshot { snapshot_id: i64 },
    SetProperties { updates: HashMap<String, String> },
    RemoveProperties { removals: Vec<String> },
    SetLocation { location: String },
}

/// A commit precondition, checked against the metadata actually current at
/// commit time. A violation is a conflicting commit: the caller must reload,
/// re-apply and retry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TableRequirement {
    AssertCurrentSnapshotId { snapshot_id: Option<i64> },
}

impl TableRequirement {
    /// Ok(()) when the requirement holds; Err(reason) otherwise.
    pub fn check(&self, metadata: &TableMetadata) -> std::result::Result<(), String> {
        match self {
            TableRequirement::AssertCurrentSnapshotId { snapshot_id } => {
                if metadata.current_snapshot_id == *snapshot_id {
                    Ok(())
                } else {
                    Err(format!(
                        "expected current snapshot id {:?}, found {:?}",
                        snapshot_id, metadata.current_snapshot_id
                    ))
                }
            }
        }
    }
}

/// Applies updates to produce a new metadata object, preserving the document
/// invariants (schema history contains the current schema, snapshot log
/// contains the current snapshot, log timestamps monotonic).
pub fn apply_updates(metadata: &TableMetadata, updates: &[TableUpdate]) -> Result<TableMetadata> {
    let mut next = metadata.clone();
    for update in updates {
        match update {
            TableUpdate::AssignUuid { uuid } => {
                next.table_uuid = *uuid;
            }
            TableUpdate::UpgradeFormatVersion { format_version } => {
                if *format_version != FORMAT_VERSION {
                    return Err(Error::unsupported(format!(
                        "cannot change format version to {format_version}; only version {FORMAT_VERSION} is supported"
                    )));
                }
            }
            TableUpdate::AddSchema { schema } => {
                if next.schemas.iter().any(|s| s.schema_id == schema.schema_id) {
                    return Err(Error::corrupted_metadata(format!(
                        "schema id {} already present",
                        schema.schema_id
                    )));
                }
                next.last_column_id = next.last_column_id.max(schema.highest_field_id());
                next.schemas.push(schema.clone());
            }
            TableUpdate::SetCurrentSchema { schema_id } => {
                if !next.schemas.iter().any(|s| s.schema_id == *schema_id) {
                    return Err(Error::corrupted_metadata(format!(
                        "cannot set current schema to unknown id {schema_id}"
                    )));
                }
                next.current_schema_id = *schema_id;
            }
            TableUpdate::AddSnapshot { snapshot } => {
                if next.snapshot_by_id(snapshot.snapshot_id).is_some() {
                    return Err(Error::corrupted_metadata(format!(
                        "snapshot id {} already present",
                        snapshot.snapshot_id
                    )));
                }
                next.last_sequence_number = next.last_sequence_number.max(snapshot.sequence_number);
                next.snapshots.push(snapshot.clone());
            }
            TableUpdate::SetCurrentSnapshot { snapshot_id } => {
                let snapshot = next
                    .snapshot_by_id(*snapshot_id)
                    .ok_or_else(|| Error::snapshot_not_found(*snapshot_id))?;
                let timestamp_ms = snapshot.timestamp_ms;
                next.current_snapshot_id = Some(*snapshot_id);
                next.last_updated_ms = timestamp_ms;
                next.snapshot_log.push(SnapshotLog {
                    snapshot_id: *snapshot_id,
                    timestamp_ms,
                });
            }
            TableUpdate::SetProperties { updates } => {
                next.properties.extend(updates.clone());
            }
            TableUpdate::RemoveProperties { removals } => {
                for key in removals {
                    next.properties.remove(key);
                }
            }
            TableUpdate::SetLocation { location } => {
                next.location = location.clone();
            }
        }
    }
    next.validate()?;
    Ok(next)
}

/// Metadata files are named `metadata/v{N}.metadata.json`, N monotonically
/// increasing with the count of commits.
pub fn metadata_file_path(table_location: &str, version: u64) -> String {
    format!("{table_location}/metadata/v{version}.metadata.json")
}

/// Extracts N from a `v{N}.metadata.json` path so the next commit can write
/// N+1.
pub fn parse_metadata_version(path: &str) -> Result<u64> {
    let file_name = path.rsplit('/').next().unwrap_or(path);
    file_name
        .strip_prefix('v')
        .and_then(|rest| rest.strip_suffix(".metadata.json"))
        .and_then(|version| version.parse::<u64>().ok())
        .ok_or_else(|| {
            Error::corrupted_metadata(format!(
                "metadata file name {file_name:?} does not match v{{N}}.metadata.json"
            ))
        })
}

/// Manifest-list path for a snapshot; the snapshot id keeps paths collision
/// free.
pub fn manifest_list_path(table_location: &str, snapshot_id: i64) -> String {
    format!("{table_location}/metadata/snap-{snapshot_id}-manifest-list.avro")
}

/// Manifest path: a fresh UUID plus a sequence suffix.
pub fn manifest_path(table_location: &str, manifest_uuid: Uuid, sequence: usize) -> String {
    format!("{table_location}/metadata/{manifest_uuid}-m{sequence}.avro")
}

/// Records the superseded metadata file in the metadata log of the new
/// document.
pub fn push_metadata_log(metadata: &mut TableMetadata, previous_location: &str) {
    metadata.metadata_log.push(MetadataLog {
        metadata_file: previous_location.to_string(),
        timestamp_ms: Utc::now().timestamp_millis(),
    });
}
