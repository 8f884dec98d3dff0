use std::collections::HashMap;

use arrow_array::RecordBatch;
use chrono::Utc;
use parquet::arrow::ArrowWriter;
use tracing::debug;
use uuid::Uuid;

use super::parquet_utils::default_writer_properties;
use super::Table;
use crate::cancel::CancelToken;
use crate::catalog::Catalog;
use crate::convert::validate_write_schema;
use crate::error::Result;
use crate::metadata::{manifest_list_path, manifest_path, TableRequirement, TableUpdate};
use crate::spec::{
    read_manifest_list, write_manifest, write_manifest_list, DataFile, ManifestEntry,
    ManifestEntryStatus, ManifestFile, Operation, Snapshot, Summary, TableMetadata,
};

/// Rows per data file before the writer rolls to the next one.
pub const DEFAULT_BATCH_SIZE: usize = 100_000;

/// Reserved key space for caller-supplied snapshot properties.
const SNAPSHOT_PROPERTY_PREFIX: &str = "icebox.";

#[derive(Clone, Debug)]
pub struct WriteOptions {
    pub batch_size: usize,
    pub snapshot_properties: HashMap<String, String>,
    pub overwrite: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            snapshot_properties: HashMap::new(),
            overwrite: false,
        }
    }
}

/// Appends columnar data to the table and commits an `append` snapshot whose
/// manifest list carries the parent's manifests forward.
pub async fn append(
    catalog: &dyn Catalog,
    table: &Table,
    batches: &[RecordBatch],
    options: &WriteOptions,
    cancel: &CancelToken,
) -> Result<Table> {
    write(catalog, table, batches, &WriteOptions { overwrite: false, ..options.clone() }, cancel)
        .await
}

/// Replaces the full table contents. Behaves as append when the table is
/// empty; otherwise commits an `overwrite` snapshot whose manifest list
/// references only the new manifests, dereferencing prior data files.
/// Expiration of the dereferenced files is the caller's responsibility.
pub async fn overwrite(
    catalog: &dyn Catalog,
    table: &Table,
    batches: &[RecordBatch],
    options: &WriteOptions,
    cancel: &CancelToken,
) -> Result<Table> {
    write(catalog, table, batches, &WriteOptions { overwrite: true, ..options.clone() }, cancel)
        .await
}

/// Write entry point; dispatches on `options.overwrite`.
pub async fn write(
    catalog: &dyn Catalog,
    table: &Table,
    batches: &[RecordBatch],
    options: &WriteOptions,
    cancel: &CancelToken,
) -> Result<Table> {
    cancel.check("write")?;
    let schema = table.metadata().current_schema()?;
    if let Some(first) = batches.first() {
        validate_write_schema(schema, first.schema().as_ref())?;
    }

    let overwriting = options.overwrite && table.metadata().current_snapshot().is_some();
    let new_files = write_data_files(table, batches, options.batch_size, cancel).await?;

    commit_snapshot(
        catalog,
        table,
        SnapshotCommit {
            operation: if overwriting { Operation::Overwrite } else { Operation::Append },
            new_files,
            existing_files: Vec::new(),
            carry_parent_manifests: !overwriting,
            summary_extra: prefixed_properties(&options.snapshot_properties),
        },
        cancel,
    )
    .await
}

fn prefixed_properties(properties: &HashMap<String, String>) -> HashMap<String, String> {
    properties
        .iter()
        .map(|(key, value)| {
            let key = if key.starts_with(SNAPSHOT_PROPERTY_PREFIX) {
                key.clone()
            } else {
                format!("{SNAPSHOT_PROPERTY_PREFIX}{key}")
            };
            (key, value.clone())
        })
        .collect()
}

/// Rolls input rows into Parquet data files of at most `batch_size` rows,
/// named `data/part-<timestamp>-<seq>.parquet`. Writes are not retried;
/// failures surface to the caller with the previous table state intact.
async fn write_data_files(
    table: &Table,
    batches: &[RecordBatch],
    batch_size: usize,
    cancel: &CancelToken,
) -> Result<Vec<DataFile>> {
    let batch_size = batch_size.max(1);
    // microsecond resolution keeps file names of back-to-back commits apart
    let timestamp = Utc::now().timestamp_micros();
    let mut files = Vec::new();
    let mut pending: Vec<RecordBatch> = Vec::new();
    let mut pending_rows = 0usize;
    let mut sequence = 0usize;

    for batch in batches {
        let mut offset = 0;
        while offset < batch.num_rows() {
            cancel.check("write data file")?;
            let take = (batch_size - pending_rows).min(batch.num_rows() - offset);
            pending.push(batch.slice(offset, take));
            pending_rows += take;
            offset += take;
            if pending_rows == batch_size {
                files.push(flush_data_file(table, &pending, timestamp, sequence).await?);
                sequence += 1;
                pending.clear();
                pending_rows = 0;
            }
        }
    }
    if pending_rows > 0 {
        files.push(flush_data_file(table, &pending, timestamp, sequence).await?);
    }
    Ok(files)
}

async fn flush_data_file(
    table: &Table,
    batches: &[RecordBatch],
    timestamp: i64,
    sequence: usize,
) -> Result<DataFile> {
    let schema = batches[0].schema();
    let mut buffer = Vec::new();
    let mut writer = ArrowWriter::try_new(&mut buffer, schema, Some(default_writer_properties()))?;
    let mut rows = 0i64;
    for batch in batches {
        writer.write(batch)?;
        rows += batch.num_rows() as i64;
    }
    writer.close()?;

    let path = format!("{}/data/part-{timestamp}-{sequence}.parquet", table.location());
    let size = buffer.len() as i64;
    table.file_io().write(&path, buffer).await?;
    debug!(path = %path, rows, size, "wrote data file");
    Ok(DataFile::parquet(path, rows, size))
}

/// One snapshot publication: what enters the new manifest, whether parent
/// manifests are carried forward, and extra summary properties.
pub(crate) struct SnapshotCommit {
    pub operation: Operation,
    pub new_files: Vec<DataFile>,
    pub existing_files: Vec<DataFile>,
    pub carry_parent_manifests: bool,
    pub summary_extra: HashMap<String, String>,
}

/// Writes the manifest and manifest-list for a new snapshot, then commits it
/// through the catalog with an `AssertCurrentSnapshotId` requirement pinned
/// to the parent observed at load time. Both files exist on storage before
/// the pointer flips.
pub(crate) async fn commit_snapshot(
    catalog: &dyn Catalog,
    table: &Table,
    commit: SnapshotCommit,
    cancel: &CancelToken,
) -> Result<Table> {
    let metadata = table.metadata();
    let parent_snapshot_id = metadata.current_snapshot_id;
    let snapshot_id = generate_snapshot_id(metadata);
    let location = table.location();

    let mut entries: Vec<ManifestEntry> = commit
        .new_files
        .iter()
        .map(|file| ManifestEntry {
            status: ManifestEntryStatus::Added,
            snapshot_id,
            data_file: file.clone(),
        })
        .collect();
    entries.extend(commit.existing_files.iter().map(|file| ManifestEntry {
        status: ManifestEntryStatus::Existing,
        snapshot_id,
        data_file: file.clone(),
    }));

    cancel.check("commit snapshot")?;
    let manifest_bytes = write_manifest(&entries)?;
    let manifest_location = manifest_path(location, Uuid::new_v4(), 0);
    table.file_io().write(&manifest_location, manifest_bytes.clone()).await?;

    let added_rows: i64 = commit.new_files.iter().map(|f| f.record_count).sum();
    let existing_rows: i64 = commit.existing_files.iter().map(|f| f.record_count).sum();
    let mut manifests = vec![ManifestFile {
        manifest_path: manifest_location,
        manifest_length: manifest_bytes.len() as i64,
        partition_spec_id: metadata.default_spec_id,
        added_snapshot_id: snapshot_id,
        added_data_files_count: commit.new_files.len() as i32,
        existing_data_files_count: commit.existing_files.len() as i32,
        deleted_data_files_count: 0,
        added_rows_count: added_rows,
        existing_rows_count: existing_rows,
    }];
    if commit.carry_parent_manifests {
        if let Some(parent) = metadata.current_snapshot() {
            let bytes = table.file_io().read(&parent.manifest_list).await?;
            manifests.extend(read_manifest_list(&bytes)?);
        }
    }

    cancel.check("commit snapshot")?;
    let list_bytes = write_manifest_list(&manifests)?;
    let list_location = manifest_list_path(location, snapshot_id);
    table.file_io().write(&list_location, list_bytes).await?;

    let total_records: i64 = manifests
        .iter()
        .map(|m| m.added_rows_count + m.existing_rows_count)
        .sum();

    // snapshot-log timestamps stay monotonic even if the clock steps back
    let mut timestamp_ms = Utc::now().timestamp_millis();
    if let Some(last) = metadata.snapshot_log.last() {
        timestamp_ms = timestamp_ms.max(last.timestamp_ms);
    }

    let mut summary = Summary::new(commit.operation)
        .with("added-data-files", commit.new_files.len().to_string())
        .with("added-records", added_rows.to_string())
        .with("total-records", total_records.to_string());
    summary.additional.extend(commit.summary_extra);

    let snapshot = Snapshot {
        snapshot_id,
        parent_snapshot_id,
        sequence_number: metadata.last_sequence_number + 1,
        timestamp_ms,
        manifest_list: list_location,
        summary,
        schema_id: Some(metadata.current_schema_id),
    };

    let (new_metadata, new_location) = catalog
        .commit_table(
            table,
            vec![TableRequirement::AssertCurrentSnapshotId {
                snapshot_id: parent_snapshot_id,
            }],
            vec![
                TableUpdate::AddSnapshot { snapshot },
                TableUpdate::SetCurrentSnapshot { snapshot_id },
            ],
            cancel,
        )
        .await?;
    Ok(table.with_metadata(new_metadata, new_location))
}

/// Snapshot ids are random positive 64-bit values, re-drawn on the unlikely
/// collision with an existing snapshot.
fn generate_snapshot_id(metadata: &TableMetadata) -> i64 {
    loop {
        let id = (rand::random::<u64>() >> 1) as i64;
        if id != 0 && metadata.snapshot_by_id(id).is_none() {
            return id;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_property_prefixing() {
        let properties = HashMap::from([
            ("source".to_string(), "import".to_string()),
            ("icebox.kept".to_string(), "yes".to_string()),
        ]);
        let prefixed = prefixed_properties(&properties);
        assert_eq!(prefixed.get("icebox.source").unwrap(), "import");
        assert_eq!(prefixed.get("icebox.kept").unwrap(), "yes");
    }
}
