use crate::error::{Error, Result};
use crate::spec::{read_manifest, read_manifest_list, DataFile, ManifestEntryStatus};
use crate::table::Table;

/// Materializes the data files referenced by a snapshot: manifest list, then
/// each manifest, skipping deleted entries. `snapshot_id = None` resolves the
/// current snapshot; a table with no snapshot yet has no files.
pub async fn snapshot_data_files(table: &Table, snapshot_id: Option<i64>) -> Result<Vec<DataFile>> {
    let snapshot = match snapshot_id {
        Some(id) => table
            .metadata()
            .snapshot_by_id(id)
            .ok_or_else(|| Error::snapshot_not_found(id))?,
        None => match table.metadata().current_snapshot() {
            Some(snapshot) => snapshot,
            None => return Ok(Vec::new()),
        },
    };

    let list_bytes = table.file_io().read(&snapshot.manifest_list).await?;
    let manifests = read_manifest_list(&list_bytes)?;

    let mut files = Vec::new();
    for manifest in &manifests {
        let manifest_bytes = table.file_io().read(&manifest.manifest_path).await?;
        for entry in read_manifest(&manifest_bytes)? {
            if entry.status != ManifestEntryStatus::Deleted {
                files.push(entry.data_file);
            }
        }
    }
    Ok(files)
}

/// Total live record count of a snapshot, from manifest statistics.
pub async fn snapshot_record_count(table: &Table, snapshot_id: Option<i64>) -> Result<i64> {
    Ok(snapshot_data_files(table, snapshot_id)
        .await?
        .iter()
        .map(|f| f.record_count)
        .sum())
}
