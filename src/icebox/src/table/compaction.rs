use std::collections::HashMap;
use std::collections::HashSet;

use arrow_array::RecordBatch;
use chrono::Utc;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use tracing::info;

use super::parquet_utils::default_writer_properties;
use super::{scan, writer, Table};
use crate::cancel::CancelToken;
use crate::catalog::Catalog;
use crate::error::{Error, Result};
use crate::spec::{DataFile, Operation};

/// How the input data files of a compaction are chosen.
#[derive(Clone, Debug)]
pub enum FileSelection {
    /// Every live data file of the current snapshot.
    All,
    /// An explicit list of data-file paths; each must be live.
    Paths(Vec<String>),
    /// A `*`-wildcard pattern matched against the full file path.
    Pattern(String),
    /// Files whose storage modification time falls in `[from_ms, to_ms]`.
    ModifiedBetween { from_ms: i64, to_ms: i64 },
}

/// Merges the selected data files into one Parquet file and commits a
/// `replace` snapshot whose manifest references the merged file plus the
/// untouched remainder. The input files become unreferenced but are not
/// deleted. If anything fails after the merged file is written, the merged
/// file is left in place and no commit has occurred.
pub async fn compact(
    catalog: &dyn Catalog,
    table: &Table,
    selection: FileSelection,
    cancel: &CancelToken,
) -> Result<Table> {
    cancel.check("compact")?;
    let live_files = scan::snapshot_data_files(table, None).await?;
    let (inputs, remainder) = select_files(table, &live_files, &selection).await?;
    if inputs.is_empty() {
        return Err(Error::unsupported(
            "compaction selected no input files; nothing to merge",
        ));
    }

    let merged = merge_files(table, &inputs, cancel).await?;
    info!(
        table = %table.identifier(),
        merged_files = inputs.len(),
        merged_records = merged.record_count,
        "compaction merged data files"
    );

    writer::commit_snapshot(
        catalog,
        table,
        writer::SnapshotCommit {
            operation: Operation::Replace,
            new_files: vec![merged],
            existing_files: remainder,
            carry_parent_manifests: false,
            summary_extra: HashMap::from([(
                "replaced-data-files".to_string(),
                inputs.len().to_string(),
            )]),
        },
        cancel,
    )
    .await
}

async fn select_files(
    table: &Table,
    live_files: &[DataFile],
    selection: &FileSelection,
) -> Result<(Vec<DataFile>, Vec<DataFile>)> {
    let mut inputs = Vec::new();
    let mut remainder = Vec::new();
    match selection {
        FileSelection::All => {
            inputs = live_files.to_vec();
        }
        FileSelection::Paths(paths) => {
            let wanted: HashSet<&str> = paths.iter().map(String::as_str).collect();
            let live: HashSet<&str> = live_files.iter().map(|f| f.file_path.as_str()).collect();
            if let Some(stray) = wanted.iter().find(|p| !live.contains(*p)) {
                return Err(Error::not_found(stray));
            }
            for file in live_files {
                if wanted.contains(file.file_path.as_str()) {
                    inputs.push(file.clone());
                } else {
                    remainder.push(file.clone());
                }
            }
        }
        FileSelection::Pattern(pattern) => {
            for file in live_files {
                if wildcard_match(pattern, &file.file_path) {
                    inputs.push(file.clone());
                } else {
                    remainder.push(file.clone());
                }
            }
        }
        FileSelection::ModifiedBetween { from_ms, to_ms } => {
            for file in live_files {
                let modified = table
                    .file_io()
                    .metadata(&file.file_path)
                    .await?
                    .modified_ms
                    .unwrap_or(i64::MIN);
                if modified >= *from_ms && modified <= *to_ms {
                    inputs.push(file.clone());
                } else {
                    remainder.push(file.clone());
                }
            }
        }
    }
    Ok((inputs, remainder))
}

async fn merge_files(table: &Table, inputs: &[DataFile], cancel: &CancelToken) -> Result<DataFile> {
    let mut batches: Vec<RecordBatch> = Vec::new();
    for input in inputs {
        cancel.check("compaction read")?;
        let bytes = table.file_io().read(&input.file_path).await?;
        let reader = ParquetRecordBatchReaderBuilder::try_new(bytes)?.build()?;
        for batch in reader {
            batches.push(batch?);
        }
    }

    let schema = batches
        .first()
        .map(|b| b.schema())
        .ok_or_else(|| Error::unsupported("compaction inputs contain no rows"))?;
    let mut buffer = Vec::new();
    let mut parquet_writer =
        ArrowWriter::try_new(&mut buffer, schema, Some(default_writer_properties()))?;
    let mut rows = 0i64;
    for batch in &batches {
        cancel.check("compaction write")?;
        parquet_writer.write(batch)?;
        rows += batch.num_rows() as i64;
    }
    parquet_writer.close()?;

    let path = format!(
        "{}/data/part-{}-0.parquet",
        table.location(),
        Utc::now().timestamp_micros()
    );
    let size = buffer.len() as i64;
    table.file_io().write(&path, buffer).await?;
    Ok(DataFile::parquet(path, rows, size))
}

/// Minimal `*` wildcard matcher (no character classes), iterative with
/// backtracking to the last star.
fn wildcard_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();
    let (mut p, mut t) = (0usize, 0usize);
    let mut star: Option<usize> = None;
    let mut star_t = 0usize;
    while t < text.len() {
        if p < pattern.len() && (pattern[p] == text[t]) {
            p += 1;
            t += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            star = Some(p);
            star_t = t;
            p += 1;
        } else if let Some(star_p) = star {
            p = star_p + 1;
            star_t += 1;
            t = star_t;
        } else {
            return false;
        }
    }
    while p < pattern.len() && pattern[p] == '*' {
        p += 1;
    }
    p == pattern.len()
}
