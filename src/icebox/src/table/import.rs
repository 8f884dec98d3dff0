use arrow_array::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use tracing::info;

use super::{writer, Table};
use crate::cancel::CancelToken;
use crate::catalog::{Catalog, TableCreateOptions};
use crate::convert::arrow_to_iceberg_schema;
use crate::error::Result;
use crate::ident::TableIdent;
use crate::table::writer::WriteOptions;

/// Result of a Parquet import: the target table, whether it was created by
/// this import, and the exact number of rows appended.
#[derive(Clone, Debug)]
pub struct ImportOutcome {
    pub identifier: TableIdent,
    pub created: bool,
    pub records: i64,
}

/// Imports a Parquet file into a table. When the table does not exist yet,
/// its schema is inferred from the file (field ids assigned breadth-first
/// from 1) and the table is created first; when it exists, the file must be
/// write-compatible with the current schema.
pub async fn import_parquet(
    catalog: &dyn Catalog,
    identifier: &TableIdent,
    source_path: &str,
    options: &WriteOptions,
    cancel: &CancelToken,
) -> Result<(Table, ImportOutcome)> {
    cancel.check("import")?;
    let bytes = catalog.file_io().read(source_path).await?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(bytes)?;
    let arrow_schema = builder.schema().clone();

    let (table, created) = if catalog.table_exists(identifier, cancel).await? {
        (catalog.load_table(identifier, cancel).await?, false)
    } else {
        let schema = arrow_to_iceberg_schema(arrow_schema.as_ref())?;
        let table = catalog
            .create_table(identifier, schema, TableCreateOptions::default(), cancel)
            .await?;
        (table, true)
    };

    let mut batches: Vec<RecordBatch> = Vec::new();
    let mut records = 0i64;
    for batch in builder.build()? {
        cancel.check("import read")?;
        let batch = batch?;
        records += batch.num_rows() as i64;
        batches.push(batch);
    }

    let table = writer::append(catalog, &table, &batches, options, cancel).await?;
    info!(table = %identifier, source = source_path, records, created, "imported parquet file");

    Ok((
        table,
        ImportOutcome {
            identifier: identifier.clone(),
            created,
            records,
        },
    ))
}
