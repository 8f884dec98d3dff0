use clap::Parser;
use icebox::{CancelToken, TableIdent};
use icebox_service::{start_with_config, Result, ServiceConfig};

#[derive(Parser)]
#[command(name = "icebox")]
#[command(about = "Local Iceberg lakehouse playground")]
struct Cli {
    /// Base path for the catalog database and warehouse
    base_path: String,

    /// Import a Parquet file before querying
    #[arg(long)]
    import: Option<String>,

    /// Target table for --import, as ns.table
    #[arg(long)]
    table: Option<String>,

    /// SQL statement to execute
    #[arg(long)]
    sql: Option<String>,

    /// Pin --sql to a snapshot id or timestamp (requires --table)
    #[arg(long)]
    as_of: Option<String>,
}

#[tokio::main]
pub async fn main() -> Result<()> {
    let cli = Cli::parse();
    let service = start_with_config(ServiceConfig::local("icebox", &cli.base_path)).await?;
    let cancel = CancelToken::new();

    if let Some(source) = &cli.import {
        let identifier = TableIdent::parse(cli.table.as_deref().unwrap_or("default.imported"))?;
        let outcome = service.import(&identifier, source, &cancel).await?;
        println!(
            "imported {} rows into {} (created: {})",
            outcome.records, outcome.identifier, outcome.created
        );
    }

    if let Some(sql) = &cli.sql {
        let result = match (&cli.as_of, &cli.table) {
            (Some(as_of), Some(table)) => {
                let identifier = TableIdent::parse(table)?;
                service.query_as_of(sql, &identifier, as_of, &cancel).await?
            }
            _ => service.query(sql, &cancel).await?,
        };
        println!(
            "{}: {} rows ({}){}",
            result.query_id,
            result.row_count,
            result.columns.join(", "),
            if result.truncated { " [truncated]" } else { "" }
        );
        for batch in &result.batches {
            println!("{batch:?}");
        }
    }

    Ok(())
}
