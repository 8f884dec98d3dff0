use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use arrow_array::RecordBatch;
use datafusion::datasource::MemTable;
use datafusion::prelude::{ParquetReadOptions, SessionContext};
use tracing::{debug, warn};

use icebox::catalog::Catalog;
use icebox::convert::iceberg_to_arrow_schema;
use icebox::table::time_travel::{resolve_as_of, ResolvedSnapshot};
use icebox::table::{scan, Table};
use icebox::{CancelToken, TableIdent};

use crate::error::{Error, Result};
use crate::metrics::MetricsSnapshot;

/// Result rows are capped; everything beyond is dropped with a warning.
pub const DEFAULT_MAX_RESULT_ROWS: usize = 100_000;

/// Statements whose first token mutates state; rejected in read-only mode.
const MUTATION_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "DROP", "CREATE", "ALTER", "TRUNCATE", "MERGE", "REPLACE",
    "COPY",
];

#[derive(Clone, Debug)]
pub struct QueryBridgeConfig {
    pub read_only: bool,
    pub max_result_rows: usize,
}

impl Default for QueryBridgeConfig {
    fn default() -> Self {
        Self {
            read_only: true,
            max_result_rows: DEFAULT_MAX_RESULT_ROWS,
        }
    }
}

/// One executed query: its id, the column names, and the (possibly
/// truncated) result batches.
#[derive(Clone, Debug)]
pub struct QueryResult {
    pub query_id: String,
    pub columns: Vec<String>,
    pub batches: Vec<RecordBatch>,
    pub row_count: usize,
    pub truncated: bool,
}

#[derive(Clone, Debug)]
struct Registration {
    snapshot_id: Option<i64>,
    view_name: String,
    alias: Option<String>,
}

/// Integrates catalog tables with the embedded SQL executor: registers views
/// over a snapshot's data files, rewrites dotted table paths to view names,
/// enforces the read-only guard and the result-row cap, and keeps usage
/// counters. Registrations are cached per (identifier, snapshot); entries
/// are immutable once published.
pub struct QueryBridge {
    ctx: SessionContext,
    catalog: Arc<dyn Catalog>,
    config: QueryBridgeConfig,
    cache: Mutex<HashMap<TableIdent, Registration>>,
    views: Mutex<BTreeSet<String>>,
    metrics: Mutex<MetricsSnapshot>,
    query_counter: AtomicU64,
}

impl QueryBridge {
    pub fn new(catalog: Arc<dyn Catalog>, config: QueryBridgeConfig) -> Self {
        Self {
            ctx: SessionContext::new(),
            catalog,
            config,
            cache: Mutex::new(HashMap::new()),
            views: Mutex::new(BTreeSet::new()),
            metrics: Mutex::new(MetricsSnapshot::default()),
            query_counter: AtomicU64::new(0),
        }
    }

    /// Value-copy snapshot of the bridge counters.
    pub fn metrics(&self) -> MetricsSnapshot {
        *self.metrics.lock().unwrap()
    }

    /// Every view name this bridge has registered, sorted.
    pub fn list_views(&self) -> Vec<String> {
        self.views.lock().unwrap().iter().cloned().collect()
    }

    /// Column `(name, type)` pairs of a registered view.
    pub async fn describe(&self, view: &str) -> Result<Vec<(String, String)>> {
        let table = self.ctx.table(view).await?;
        Ok(table
            .schema()
            .fields()
            .iter()
            .map(|f| (f.name().clone(), f.data_type().to_string()))
            .collect())
    }

    fn view_name_for(identifier: &TableIdent) -> String {
        let mut parts: Vec<String> = identifier.namespace().parts().to_vec();
        parts.push(identifier.name().to_string());
        parts.join("_")
    }

    /// Registers the current snapshot of a table as a view reading the union
    /// of its data files, plus a bare-name alias when that name is free.
    /// Registering the same (identifier, snapshot) again is idempotent.
    pub async fn register_table(
        &self,
        identifier: &TableIdent,
        cancel: &CancelToken,
    ) -> Result<String> {
        cancel.check("register_table")?;
        let table = self.catalog.load_table(identifier, cancel).await?;
        let snapshot_id = table.metadata().current_snapshot_id;

        let previous = self.cache.lock().unwrap().get(identifier).cloned();
        if let Some(existing) = &previous {
            if existing.snapshot_id == snapshot_id {
                self.metrics.lock().unwrap().cache_hits += 1;
                return Ok(existing.view_name.clone());
            }
        }
        self.metrics.lock().unwrap().cache_misses += 1;

        // a superseded registration of this table gives up its alias first
        if let Some(stale_alias) = previous.and_then(|r| r.alias) {
            if self.ctx.table_exist(stale_alias.as_str())? {
                self.ctx.deregister_table(stale_alias.as_str())?;
            }
            self.views.lock().unwrap().remove(&stale_alias);
        }

        let view_name = Self::view_name_for(identifier);
        self.register_snapshot_view(&table, snapshot_id, &view_name).await?;

        // bare-name alias when no other registration holds it
        let alias = identifier.name().to_string();
        let alias = if !self.ctx.table_exist(alias.as_str())? {
            self.register_snapshot_view(&table, snapshot_id, &alias).await?;
            Some(alias)
        } else {
            None
        };

        let registration = Registration {
            snapshot_id,
            view_name: view_name.clone(),
            alias,
        };
        self.cache.lock().unwrap().insert(identifier.clone(), registration);
        self.metrics.lock().unwrap().tables_registered += 1;
        debug!(table = %identifier, view = %view_name, ?snapshot_id, "registered table view");
        Ok(view_name)
    }

    /// Registers a view pinned to a historical snapshot resolved from an
    /// as-of string; the view name carries the snapshot id.
    pub async fn register_pinned(
        &self,
        identifier: &TableIdent,
        as_of: &str,
        cancel: &CancelToken,
    ) -> Result<(String, ResolvedSnapshot)> {
        cancel.check("register_pinned")?;
        let table = self.catalog.load_table(identifier, cancel).await?;
        let resolved = resolve_as_of(table.metadata(), as_of)?;
        let view_name = format!(
            "{}_at_{}",
            Self::view_name_for(identifier),
            resolved.snapshot_id
        );
        if !self.ctx.table_exist(view_name.as_str())? {
            self.register_snapshot_view(&table, Some(resolved.snapshot_id), &view_name).await?;
        }
        Ok((view_name, resolved))
    }

    async fn register_snapshot_view(
        &self,
        table: &Table,
        snapshot_id: Option<i64>,
        view_name: &str,
    ) -> Result<()> {
        let files = scan::snapshot_data_files(table, snapshot_id).await?;
        if self.ctx.table_exist(view_name)? {
            self.ctx.deregister_table(view_name)?;
        }
        if files.is_empty() {
            // an empty table still answers queries over its schema
            let schema = iceberg_to_arrow_schema(table.metadata().current_schema()?)?;
            let provider = MemTable::try_new(Arc::new(schema), vec![vec![]])?;
            self.ctx.register_table(view_name, Arc::new(provider))?;
        } else {
            let paths: Vec<String> = files.into_iter().map(|f| f.file_path).collect();
            let frame = self.ctx.read_parquet(paths, ParquetReadOptions::default()).await?;
            self.ctx.register_table(view_name, frame.into_view())?;
        }
        self.views.lock().unwrap().insert(view_name.to_string());
        Ok(())
    }

    /// Drops a table's registration, its alias, and the cache entry.
    pub fn unregister(&self, identifier: &TableIdent) -> Result<()> {
        if let Some(registration) = self.cache.lock().unwrap().remove(identifier) {
            self.ctx.deregister_table(registration.view_name.as_str())?;
            self.views.lock().unwrap().remove(&registration.view_name);
            if let Some(alias) = registration.alias {
                self.ctx.deregister_table(alias.as_str())?;
                self.views.lock().unwrap().remove(&alias);
            }
        }
        Ok(())
    }

    /// Drops every registration.
    pub fn clear_cache(&self) -> Result<()> {
        let identifiers: Vec<TableIdent> = self.cache.lock().unwrap().keys().cloned().collect();
        for identifier in identifiers {
            self.unregister(&identifier)?;
        }
        for leftover in std::mem::take(&mut *self.views.lock().unwrap()) {
            if self.ctx.table_exist(leftover.as_str())? {
                self.ctx.deregister_table(leftover.as_str())?;
            }
        }
        Ok(())
    }

    fn next_query_id(&self) -> String {
        let epoch_ns = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let counter = self.query_counter.fetch_add(1, Ordering::SeqCst);
        format!("query_{epoch_ns}_{counter}")
    }

    /// Rewrites dotted table paths to their registered view names; SQL that
    /// references views directly passes through unchanged.
    fn preprocess(&self, sql: &str) -> Result<String> {
        if self.config.read_only {
            if let Some(first) = sql.split_whitespace().next() {
                let keyword = first.to_ascii_uppercase();
                if MUTATION_KEYWORDS.contains(&keyword.as_str()) {
                    return Err(Error::read_only_violation(&keyword));
                }
            }
        }

        let mut replacements: Vec<(String, String)> = self
            .cache
            .lock()
            .unwrap()
            .iter()
            .map(|(identifier, registration)| {
                (identifier.to_string(), registration.view_name.clone())
            })
            .collect();
        // longest first so a.b.c never half-matches a.b
        replacements.sort_by_key(|(path, _)| std::cmp::Reverse(path.len()));

        let mut rewritten = sql.to_string();
        for (path, view) in replacements {
            if rewritten.contains(&path) {
                rewritten = rewritten.replace(&path, &view);
            }
        }
        Ok(rewritten)
    }

    /// Executes one SQL statement through the executor, enforcing the row
    /// cap. Cancellation is checked before planning and before results are
    /// returned.
    pub async fn execute(&self, sql: &str, cancel: &CancelToken) -> Result<QueryResult> {
        let query_id = self.next_query_id();
        let started = Instant::now();
        let result = self.execute_inner(sql, cancel).await;
        {
            let mut metrics = self.metrics.lock().unwrap();
            metrics.queries_executed += 1;
            metrics.total_query_time_us += started.elapsed().as_micros() as u64;
            if result.is_err() {
                metrics.errors += 1;
            }
        }
        let (columns, batches, row_count, truncated) = result?;
        debug!(query_id = %query_id, row_count, truncated, "executed query");
        Ok(QueryResult {
            query_id,
            columns,
            batches,
            row_count,
            truncated,
        })
    }

    /// Executes a query against a table pinned at `as_of`: the pinned view is
    /// registered and the table path textually substituted before execution.
    pub async fn execute_as_of(
        &self,
        sql: &str,
        identifier: &TableIdent,
        as_of: &str,
        cancel: &CancelToken,
    ) -> Result<QueryResult> {
        let (pinned_view, resolved) = self.register_pinned(identifier, as_of, cancel).await?;
        debug!(
            table = %identifier,
            snapshot_id = resolved.snapshot_id,
            pinned_view = %pinned_view,
            "pinned time-travel view"
        );
        let rewritten = sql.replace(&identifier.to_string(), &pinned_view);
        self.execute(&rewritten, cancel).await
    }

    async fn execute_inner(
        &self,
        sql: &str,
        cancel: &CancelToken,
    ) -> Result<(Vec<String>, Vec<RecordBatch>, usize, bool)> {
        cancel.check("execute")?;
        let rewritten = self.preprocess(sql)?;
        let frame = self.ctx.sql(&rewritten).await?;
        let columns: Vec<String> = frame
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect();
        let batches = frame.collect().await?;
        // the executor does not hand back partial results, so a cancellation
        // observed here drops the rows and reports Cancelled
        cancel.check("execute")?;

        let (batches, row_count, truncated) =
            truncate_batches(batches, self.config.max_result_rows);
        if truncated {
            warn!(
                max_rows = self.config.max_result_rows,
                "query result truncated to the row cap"
            );
        }
        Ok((columns, batches, row_count, truncated))
    }
}

fn truncate_batches(
    batches: Vec<RecordBatch>,
    max_rows: usize,
) -> (Vec<RecordBatch>, usize, bool) {
    let total: usize = batches.iter().map(RecordBatch::num_rows).sum();
    if total <= max_rows {
        return (batches, total, false);
    }
    let mut kept = Vec::new();
    let mut remaining = max_rows;
    for batch in batches {
        if remaining == 0 {
            break;
        }
        let take = batch.num_rows().min(remaining);
        kept.push(batch.slice(0, take));
        remaining -= take;
    }
    (kept, max_rows, true)
}
