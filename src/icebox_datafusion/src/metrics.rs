/// Bridge counters, guarded by a lock inside the bridge; reads hand out a
/// value copy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub queries_executed: u64,
    pub tables_registered: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub total_query_time_us: u64,
    pub errors: u64,
}
