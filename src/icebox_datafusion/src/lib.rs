mod bridge;
mod error;
mod metrics;

pub use bridge::{QueryBridge, QueryBridgeConfig, QueryResult, DEFAULT_MAX_RESULT_ROWS};
pub use error::{Error, Result};
pub use metrics::MetricsSnapshot;
