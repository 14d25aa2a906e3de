//! Common utilities and types shared across minizero

pub mod config;
pub mod context;
pub mod error;
pub mod metrics;
pub mod tracing_middleware;
pub mod utils;

pub use config::{Config, WalSyncPolicy, ZeroConfig};
pub use context::RequestContext;
pub use error::{Error, Result};
pub use metrics::ZeroMetrics;
pub use utils::{crc32, parse_duration, retry_with_backoff, timestamp_now_millis};
