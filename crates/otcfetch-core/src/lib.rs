//! otcfetch Core - Common infrastructure for paginated API downloads
//!
//! This crate provides the reusable pieces of a fetch run: a blocking HTTP
//! client over a shared runtime, retry helpers, logging, progress display,
//! shutdown signalling, and the delimited-text sink used for checkpoints.

pub mod http;
pub mod logging;
pub mod progress;
pub mod retry;
pub mod shutdown;
pub mod sink;

// Re-exports for convenience
pub use http::{HttpError, SHARED_RUNTIME, http_client};
pub use logging::{IndicatifLogger, init_logging};
pub use progress::{ProgressContext, SharedProgress, fmt_num};
pub use retry::{RetryExhausted, retry_fixed};
pub use shutdown::shutdown_flag;
pub use sink::{CsvSink, DEFAULT_DELIMITER};
