//! otcfetch FINRA - paginated download of FINRA OTC market data
//!
//! Authenticates with an OAuth2 client-credentials grant, pages through a
//! dataset by offset/limit, and checkpoints records to numbered
//! pipe-delimited part files.

pub mod api;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod runner;
pub mod stats;
pub mod token;

// Re-exports
pub use api::{FinraClient, OtcApi, PageRequest};
pub use checkpoint::Checkpointer;
pub use config::{Credentials, Endpoints, FetchConfig};
pub use error::{ApiError, FetchError};
pub use runner::run;
pub use stats::{FetchSummary, Outcome};
pub use token::Token;
