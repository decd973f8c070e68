//! Error types for API calls and fetch runs

use std::path::PathBuf;

use otcfetch_core::HttpError;

/// Error from a single call against the FINRA API.
#[derive(Debug)]
pub enum ApiError {
    /// Network failure, non-success status, or undecodable body
    Http(HttpError),
    /// Token endpoint answered without an `access_token`
    MissingToken(String),
    /// Data endpoint answered with valid JSON of the wrong shape
    Malformed(String),
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Http(e) => write!(f, "{e}"),
            Self::MissingToken(detail) => {
                write!(f, "token response has no 'access_token' field ({detail})")
            }
            Self::Malformed(detail) => write!(f, "malformed response: {detail}"),
        }
    }
}

impl std::error::Error for ApiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Http(e) => Some(e),
            _ => None,
        }
    }
}

impl From<HttpError> for ApiError {
    fn from(e: HttpError) -> Self {
        Self::Http(e)
    }
}

impl ApiError {
    /// Transport-level failures are retried at the same offset; anything
    /// else ends the run.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Http(_) | Self::MissingToken(_))
    }

    /// The bearer token was rejected and must be replaced before retrying.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Http(e) if e.is_unauthorized())
    }
}

/// Error that ends a dataset fetch.
#[derive(Debug)]
pub enum FetchError {
    /// Invalid configuration detected before any request
    Config(String),
    /// No token after exhausting the retry budget
    TokenUnavailable { attempts: u32, last: ApiError },
    /// Too many consecutive transport failures at one offset
    PageRetriesExhausted {
        offset: u64,
        attempts: u32,
        last: ApiError,
    },
    /// Non-transport failure while fetching a page
    Unexpected { offset: u64, source: ApiError },
    /// Local filesystem failure (save folder or checkpoint file)
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "invalid configuration: {msg}"),
            Self::TokenUnavailable { attempts, last } => {
                write!(f, "could not obtain access token after {attempts} attempts: {last}")
            }
            Self::PageRetriesExhausted {
                offset,
                attempts,
                last,
            } => write!(
                f,
                "giving up on offset {offset} after {attempts} consecutive failures: {last}"
            ),
            Self::Unexpected { offset, source } => {
                write!(f, "unexpected error at offset {offset}: {source}")
            }
            Self::Io { path, source } => write!(f, "IO error on {}: {source}", path.display()),
        }
    }
}

impl std::error::Error for FetchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Config(_) => None,
            Self::TokenUnavailable { last, .. } | Self::PageRetriesExhausted { last, .. } => {
                Some(last)
            }
            Self::Unexpected { source, .. } => Some(source),
            Self::Io { source, .. } => Some(source),
        }
    }
}
