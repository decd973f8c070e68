//! Fetch run configuration

use std::path::PathBuf;
use std::time::Duration;

use crate::error::FetchError;

pub const DEFAULT_TOKEN_URL: &str = "https://ews.fip.finra.org/fip/rest/ews/oauth2/access_token";
pub const DEFAULT_BASE_URL: &str = "https://api.finra.org/data/group/OTCMarket/name/";
pub const DEFAULT_LIMIT: u64 = 5000;
pub const DEFAULT_RETRY_DELAY_SECS: u64 = 60;
pub const DEFAULT_MAX_RETRIES: u32 = 10;
pub const DEFAULT_TOKEN_REFRESH_SECS: u64 = 300;
/// Successful requests between numbered part files
pub const DEFAULT_SAVE_INTERVAL: u64 = 200;
/// Consecutive transport failures tolerated at one offset (0 = unbounded)
pub const DEFAULT_MAX_PAGE_RETRIES: u32 = 30;

/// API client id and secret
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Token and data endpoint URLs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub token_url: String,
    /// Dataset name is appended verbatim
    pub base_url: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            token_url: DEFAULT_TOKEN_URL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

/// Everything one dataset fetch needs, resolved once at startup.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub dataset: String,
    pub endpoints: Endpoints,
    pub credentials: Credentials,
    /// Page size
    pub limit: u64,
    /// Starting offset
    pub offset: u64,
    /// Fixed sleep after any failed request
    pub retry_delay: Duration,
    /// Token request attempts
    pub max_retries: u32,
    pub token_refresh_interval: Duration,
    pub save_interval: u64,
    pub max_page_retries: u32,
    pub save_folder: PathBuf,
}

impl FetchConfig {
    /// Config with built-in defaults for everything but the essentials
    pub fn new(
        dataset: impl Into<String>,
        save_folder: impl Into<PathBuf>,
        credentials: Credentials,
    ) -> Self {
        Self {
            dataset: dataset.into(),
            endpoints: Endpoints::default(),
            credentials,
            limit: DEFAULT_LIMIT,
            offset: 0,
            retry_delay: Duration::from_secs(DEFAULT_RETRY_DELAY_SECS),
            max_retries: DEFAULT_MAX_RETRIES,
            token_refresh_interval: Duration::from_secs(DEFAULT_TOKEN_REFRESH_SECS),
            save_interval: DEFAULT_SAVE_INTERVAL,
            max_page_retries: DEFAULT_MAX_PAGE_RETRIES,
            save_folder: save_folder.into(),
        }
    }

    /// Full URL of the dataset collection
    pub fn dataset_url(&self) -> String {
        format!("{}{}", self.endpoints.base_url, self.dataset)
    }

    pub fn validate(&self) -> Result<(), FetchError> {
        let fail = |msg: &str| Err(FetchError::Config(msg.to_string()));
        if self.dataset.trim().is_empty() {
            return fail("dataset must not be empty");
        }
        if self.dataset.contains(['/', '\\']) {
            return fail("dataset must be a bare name");
        }
        if self.limit == 0 {
            return fail("limit must be at least 1");
        }
        if self.save_interval == 0 {
            return fail("save interval must be at least 1");
        }
        if self.credentials.username.is_empty() || self.credentials.password().is_empty() {
            return fail("username and password are required");
        }
        Ok(())
    }
}
