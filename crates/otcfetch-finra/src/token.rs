//! Bearer token lifecycle: acquisition with retry and staleness checks

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use otcfetch_core::retry_fixed;

use crate::api::OtcApi;
use crate::config::Credentials;
use crate::error::FetchError;

/// An access token plus the moment it was obtained.
///
/// Tokens are never mutated; a refresh replaces the whole value.
#[derive(Clone)]
pub struct Token {
    secret: String,
    acquired_at: Instant,
    issued_at: DateTime<Utc>,
}

impl Token {
    /// Token obtained just now
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            acquired_at: Instant::now(),
            issued_at: Utc::now(),
        }
    }

    /// Token obtained at an earlier `Instant`
    #[cfg(test)]
    pub(crate) fn acquired_at(secret: impl Into<String>, acquired_at: Instant) -> Self {
        let age = chrono::TimeDelta::from_std(acquired_at.elapsed()).unwrap_or(chrono::TimeDelta::zero());
        Self {
            secret: secret.into(),
            acquired_at,
            issued_at: Utc::now() - age,
        }
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub fn age(&self) -> Duration {
        self.acquired_at.elapsed()
    }

    /// Wall-clock acquisition time
    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    /// Stale once its age strictly exceeds `refresh_interval`.
    pub fn is_stale(&self, refresh_interval: Duration) -> bool {
        self.age() > refresh_interval
    }
}

impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Token")
            .field("secret", &"<redacted>")
            .field("issued_at", &self.issued_at)
            .finish()
    }
}

/// Exchange credentials for a token, retrying with a fixed delay.
///
/// Every failure counts against `max_retries`, including responses that lack
/// an `access_token`. Exhaustion is always an error.
pub fn acquire_token<A: OtcApi + ?Sized>(
    api: &A,
    credentials: &Credentials,
    max_retries: u32,
    retry_delay: Duration,
) -> Result<Token, FetchError> {
    log::info!("Requesting new access token");
    let token = retry_fixed("token request", max_retries, retry_delay, |_| {
        api.request_token(credentials)
    })
    .map_err(|e| FetchError::TokenUnavailable {
        attempts: e.attempts,
        last: e.last,
    })?;
    log::info!(
        "Access token acquired at {}",
        token.issued_at().format("%Y-%m-%d %H:%M:%S UTC")
    );
    Ok(token)
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;

    use super::*;

    #[test]
    fn fresh_token_not_stale() {
        let token = Token::new("abc");
        assert!(!token.is_stale(Duration::from_secs(300)));
    }

    #[test]
    fn backdated_token_is_stale() {
        let past = Instant::now()
            .checked_sub(Duration::from_secs(301))
            .expect("monotonic clock too young");
        let token = Token::acquired_at("abc", past);
        assert!(token.is_stale(Duration::from_secs(300)));
        assert!(token.issued_at() < Utc::now() - TimeDelta::seconds(300));
    }

    #[test]
    fn debug_hides_secret() {
        let token = Token::new("super-secret-value");
        let out = format!("{token:?}");
        assert!(!out.contains("super-secret-value"));
        assert!(out.contains("<redacted>"));
    }
}
