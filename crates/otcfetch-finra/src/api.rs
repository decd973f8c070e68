//! FINRA API client: client-credentials token exchange and paged GETs

use std::time::Duration;

use otcfetch_core::http::send_text;
use otcfetch_core::{HttpError, http_client};
use reqwest::header::ACCEPT;
use serde::Deserialize;
use serde_json::Value;

use crate::config::{Credentials, Endpoints};
use crate::error::ApiError;
use crate::token::Token;

/// Token exchange timeout
const TOKEN_TIMEOUT: Duration = Duration::from_secs(30);

/// Page fetch timeout
const PAGE_TIMEOUT: Duration = Duration::from_secs(60);

/// One offset/limit page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub offset: u64,
    pub limit: u64,
}

/// Offset bookkeeping for a run. Only [`PageCursor::advance`] moves the
/// offset, and the runner calls it only after a page succeeded.
#[derive(Debug, Clone, Copy)]
pub struct PageCursor {
    offset: u64,
    limit: u64,
}

impl PageCursor {
    pub fn new(offset: u64, limit: u64) -> Self {
        Self { offset, limit }
    }

    pub fn request(&self) -> PageRequest {
        PageRequest {
            offset: self.offset,
            limit: self.limit,
        }
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn advance(&mut self) {
        self.offset += self.limit;
    }

    /// A short page (fewer than `limit` records) is the last one.
    pub fn is_last_page(&self, count: usize) -> bool {
        (count as u64) < self.limit
    }
}

/// The two calls a fetch run makes. Implemented by [`FinraClient`] for the
/// real service; tests substitute scripted responses.
pub trait OtcApi {
    /// Single credential exchange (no retry)
    fn request_token(&self, credentials: &Credentials) -> Result<Token, ApiError>;

    /// Single page GET (no retry)
    fn fetch_page(
        &self,
        token: &Token,
        dataset: &str,
        page: PageRequest,
    ) -> Result<Vec<Value>, ApiError>;
}

/// Blocking client for the FINRA query API
#[derive(Debug, Clone)]
pub struct FinraClient {
    endpoints: Endpoints,
}

impl FinraClient {
    pub fn new(endpoints: Endpoints) -> Self {
        Self { endpoints }
    }
}

impl OtcApi for FinraClient {
    fn request_token(&self, credentials: &Credentials) -> Result<Token, ApiError> {
        let form = [
            ("grant_type", "client_credentials"),
            ("apiclientid", credentials.username.as_str()),
            ("apiclientsecret", credentials.password()),
        ];
        let request = http_client()
            .post(&self.endpoints.token_url)
            .basic_auth(&credentials.username, Some(credentials.password()))
            .header(ACCEPT, "application/json")
            .form(&form)
            .timeout(TOKEN_TIMEOUT);

        let body = send_text(request)?;
        parse_token_response(&body).map(Token::new)
    }

    fn fetch_page(
        &self,
        token: &Token,
        dataset: &str,
        page: PageRequest,
    ) -> Result<Vec<Value>, ApiError> {
        let url = format!("{}{}", self.endpoints.base_url, dataset);
        let request = http_client()
            .get(&url)
            .bearer_auth(token.secret())
            .header(ACCEPT, "application/json")
            .query(&[("limit", page.limit), ("offset", page.offset)])
            .timeout(PAGE_TIMEOUT);

        let body = send_text(request)?;
        parse_page(&body)
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
}

/// Pull `access_token` out of a token endpoint response body.
pub fn parse_token_response(body: &str) -> Result<String, ApiError> {
    let parsed: TokenResponse = serde_json::from_str(body).map_err(HttpError::from)?;
    match parsed.access_token {
        Some(token) if !token.is_empty() => Ok(token),
        _ => {
            // Only field names; the body may carry other credentials
            let fields = serde_json::from_str::<serde_json::Map<String, Value>>(body)
                .map(|m| m.keys().cloned().collect::<Vec<_>>().join(", "))
                .unwrap_or_default();
            Err(ApiError::MissingToken(format!("fields: [{fields}]")))
        }
    }
}

/// Decode a data page. An empty body is an empty page; valid JSON that is
/// not an array is [`ApiError::Malformed`].
pub fn parse_page(body: &str) -> Result<Vec<Value>, ApiError> {
    if body.trim().is_empty() {
        return Ok(Vec::new());
    }
    match serde_json::from_str::<Value>(body).map_err(HttpError::from)? {
        Value::Array(records) => Ok(records),
        other => Err(ApiError::Malformed(format!(
            "expected a JSON array of records, got {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
