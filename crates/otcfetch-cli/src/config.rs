//! Configuration loading: TOML file, then environment overrides

use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use otcfetch_finra::config::{
    DEFAULT_BASE_URL, DEFAULT_LIMIT, DEFAULT_MAX_PAGE_RETRIES, DEFAULT_MAX_RETRIES,
    DEFAULT_RETRY_DELAY_SECS, DEFAULT_SAVE_INTERVAL,
    DEFAULT_TOKEN_REFRESH_SECS, DEFAULT_TOKEN_URL,
};
use serde::Deserialize;

/// Global configuration for otcfetch
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub auth: AuthConfig,
    pub fetch: FetchDefaults,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub token_url: String,
    pub base_url: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            token_url: DEFAULT_TOKEN_URL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

#[derive(Clone, Deserialize, Default)]
#[serde(default)]
pub struct AuthConfig {
    #[serde(deserialize_with = "deserialize_env_var")]
    pub username: Option<String>,
    #[serde(deserialize_with = "deserialize_env_var")]
    pub password: Option<String>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchDefaults {
    pub dataset: Option<String>,
    pub limit: u64,
    pub retry_delay_seconds: u64,
    pub max_retries: u32,
    pub token_refresh_interval: u64,
    pub save_interval: u64,
    pub max_page_retries: u32,
}

impl Default for FetchDefaults {
    fn default() -> Self {
        Self {
            dataset: None,
            limit: DEFAULT_LIMIT,
            retry_delay_seconds: DEFAULT_RETRY_DELAY_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
            token_refresh_interval: DEFAULT_TOKEN_REFRESH_SECS,
            save_interval: DEFAULT_SAVE_INTERVAL,
            max_page_retries: DEFAULT_MAX_PAGE_RETRIES,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct OutputConfig {
    pub save_folder: Option<PathBuf>,
}

/// Deserialize a string that may contain environment variable reference like ${VAR}
fn deserialize_env_var<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt: Option<String> = Option::deserialize(deserializer)?;
    Ok(opt.and_then(|s| expand_env_var(&s)))
}

/// Expand ${VAR} to environment variable value
fn expand_env_var(s: &str) -> Option<String> {
    if let Some(var_name) = s.strip_prefix("${").and_then(|s| s.strip_suffix('}')) {
        std::env::var(var_name).ok()
    } else {
        Some(s.to_string())
    }
}

/// Parse a numeric environment value, naming the variable on failure
fn parse_env<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.trim()
        .parse()
        .with_context(|| format!("Invalid value for {key}: {raw:?}"))
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Search order:
    /// 1. ./otcfetch.toml (current directory)
    /// 2. ~/.config/otcfetch/config.toml
    ///
    /// If no config file found, returns default config.
    pub fn load() -> Result<Self> {
        let local_config = PathBuf::from("otcfetch.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = directories::ProjectDirs::from("", "", "otcfetch") {
            let user_config = config_dir.config_dir().join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        log::debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Overlay environment variables on top of file values.
    ///
    /// Names match the legacy downloader, including the lowercase `limit` and
    /// `retry_delay_seconds` and the `SAVE_INTERVEL` spelling.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = lookup("TOKEN_URL") {
            self.api.token_url = v;
        }
        if let Some(v) = lookup("BASE_URL") {
            self.api.base_url = v;
        }
        if let Some(v) = lookup("USERNAME") {
            self.auth.username = Some(v);
        }
        if let Some(v) = lookup("PASSWORD") {
            self.auth.password = Some(v);
        }
        if let Some(v) = lookup("DATASET") {
            self.fetch.dataset = Some(v);
        }
        if let Some(v) = lookup("SAVE_FOLDER") {
            self.output.save_folder = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("limit") {
            self.fetch.limit = parse_env("limit", &v)?;
        }
        if let Some(v) = lookup("retry_delay_seconds") {
            self.fetch.retry_delay_seconds = parse_env("retry_delay_seconds", &v)?;
        }
        if let Some(v) = lookup("MAX_RETRIES") {
            self.fetch.max_retries = parse_env("MAX_RETRIES", &v)?;
        }
        if let Some(v) = lookup("TOKEN_REFRESH_INTERVAL") {
            self.fetch.token_refresh_interval = parse_env("TOKEN_REFRESH_INTERVAL", &v)?;
        }
        // Legacy spelling first so SAVE_INTERVAL wins when both are set
        for key in ["SAVE_INTERVEL", "SAVE_INTERVAL"] {
            if let Some(v) = lookup(key) {
                self.fetch.save_interval = parse_env(key, &v)?;
            }
        }
        if let Some(v) = lookup("MAX_PAGE_RETRIES") {
            self.fetch.max_page_retries = parse_env("MAX_PAGE_RETRIES", &v)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.api.token_url, DEFAULT_TOKEN_URL);
        assert_eq!(config.fetch.limit, 5000);
        assert!(config.output.save_folder.is_none());
        assert!(config.fetch.dataset.is_none());
    }

    #[test]
    fn expand_env_var_literal() {
        assert_eq!(expand_env_var("literal"), Some("literal".to_string()));
    }

    #[test]
    fn expand_env_var_missing() {
        assert_eq!(expand_env_var("${NONEXISTENT_VAR_OTCFETCH_12345}"), None);
    }

    #[test]
    fn parse_config_toml() {
        let toml = r#"
[api]
base_url = "http://localhost:8080/data/"

[fetch]
dataset = "weeklySummary"
limit = 1000
save_interval = 50

[output]
save_folder = "/tmp/finra"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.api.base_url, "http://localhost:8080/data/");
        assert_eq!(config.api.token_url, DEFAULT_TOKEN_URL);
        assert_eq!(config.fetch.dataset.as_deref(), Some("weeklySummary"));
        assert_eq!(config.fetch.limit, 1000);
        assert_eq!(config.fetch.save_interval, 50);
        assert_eq!(config.fetch.max_retries, 10);
        assert_eq!(config.output.save_folder, Some(PathBuf::from("/tmp/finra")));
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config: Config = toml::from_str("[fetch]\nlimit = 1000\n").unwrap();
        config
            .apply_env(env(&[
                ("limit", "250"),
                ("retry_delay_seconds", "5"),
                ("USERNAME", "client-id"),
                ("PASSWORD", "client-secret"),
                ("DATASET", "monthlySummary"),
                ("SAVE_INTERVEL", "20"),
            ]))
            .unwrap();

        assert_eq!(config.fetch.limit, 250);
        assert_eq!(config.fetch.retry_delay_seconds, 5);
        assert_eq!(config.auth.username.as_deref(), Some("client-id"));
        assert_eq!(config.auth.password.as_deref(), Some("client-secret"));
        assert_eq!(config.fetch.dataset.as_deref(), Some("monthlySummary"));
        assert_eq!(config.fetch.save_interval, 20);
    }

    #[test]
    fn save_interval_beats_legacy_spelling() {
        let mut config = Config::default();
        config
            .apply_env(env(&[("SAVE_INTERVAL", "30"), ("SAVE_INTERVEL", "20")]))
            .unwrap();
        assert_eq!(config.fetch.save_interval, 30);
    }

    #[test]
    fn save_folder_from_env() {
        let mut config = Config::default();
        config
            .apply_env(env(&[("SAVE_FOLDER", "/srv/finra")]))
            .unwrap();
        assert_eq!(config.output.save_folder, Some(PathBuf::from("/srv/finra")));
    }

    #[test]
    fn invalid_env_number_names_variable() {
        let mut config = Config::default();
        let err = config
            .apply_env(env(&[("MAX_RETRIES", "ten")]))
            .unwrap_err();
        assert!(err.to_string().contains("MAX_RETRIES"));
    }

    #[test]
    fn auth_debug_hides_password() {
        let auth = AuthConfig {
            username: Some("id".into()),
            password: Some("hunter2".into()),
        };
        assert!(!format!("{auth:?}").contains("hunter2"));
    }

    #[test]
    fn from_file_reads_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("otcfetch.toml");
        std::fs::write(&path, "[fetch]\nmax_page_retries = 0\n").unwrap();

        let config = Config::from_file(&path).unwrap();

        assert_eq!(config.fetch.max_page_retries, 0);
    }
}
