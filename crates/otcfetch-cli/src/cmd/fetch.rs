//! Fetch subcommand - download one dataset into numbered part files

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use otcfetch_core::{SharedProgress, shutdown_flag};
use otcfetch_finra::{Credentials, Endpoints, FetchConfig, FinraClient, Outcome};

use crate::config::Config;

/// Flags left unset fall back to environment variables, then the config
/// file, then built-in defaults. Legacy underscore spellings are accepted.
#[derive(Args, Debug, Default)]
pub struct FetchArgs {
    /// Dataset name in the OTCMarket group (e.g. monthlySummary)
    #[arg(long)]
    pub dataset: Option<String>,

    /// Records per request
    #[arg(long)]
    pub limit: Option<u64>,

    /// Seconds to wait after a failed request
    #[arg(long, alias = "retry_delay_seconds")]
    pub retry_delay_seconds: Option<u64>,

    /// Token request attempts before giving up
    #[arg(long, alias = "max_retries")]
    pub max_retries: Option<u32>,

    /// Seconds before the access token is refreshed
    #[arg(long, alias = "token_refresh_interval")]
    pub token_refresh_interval: Option<u64>,

    /// API client id
    #[arg(long)]
    pub username: Option<String>,

    /// API client secret
    #[arg(long)]
    pub password: Option<String>,

    /// Starting offset
    #[arg(long)]
    pub offset: Option<u64>,

    /// Directory for part files
    #[arg(long, alias = "save_folder")]
    pub save_folder: Option<PathBuf>,

    /// Successful requests per part file
    #[arg(long, aliases = ["save_interval", "save_intervel", "save-intervel"])]
    pub save_interval: Option<u64>,

    /// Consecutive failures tolerated at one offset (0 = retry forever)
    #[arg(long, alias = "max_page_retries")]
    pub max_page_retries: Option<u32>,
}

/// Merge CLI flags over the env-overlaid config into a [`FetchConfig`].
pub fn resolve(args: FetchArgs, config: &Config) -> Result<FetchConfig> {
    let dataset = args
        .dataset
        .or_else(|| config.fetch.dataset.clone())
        .context("No dataset given: pass --dataset or set DATASET")?;
    let username = args
        .username
        .or_else(|| config.auth.username.clone())
        .context("No username given: pass --username or set USERNAME")?;
    let password = args
        .password
        .or_else(|| config.auth.password.clone())
        .context("No password given: pass --password or set PASSWORD")?;
    let save_folder = args
        .save_folder
        .or_else(|| config.output.save_folder.clone())
        .context("No save folder given: pass --save-folder or set SAVE_FOLDER")?;

    let mut fetch = FetchConfig::new(dataset, save_folder, Credentials::new(username, password));
    fetch.endpoints = Endpoints {
        token_url: config.api.token_url.clone(),
        base_url: config.api.base_url.clone(),
    };
    fetch.limit = args.limit.unwrap_or(config.fetch.limit);
    fetch.offset = args.offset.unwrap_or(0);
    fetch.retry_delay = Duration::from_secs(
        args.retry_delay_seconds
            .unwrap_or(config.fetch.retry_delay_seconds),
    );
    fetch.max_retries = args.max_retries.unwrap_or(config.fetch.max_retries);
    fetch.token_refresh_interval = Duration::from_secs(
        args.token_refresh_interval
            .unwrap_or(config.fetch.token_refresh_interval),
    );
    fetch.save_interval = args.save_interval.unwrap_or(config.fetch.save_interval);
    fetch.max_page_retries = args
        .max_page_retries
        .unwrap_or(config.fetch.max_page_retries);

    fetch.validate()?;
    Ok(fetch)
}

pub fn run(args: FetchArgs, config: &Config, progress: &SharedProgress) -> Result<ExitCode> {
    let fetch = resolve(args, config)?;
    let client = FinraClient::new(fetch.endpoints.clone());

    let pb = progress.fetch_line(&fetch.dataset);
    let result = otcfetch_finra::run(&client, &fetch, shutdown_flag(), &pb);
    pb.finish_and_clear();

    let summary = result.with_context(|| format!("Fetching {} failed", fetch.dataset))?;
    if progress.is_tty() {
        summary.print();
    } else {
        summary.log();
    }

    Ok(match summary.outcome {
        Outcome::Completed => ExitCode::SUCCESS,
        Outcome::Interrupted => {
            log::warn!(
                "Interrupted; rerun with --offset {} to continue",
                summary.next_offset
            );
            ExitCode::from(130)
        }
    })
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        args: FetchArgs,
    }

    fn parse(argv: &[&str]) -> FetchArgs {
        let mut full = vec!["otcfetch"];
        full.extend_from_slice(argv);
        TestCli::parse_from(full).args
    }

    fn base_config() -> Config {
        let mut config = Config::default();
        config.auth.username = Some("env-user".into());
        config.auth.password = Some("env-pass".into());
        config.output.save_folder = Some(PathBuf::from("/srv/finra"));
        config
    }

    #[test]
    fn legacy_underscore_flags_are_accepted() {
        let args = parse(&[
            "--dataset",
            "monthlySummary",
            "--retry_delay_seconds",
            "5",
            "--save_folder",
            "/tmp/out",
            "--save_intervel",
            "10",
            "--token_refresh_interval",
            "120",
        ]);
        assert_eq!(args.retry_delay_seconds, Some(5));
        assert_eq!(args.save_folder, Some(PathBuf::from("/tmp/out")));
        assert_eq!(args.save_interval, Some(10));
        assert_eq!(args.token_refresh_interval, Some(120));
    }

    #[test]
    fn flags_override_config() {
        let mut config = base_config();
        config.fetch.limit = 1000;
        let args = parse(&[
            "--dataset",
            "weeklySummary",
            "--limit",
            "42",
            "--offset",
            "84",
            "--save-folder",
            "/tmp/weekly",
        ]);

        let fetch = resolve(args, &config).unwrap();

        assert_eq!(fetch.dataset, "weeklySummary");
        assert_eq!(fetch.limit, 42);
        assert_eq!(fetch.offset, 84);
        assert_eq!(fetch.credentials.username, "env-user");
        assert_eq!(fetch.save_folder, PathBuf::from("/tmp/weekly"));
    }

    #[test]
    fn config_fills_unset_flags() {
        let mut config = base_config();
        config.fetch.dataset = Some("monthlySummary".into());
        config.fetch.retry_delay_seconds = 7;
        config.fetch.max_page_retries = 0;

        let fetch = resolve(FetchArgs::default(), &config).unwrap();

        assert_eq!(fetch.dataset, "monthlySummary");
        assert_eq!(fetch.retry_delay, Duration::from_secs(7));
        assert_eq!(fetch.max_page_retries, 0);
        assert_eq!(fetch.offset, 0);
        assert_eq!(fetch.save_folder, PathBuf::from("/srv/finra"));
    }

    #[test]
    fn missing_dataset_is_an_error() {
        let err = resolve(FetchArgs::default(), &base_config()).unwrap_err();
        assert!(err.to_string().contains("--dataset"));
    }

    #[test]
    fn missing_save_folder_is_an_error() {
        let mut config = base_config();
        config.output.save_folder = None;
        let args = parse(&["--dataset", "monthlySummary"]);
        let err = resolve(args, &config).unwrap_err();
        assert!(err.to_string().contains("--save-folder"));
    }

    #[test]
    fn missing_password_is_an_error() {
        let mut config = base_config();
        config.auth.password = None;
        let args = parse(&["--dataset", "monthlySummary"]);
        let err = resolve(args, &config).unwrap_err();
        assert!(err.to_string().contains("PASSWORD"));
    }

    #[test]
    fn zero_limit_rejected() {
        let args = parse(&["--dataset", "monthlySummary", "--limit", "0"]);
        assert!(resolve(args, &base_config()).is_err());
    }
}
