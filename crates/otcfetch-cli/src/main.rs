//! otcfetch - FINRA OTC transparency downloader
//!
//! Pages through one dataset of the FINRA OTCMarket group and writes the
//! records to pipe-delimited CSV part files.

use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use otcfetch_core::shutdown_flag;

mod cmd;
mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "otcfetch")]
#[command(about = "Download FINRA OTC transparency datasets")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Config file path (default: ./otcfetch.toml or ~/.config/otcfetch/config.toml)
    #[arg(short, long, global = true)]
    config: Option<std::path::PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch a dataset into numbered part files
    Fetch(cmd::fetch::FetchArgs),
    /// Show current configuration
    Config,
}

fn main() -> ExitCode {
    // .env must be loaded before logging so RUST_LOG in it takes effect
    let dotenv = dotenvy::dotenv();

    let cli = Cli::parse();

    // Progress context (TTY auto-detect)
    let progress = Arc::new(otcfetch_core::ProgressContext::new());

    // Logging:
    //   TTY:     quiet (warn) unless --debug, the spinner shows activity
    //   non-TTY: info unless --debug
    let is_tty = progress.is_tty();
    let multi = if is_tty { Some(progress.multi()) } else { None };
    let quiet = is_tty && !cli.debug;
    otcfetch_core::init_logging(quiet, cli.debug, multi);

    if let Ok(path) = dotenv {
        log::debug!("Loaded environment from {}", path.display());
    }

    match dispatch(cli, &progress) {
        Ok(code) => code,
        Err(e) => {
            log::error!("Fatal error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn dispatch(cli: Cli, progress: &otcfetch_core::SharedProgress) -> Result<ExitCode> {
    let mut config = if let Some(path) = cli.config {
        Config::from_file(&path)?
    } else {
        Config::load()?
    };
    config.apply_env(|key| std::env::var(key).ok())?;

    match cli.command {
        Command::Fetch(args) => {
            setup_signal_handler()?;
            cmd::fetch::run(args, &config, progress)
        }
        Command::Config => {
            show_config(&config);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn show_config(config: &Config) {
    use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("Setting").fg(Color::Cyan),
            Cell::new("Value").fg(Color::Cyan),
        ]);

    let fetch = &config.fetch;
    table.add_row(vec!["Token URL", &config.api.token_url]);
    table.add_row(vec!["Base URL", &config.api.base_url]);
    table.add_row(vec![
        "Dataset",
        fetch.dataset.as_deref().unwrap_or("not set"),
    ]);
    table.add_row(vec![
        "Username",
        config.auth.username.as_deref().unwrap_or("not set"),
    ]);
    table.add_row(vec![
        "Password",
        if config.auth.password.is_some() {
            "configured"
        } else {
            "not set"
        },
    ]);
    table.add_row(vec![
        "Save folder",
        &config
            .output
            .save_folder
            .as_ref()
            .map_or_else(|| "not set".to_string(), |p| p.display().to_string()),
    ]);
    table.add_row(vec!["Page limit", &fetch.limit.to_string()]);
    table.add_row(vec!["Save interval", &fetch.save_interval.to_string()]);
    table.add_row(vec!["Retry delay", &format!("{}s", fetch.retry_delay_seconds)]);
    table.add_row(vec!["Token retries", &fetch.max_retries.to_string()]);
    table.add_row(vec![
        "Page retries",
        &if fetch.max_page_retries == 0 {
            "unbounded".to_string()
        } else {
            fetch.max_page_retries.to_string()
        },
    ]);
    table.add_row(vec![
        "Token refresh",
        &format!("{}s", fetch.token_refresh_interval),
    ]);

    eprintln!("\n{table}");
}

fn setup_signal_handler() -> Result<()> {
    // First signal: set graceful shutdown flag
    // Second signal: force exit
    // SAFETY: AtomicBool::swap and process::exit are async-signal-safe
    for signal in [signal_hook::consts::SIGTERM, signal_hook::consts::SIGINT] {
        let registered = unsafe {
            signal_hook::low_level::register(signal, || {
                if shutdown_flag().swap(true, Ordering::Relaxed) {
                    std::process::exit(130);
                }
            })
        };
        registered.with_context(|| format!("Failed to register handler for signal {signal}"))?;
    }
    Ok(())
}
