//! The fetch loop: token refresh, paging, retry and checkpointing.
//!
//! ```text
//! ACQUIRING_TOKEN ──ok──▶ FETCHING_PAGE ──full page──▶ FETCHING_PAGE
//!        ▲                    │  │  └──short page──▶ DONE
//!        └── stale / 401 ─────┘  └──transport error──▶ CHECKPOINT_AND_WAIT ──▶ FETCHING_PAGE
//! ACQUIRING_TOKEN ──exhausted──▶ ABORTED      other error ──▶ CHECKPOINT_AND_FAIL
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use indicatif::ProgressBar;
use otcfetch_core::fmt_num;
use serde_json::Value;

use crate::api::{OtcApi, PageCursor};
use crate::checkpoint::Checkpointer;
use crate::config::FetchConfig;
use crate::error::FetchError;
use crate::stats::{FetchSummary, Outcome};
use crate::token::{Token, acquire_token};

/// Fetch one dataset from `config.offset` to its last page.
///
/// `shutdown` is polled before every request; when set, pending records are
/// saved and the run returns with [`Outcome::Interrupted`].
pub fn run<A: OtcApi + ?Sized>(
    api: &A,
    config: &FetchConfig,
    shutdown: &AtomicBool,
    pb: &ProgressBar,
) -> Result<FetchSummary, FetchError> {
    config.validate()?;
    std::fs::create_dir_all(&config.save_folder).map_err(|source| FetchError::Io {
        path: config.save_folder.clone(),
        source,
    })?;

    let started = Instant::now();
    log::info!(
        "{}: starting at offset {} (limit {}, save every {} requests)",
        config.dataset_url(),
        config.offset,
        config.limit,
        config.save_interval
    );

    let token = acquire_token(
        api,
        &config.credentials,
        config.max_retries,
        config.retry_delay,
    )?;
    let mut fetch = FetchLoop::new(api, config, pb, token);
    let outcome = fetch.drive(shutdown)?;
    Ok(fetch.into_summary(outcome, started))
}

struct FetchLoop<'a, A: ?Sized> {
    api: &'a A,
    config: &'a FetchConfig,
    pb: &'a ProgressBar,
    token: Token,
    cursor: PageCursor,
    batch: Vec<Value>,
    checkpoints: Checkpointer,
    requests: u64,
    records: usize,
    token_refreshes: u32,
    transport_retries: u32,
}

impl<'a, A: OtcApi + ?Sized> FetchLoop<'a, A> {
    fn new(api: &'a A, config: &'a FetchConfig, pb: &'a ProgressBar, token: Token) -> Self {
        Self {
            api,
            config,
            pb,
            token,
            cursor: PageCursor::new(config.offset, config.limit),
            batch: Vec::new(),
            checkpoints: Checkpointer::new(&config.save_folder, &config.dataset),
            requests: 0,
            records: 0,
            token_refreshes: 0,
            transport_retries: 0,
        }
    }

    fn drive(&mut self, shutdown: &AtomicBool) -> Result<Outcome, FetchError> {
        let config = self.config;
        let dataset = config.dataset.as_str();
        let mut consecutive_failures = 0u32;
        let mut force_refresh = false;

        loop {
            if shutdown.load(Ordering::Relaxed) {
                log::warn!(
                    "{dataset}: shutdown requested at offset {}, saving pending records",
                    self.cursor.offset()
                );
                self.flush_remaining()?;
                return Ok(Outcome::Interrupted);
            }

            if force_refresh || self.token.is_stale(config.token_refresh_interval) {
                self.refresh_token()?;
                force_refresh = false;
            }

            let page = self.cursor.request();
            log::info!("{dataset}: requesting offset {}", page.offset);
            match self.api.fetch_page(&self.token, dataset, page) {
                Ok(records) => {
                    consecutive_failures = 0;
                    if self.accept_page(records)? {
                        break;
                    }
                }
                Err(e) if e.is_transport() => {
                    consecutive_failures += 1;
                    self.transport_retries += 1;
                    force_refresh = e.is_unauthorized();
                    log::warn!("{dataset}: request at offset {} failed: {e}", page.offset);
                    self.checkpoints.save_partial(&self.batch)?;

                    if config.max_page_retries > 0 && consecutive_failures > config.max_page_retries {
                        log::error!(
                            "{dataset}: offset {} failed {consecutive_failures} times in a row, giving up",
                            page.offset
                        );
                        return Err(FetchError::PageRetriesExhausted {
                            offset: page.offset,
                            attempts: consecutive_failures,
                            last: e,
                        });
                    }
                    if force_refresh {
                        log::warn!("{dataset}: token rejected, refreshing before retry");
                    }
                    log::warn!(
                        "{dataset}: waiting {:?} before retrying offset {}",
                        config.retry_delay,
                        page.offset
                    );
                    self.pb
                        .set_message(format!("offset {} · retry {consecutive_failures}", page.offset));
                    std::thread::sleep(config.retry_delay);
                }
                Err(e) => {
                    log::error!("{dataset}: unexpected error at offset {}: {e}", page.offset);
                    if let Err(save_err) = self.checkpoints.save_partial(&self.batch) {
                        log::error!("{dataset}: could not save pending records: {save_err}");
                    }
                    return Err(FetchError::Unexpected {
                        offset: page.offset,
                        source: e,
                    });
                }
            }
        }

        log::info!(
            "{dataset}: download finished after {} requests, saving last batch",
            self.requests
        );
        self.flush_remaining()?;
        Ok(Outcome::Completed)
    }

    /// Record a successful page. Returns `true` when it was the last one.
    fn accept_page(&mut self, records: Vec<Value>) -> Result<bool, FetchError> {
        let count = records.len();
        let last = self.cursor.is_last_page(count);
        self.batch.extend(records);
        self.records += count;
        self.requests += 1;
        self.cursor.advance();

        log::info!(
            "{}: got {} records, total {}",
            self.config.dataset,
            fmt_num(count),
            fmt_num(self.records)
        );
        self.pb.set_message(format!(
            "offset {} · {} records",
            fmt_num(self.cursor.offset() as usize),
            fmt_num(self.records)
        ));

        if self.requests % self.config.save_interval == 0 {
            self.checkpoints.flush(&mut self.batch)?;
        }
        Ok(last)
    }

    /// Replace the token. On failure the pending batch is saved before the
    /// error ends the run.
    fn refresh_token(&mut self) -> Result<(), FetchError> {
        match acquire_token(
            self.api,
            &self.config.credentials,
            self.config.max_retries,
            self.config.retry_delay,
        ) {
            Ok(token) => {
                self.token = token;
                self.token_refreshes += 1;
                Ok(())
            }
            Err(e) => {
                log::error!(
                    "{}: token refresh failed, abandoning dataset: {e}",
                    self.config.dataset
                );
                if let Err(save_err) = self.flush_remaining() {
                    log::error!(
                        "{}: could not save pending records: {save_err}",
                        self.config.dataset
                    );
                }
                Err(e)
            }
        }
    }

    fn flush_remaining(&mut self) -> Result<(), FetchError> {
        self.checkpoints.flush(&mut self.batch).map(|_| ())
    }

    fn into_summary(self, outcome: Outcome, started: Instant) -> FetchSummary {
        FetchSummary {
            dataset: self.config.dataset.clone(),
            start_offset: self.config.offset,
            next_offset: self.cursor.offset(),
            requests: self.requests,
            records: self.records,
            files: self.checkpoints.files().to_vec(),
            token_refreshes: self.token_refreshes,
            transport_retries: self.transport_retries,
            elapsed: started.elapsed(),
            outcome,
        }
    }
}
