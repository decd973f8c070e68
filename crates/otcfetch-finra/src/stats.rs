//! Run summary and its TTY / log rendering

use std::path::PathBuf;
use std::time::Duration;

use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use otcfetch_core::fmt_num;

/// How a run that did not error ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// A short page was received
    Completed,
    /// Shutdown was requested; progress saved
    Interrupted,
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
        })
    }
}

#[derive(Debug, Clone)]
pub struct FetchSummary {
    pub dataset: String,
    pub start_offset: u64,
    /// Offset the next request would have used
    pub next_offset: u64,
    /// Successful page requests
    pub requests: u64,
    pub records: usize,
    pub files: Vec<PathBuf>,
    /// Refreshes after the initial token
    pub token_refreshes: u32,
    /// Failed page requests that were retried
    pub transport_retries: u32,
    pub elapsed: Duration,
    pub outcome: Outcome,
}

impl FetchSummary {
    fn rows(&self) -> Vec<(&'static str, String)> {
        vec![
            ("Outcome", self.outcome.to_string()),
            (
                "Offsets",
                format!("{} → {}", fmt_num(self.start_offset as usize), fmt_num(self.next_offset as usize)),
            ),
            ("Requests", fmt_num(self.requests as usize)),
            ("Records", fmt_num(self.records)),
            ("Files", self.files.len().to_string()),
            ("Token refreshes", self.token_refreshes.to_string()),
            ("Retries", self.transport_retries.to_string()),
            ("Elapsed", format!("{:.1}s", self.elapsed.as_secs_f64())),
        ]
    }

    /// Print a table on stderr (TTY mode)
    pub fn print(&self) {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS)
            .set_header(vec![
                Cell::new(&self.dataset).fg(Color::Cyan),
                Cell::new("Value").fg(Color::Cyan),
            ]);
        for (label, value) in self.rows() {
            table.add_row(vec![Cell::new(label), Cell::new(value)]);
        }
        eprintln!("\n{table}");
    }

    /// Log a one-line summary (non-TTY mode)
    pub fn log(&self) {
        log::info!(
            "{}: {} - {} records in {} requests, {} files, {} token refreshes, {} retries [{:.1}s]",
            self.dataset,
            self.outcome,
            fmt_num(self.records),
            fmt_num(self.requests as usize),
            self.files.len(),
            self.token_refreshes,
            self.transport_retries,
            self.elapsed.as_secs_f64()
        );
        for file in &self.files {
            log::info!("  {}", file.display());
        }
    }
}
