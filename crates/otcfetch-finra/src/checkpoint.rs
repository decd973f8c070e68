//! Numbered part files for accumulated records.
//!
//! Part `N` is rewritten by every error-path save until a regular flush
//! writes it for the last time, clears the batch and moves on to `N + 1`.
//! Each record therefore ends up in exactly one part file.

use std::path::{Path, PathBuf};

use otcfetch_core::CsvSink;
use serde_json::Value;

use crate::error::FetchError;

pub struct Checkpointer {
    folder: PathBuf,
    dataset: String,
    sink: CsvSink,
    part: u32,
    written: Vec<PathBuf>,
}

impl Checkpointer {
    pub fn new(folder: impl Into<PathBuf>, dataset: impl Into<String>) -> Self {
        Self {
            folder: folder.into(),
            dataset: dataset.into(),
            sink: CsvSink::default(),
            part: 1,
            written: Vec::new(),
        }
    }

    /// `{folder}/{dataset}_part{N}.csv` for the current part
    pub fn part_path(&self) -> PathBuf {
        self.folder
            .join(format!("{}_part{}.csv", self.dataset, self.part))
    }

    #[cfg(test)]
    fn current_part(&self) -> u32 {
        self.part
    }

    /// Distinct files written so far, in part order
    pub fn files(&self) -> &[PathBuf] {
        &self.written
    }

    /// Write `batch` as the final content of the current part, clear it and
    /// start the next part. Empty batches write nothing.
    pub fn flush(&mut self, batch: &mut Vec<Value>) -> Result<Option<PathBuf>, FetchError> {
        if batch.is_empty() {
            return Ok(None);
        }
        let path = self.write(batch)?;
        log::info!("Saved {} records to {}", batch.len(), path.display());
        batch.clear();
        self.part += 1;
        Ok(Some(path))
    }

    /// Save `batch` into the current part without finishing it, so a crash
    /// during a retry wait loses nothing.
    pub fn save_partial(&mut self, batch: &[Value]) -> Result<Option<PathBuf>, FetchError> {
        if batch.is_empty() {
            return Ok(None);
        }
        let path = self.write(batch)?;
        log::info!(
            "Checkpointed {} pending records to {}",
            batch.len(),
            path.display()
        );
        Ok(Some(path))
    }

    fn write(&mut self, batch: &[Value]) -> Result<PathBuf, FetchError> {
        let path = self.part_path();
        self.sink
            .write_records(&path, batch)
            .map_err(|source| io_error(&path, source))?;
        if self.written.last() != Some(&path) {
            self.written.push(path.clone());
        }
        Ok(path)
    }
}

fn io_error(path: &Path, source: std::io::Error) -> FetchError {
    FetchError::Io {
        path: path.to_path_buf(),
        source,
    }
}
