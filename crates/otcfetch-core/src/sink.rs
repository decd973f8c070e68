//! Delimited-text sink for JSON records, written atomically (tmp → rename).

use std::borrow::Cow;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};

use rustc_hash::FxHashSet;
use serde_json::Value;

/// Column separator used by the output files.
pub const DEFAULT_DELIMITER: u8 = b'|';

/// Preferred name of the column holding records that are not JSON objects.
const SCALAR_COLUMN: &str = "value";

/// Write buffer size (64KB)
const WRITE_BUF_SIZE: usize = 64 * 1024;

/// Writes a slice of JSON records as a header row plus one row per record.
///
/// Columns are the union of object keys in first-seen order, so a schema
/// that drifts mid-dataset still lands in one table. Missing keys and `null`
/// become empty cells.
#[derive(Debug, Clone, Copy)]
pub struct CsvSink {
    delimiter: u8,
}

impl Default for CsvSink {
    fn default() -> Self {
        Self::new(DEFAULT_DELIMITER)
    }
}

impl CsvSink {
    pub fn new(delimiter: u8) -> Self {
        Self { delimiter }
    }

    /// Write `records` to `path`, replacing any existing file.
    ///
    /// Data goes to `<path>.tmp` first and is renamed into place once fully
    /// flushed, so a crash never leaves a truncated file under the final name.
    /// Returns the number of data rows written.
    pub fn write_records(&self, path: &Path, records: &[Value]) -> io::Result<usize> {
        let tmp_path = tmp_path_for(path);
        let columns = infer_columns(records);

        let file = File::create(&tmp_path)?;
        let mut writer = csv::WriterBuilder::new()
            .delimiter(self.delimiter)
            .from_writer(BufWriter::with_capacity(WRITE_BUF_SIZE, file));

        writer
            .write_record(columns.names.iter().map(String::as_bytes))
            .map_err(io::Error::other)?;
        for record in records {
            let row: Vec<Cow<'_, str>> = (0..columns.names.len())
                .map(|i| columns.cell(record, i))
                .collect();
            writer
                .write_record(row.iter().map(|c| c.as_bytes()))
                .map_err(io::Error::other)?;
        }

        let buf = writer.into_inner().map_err(|e| io::Error::other(e.to_string()))?;
        let file = buf.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        drop(file);

        fs::rename(&tmp_path, path)?;
        log::debug!("wrote {} rows to {}", records.len(), path.display());
        Ok(records.len())
    }
}

/// `<path>.tmp` next to the final file
fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

/// Header layout of one file.
#[derive(Debug)]
pub struct Columns {
    pub names: Vec<String>,
    /// Index of the column for non-object records, if the batch has any
    scalar: Option<usize>,
}

impl Columns {
    fn cell<'a>(&self, record: &'a Value, index: usize) -> Cow<'a, str> {
        let is_scalar = self.scalar == Some(index);
        match record {
            Value::Object(map) if !is_scalar => map
                .get(&self.names[index])
                .map_or(Cow::Borrowed(""), render),
            Value::Object(_) => Cow::Borrowed(""),
            other if is_scalar => render(other),
            _ => Cow::Borrowed(""),
        }
    }
}

/// Union of keys across `records`, in first-seen order.
///
/// Non-object records share one extra column, named `value` unless an object
/// key already uses it (then `value_2`, `value_3`, ...).
pub fn infer_columns(records: &[Value]) -> Columns {
    let keys: FxHashSet<&str> = records
        .iter()
        .filter_map(Value::as_object)
        .flat_map(|map| map.keys().map(String::as_str))
        .collect();

    let mut seen: FxHashSet<&str> = FxHashSet::default();
    let mut names = Vec::new();
    let mut scalar = None;
    for record in records {
        match record {
            Value::Object(map) => {
                for key in map.keys() {
                    if seen.insert(key.as_str()) {
                        names.push(key.clone());
                    }
                }
            }
            _ if scalar.is_none() => {
                scalar = Some(names.len());
                names.push(scalar_column_name(&keys));
            }
            _ => {}
        }
    }
    Columns { names, scalar }
}

fn scalar_column_name(keys: &FxHashSet<&str>) -> String {
    std::iter::once(SCALAR_COLUMN.to_string())
        .chain((2..).map(|n| format!("{SCALAR_COLUMN}_{n}")))
        .find(|name| !keys.contains(name.as_str()))
        .unwrap_or_else(|| SCALAR_COLUMN.to_string())
}

fn render(value: &Value) -> Cow<'_, str> {
    match value {
        Value::Null => Cow::Borrowed(""),
        Value::String(s) => Cow::Borrowed(s.as_str()),
        Value::Bool(b) => Cow::Owned(b.to_string()),
        Value::Number(n) => Cow::Owned(n.to_string()),
        nested => Cow::Owned(nested.to_string()),
    }
}
