//! JSON Lines record source and sink
//!
//! Each non-blank line is one JSON object. The configured text column becomes
//! [`Record::text`]; every other column is carried through as auxiliary data
//! and written back unchanged, alongside `_original_index` (and `_chunk_seq`
//! for chunked output).

use serde_json::{Map, Value};
use sifter_core::{
    input_fingerprint, write_atomically, Fingerprint, Record, RecordSink, RecordSource,
    RecordStream, RetryConfig, SifterError, SifterResult, SourceSizeHint,
};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Columns tried, in order, when no text column is configured
pub const PREFERRED_TEXT_COLUMNS: [&str; 3] = ["text", "content", "body"];

/// Column holding the input row index in the output
pub const ORIGINAL_INDEX_COLUMN: &str = "_original_index";

/// Column holding the chunk sequence number in chunked output
pub const CHUNK_SEQ_COLUMN: &str = "_chunk_seq";

/// Lazy JSONL reader.
///
/// Only the first row is read when the source is created (to resolve the
/// text column). Every [`open`](RecordSource::open) streams the file again
/// from the start.
#[derive(Debug, Clone)]
pub struct JsonlSource {
    path: PathBuf,
    text_column: String,
    total_bytes: Option<u64>,
}

impl JsonlSource {
    /// Open `path`, using `text_column` or auto-detecting one.
    ///
    /// A configured text column or any of `required_columns` missing from the
    /// first row is a validation error. An empty file is accepted here; the
    /// pipeline rejects it.
    pub fn new(
        path: impl Into<PathBuf>,
        text_column: Option<&str>,
        required_columns: &[String],
    ) -> SifterResult<Self> {
        let path = path.into();
        let total_bytes = std::fs::metadata(&path)
            .map_err(|e| {
                SifterError::validation(format!("cannot read input {}: {e}", path.display()))
                    .with_hint("check the --input path")
            })?
            .len();

        let first = first_row(&path)?;
        if let Some(row) = &first {
            check_required(row, required_columns)?;
        }
        let text_column = match (text_column, first) {
            (Some(column), Some(row)) => {
                if !row.contains_key(column) {
                    return Err(missing_column(column, &row));
                }
                column.to_string()
            }
            (Some(column), None) => column.to_string(),
            (None, Some(row)) => detect_text_column(&row).ok_or_else(|| {
                SifterError::validation("no string column found to deduplicate")
                    .with_hint("pass --text-column explicitly")
            })?,
            (None, None) => PREFERRED_TEXT_COLUMNS[0].to_string(),
        };

        info!(path = %path.display(), column = %text_column, "opened JSONL input");
        Ok(Self {
            path,
            text_column,
            total_bytes: Some(total_bytes),
        })
    }

    /// Column whose values are deduplicated
    pub fn text_column(&self) -> &str {
        &self.text_column
    }

    /// Input path
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RecordSource for JsonlSource {
    fn open(&self) -> SifterResult<RecordStream<'_>> {
        let file = File::open(&self.path).map_err(|e| {
            SifterError::validation(format!("cannot open input {}: {e}", self.path.display()))
        })?;
        let column = self.text_column.clone();
        let rows = BufReader::new(file)
            .lines()
            .enumerate()
            .filter(|(_, line)| line.as_ref().map_or(true, |l| !l.trim().is_empty()))
            .enumerate()
            .map(move |(index, (line_no, line))| {
                let line = line.map_err(|e| {
                    SifterError::resource("ingest", format!("failed to read input: {e}"))
                })?;
                parse_row(index as u64, line_no + 1, &line, &column)
            });
        Ok(Box::new(rows))
    }

    fn fingerprint(&self) -> SifterResult<Fingerprint> {
        input_fingerprint(&self.path)
    }

    fn size_hint(&self) -> SourceSizeHint {
        SourceSizeHint {
            rows: None,
            total_bytes: self.total_bytes,
        }
    }

    fn describe(&self) -> String {
        format!("{} (column `{}`)", self.path.display(), self.text_column)
    }
}

fn first_row(path: &Path) -> SifterResult<Option<Map<String, Value>>> {
    let file = File::open(path).map_err(|e| {
        SifterError::validation(format!("cannot open input {}: {e}", path.display()))
    })?;
    for (line_no, line) in BufReader::new(file).lines().enumerate() {
        let line = line
            .map_err(|e| SifterError::resource("ingest", format!("failed to read input: {e}")))?;
        if line.trim().is_empty() {
            continue;
        }
        return parse_object(line_no + 1, &line).map(Some);
    }
    Ok(None)
}

fn parse_object(line_no: usize, line: &str) -> SifterResult<Map<String, Value>> {
    match serde_json::from_str::<Value>(line) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(SifterError::validation(format!(
            "line {line_no}: expected a JSON object"
        ))),
        Err(e) => Err(SifterError::validation(format!(
            "line {line_no}: invalid JSON: {e}"
        ))),
    }
}

fn parse_row(index: u64, line_no: usize, line: &str, column: &str) -> SifterResult<Record> {
    let mut row = parse_object(line_no, line)?;
    let text = match row.remove(column) {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(text)) => text,
        Some(other) => other.to_string(),
    };
    let auxiliary: BTreeMap<String, Value> = row.into_iter().collect();
    Ok(Record::new(index, text).with_auxiliary(auxiliary))
}

/// Preferred column names first, then the first column holding a string
pub fn detect_text_column(row: &Map<String, Value>) -> Option<String> {
    PREFERRED_TEXT_COLUMNS
        .iter()
        .find(|name| row.contains_key(**name))
        .map(|name| name.to_string())
        .or_else(|| {
            row.iter()
                .find(|(_, value)| value.is_string())
                .map(|(name, _)| name.clone())
        })
}

fn missing_column(column: &str, row: &Map<String, Value>) -> SifterError {
    let available: Vec<&str> = row.keys().map(String::as_str).collect();
    SifterError::validation(format!(
        "text column `{column}` not found; available columns: {}",
        available.join(", ")
    ))
    .with_hint("pass the right --text-column or omit it to auto-detect")
}

fn check_required(row: &Map<String, Value>, required: &[String]) -> SifterResult<()> {
    let missing: Vec<&str> = required
        .iter()
        .map(String::as_str)
        .filter(|column| !row.contains_key(*column))
        .collect();
    if missing.is_empty() {
        return Ok(());
    }
    Err(SifterError::validation(format!(
        "missing required columns: {}",
        missing.join(", ")
    ))
    .with_hint("check the input schema or --required-columns"))
}

/// Atomic JSONL writer for the survivors
#[derive(Debug)]
pub struct JsonlSink {
    path: PathBuf,
    text_column: String,
    retry: RetryConfig,
}

impl JsonlSink {
    /// Write to `path`, putting the text back under `text_column`
    pub fn new(path: impl Into<PathBuf>, text_column: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            text_column: text_column.into(),
            retry: RetryConfig::default(),
        }
    }

    fn row(&self, record: &Record) -> Value {
        let mut row: Map<String, Value> = record
            .auxiliary
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        row.insert(self.text_column.clone(), Value::String(record.text.clone()));
        row.insert(
            ORIGINAL_INDEX_COLUMN.to_string(),
            Value::from(record.original_index()),
        );
        if let Some(seq) = record.id.chunk_seq {
            row.insert(CHUNK_SEQ_COLUMN.to_string(), Value::from(seq));
        }
        Value::Object(row)
    }
}

impl RecordSink for JsonlSink {
    fn write_all(&mut self, records: &[Record]) -> SifterResult<()> {
        write_atomically(&self.path, "output", &self.retry, |out: &mut dyn Write| {
            for record in records {
                serde_json::to_writer(&mut *out, &self.row(record))?;
                out.write_all(b"\n")?;
            }
            Ok(())
        })?;
        debug!(path = %self.path.display(), rows = records.len(), "wrote output");
        Ok(())
    }
}
