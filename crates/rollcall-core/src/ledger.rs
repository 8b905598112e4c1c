//! Durable, append-only attendance ledger.
//!
//! The default backend is a CSV file whose first line names the columns
//! `Username,Timestamp,Section`. Records are only ever appended; nothing in
//! this crate rewrites or truncates an existing ledger.

use crate::types::{format_timestamp, parse_timestamp, AttendanceRecord};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const HEADER: [&str; 3] = ["Username", "Timestamp", "Section"];

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("ledger {path} is corrupt: {reason}")]
    Corrupt { path: String, reason: String },
    #[error("failed to append to ledger {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("{field} {value:?} cannot be stored in the ledger")]
    InvalidField { field: &'static str, value: String },
}

/// Storage for attendance records.
pub trait Ledger {
    /// Read every record, oldest first. A ledger that does not exist yet is
    /// empty history, not an error.
    fn load_all(&self) -> Result<Vec<AttendanceRecord>, LedgerError>;

    /// Durably append one record, creating the ledger if needed.
    fn append(&mut self, record: &AttendanceRecord) -> Result<(), LedgerError>;

    /// Human-readable location, for status output.
    fn describe(&self) -> String;
}

impl<L: Ledger + ?Sized> Ledger for Box<L> {
    fn load_all(&self) -> Result<Vec<AttendanceRecord>, LedgerError> {
        (**self).load_all()
    }

    fn append(&mut self, record: &AttendanceRecord) -> Result<(), LedgerError> {
        (**self).append(record)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// Reject values that would break the one-record-per-line layout or would
/// not read back byte-for-byte (fields are trimmed on load).
pub fn validate_field(field: &'static str, value: &str) -> Result<(), LedgerError> {
    if value.contains([',', '"', '\n', '\r']) || value.trim() != value {
        return Err(LedgerError::InvalidField {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}

/// CSV-file ledger.
pub struct CsvLedger {
    path: PathBuf,
}

impl CsvLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn display_path(&self) -> String {
        self.path.display().to_string()
    }

    fn corrupt(&self, reason: impl Into<String>) -> LedgerError {
        LedgerError::Corrupt {
            path: self.display_path(),
            reason: reason.into(),
        }
    }

    fn write_err(&self, source: io::Error) -> LedgerError {
        LedgerError::Write {
            path: self.display_path(),
            source: Box::new(source),
        }
    }

    fn parse(&self, contents: &str) -> Result<Vec<AttendanceRecord>, LedgerError> {
        let mut records = Vec::new();
        // Column count declared by the header; `None` until it has been seen.
        let mut columns: Option<usize> = None;

        for (idx, raw) in contents.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw.trim_start_matches('\u{feff}').trim_end_matches('\r');
            if line.trim().is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split(',').map(str::trim).collect();

            let Some(expected) = columns else {
                columns = Some(parse_header(&fields).ok_or_else(|| {
                    self.corrupt(format!("line {line_no}: expected header, found {line:?}"))
                })?);
                continue;
            };

            // Legacy two-column ledgers may carry newer three-field rows.
            let accepted = fields.len() == expected || (expected == 2 && fields.len() == 3);
            if !accepted {
                return Err(self.corrupt(format!(
                    "line {line_no}: expected {expected} fields, found {}",
                    fields.len()
                )));
            }
            if fields[0].is_empty() {
                return Err(self.corrupt(format!("line {line_no}: empty username")));
            }
            let timestamp = parse_timestamp(fields[1]).map_err(|e| {
                self.corrupt(format!("line {line_no}: bad timestamp {:?}: {e}", fields[1]))
            })?;
            let section = fields.get(2).copied().unwrap_or_default();
            records.push(AttendanceRecord::new(fields[0], timestamp, section));
        }

        Ok(records)
    }
}

/// Returns the column count for a recognised header.
fn parse_header(fields: &[&str]) -> Option<usize> {
    let is_header = |n: usize| {
        fields.len() == n
            && fields
                .iter()
                .zip(HEADER.iter())
                .all(|(a, b)| a.eq_ignore_ascii_case(b))
    };
    if is_header(3) {
        Some(3)
    } else if is_header(2) {
        Some(2)
    } else {
        None
    }
}

/// True if the file holds anything besides whitespace and a byte-order mark,
/// i.e. whether a header line has already been written.
fn has_content(file: &mut File) -> io::Result<bool> {
    const BOM: &[u8] = "\u{feff}".as_bytes();
    file.seek(SeekFrom::Start(0))?;
    let mut buf = [0u8; 4096];
    let mut first = true;
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            return Ok(false);
        }
        let mut chunk = &buf[..n];
        if first {
            chunk = chunk.strip_prefix(BOM).unwrap_or(chunk);
            first = false;
        }
        if chunk.iter().any(|b| !b.is_ascii_whitespace()) {
            return Ok(true);
        }
    }
}

/// True if the file has content that does not end in a newline.
fn needs_leading_newline(file: &mut File, len: u64) -> io::Result<bool> {
    if len == 0 {
        return Ok(false);
    }
    file.seek(SeekFrom::Start(len - 1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}

impl Ledger for CsvLedger {
    fn load_all(&self) -> Result<Vec<AttendanceRecord>, LedgerError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "ledger absent; starting with empty history");
                return Ok(Vec::new());
            }
            Err(e) => return Err(self.corrupt(format!("unreadable: {e}"))),
        };
        let records = self.parse(&contents)?;
        tracing::debug!(path = %self.path.display(), count = records.len(), "ledger loaded");
        Ok(records)
    }

    fn append(&mut self, record: &AttendanceRecord) -> Result<(), LedgerError> {
        validate_field("identity", &record.identity)?;
        validate_field("section", &record.section)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.write_err(e))?;
        }

        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&self.path)
            .map_err(|e| self.write_err(e))?;
        let len = file.metadata().map_err(|e| self.write_err(e))?.len();

        let mut buf = String::new();
        if needs_leading_newline(&mut file, len).map_err(|e| self.write_err(e))? {
            buf.push('\n');
        }
        // Blank or BOM-only files load as empty history, so they still need a header.
        if !has_content(&mut file).map_err(|e| self.write_err(e))? {
            buf.push_str(&HEADER.join(","));
            buf.push('\n');
        }
        buf.push_str(&format!(
            "{},{},{}\n",
            record.identity,
            format_timestamp(&record.timestamp),
            record.section
        ));

        file.write_all(buf.as_bytes()).map_err(|e| self.write_err(e))?;
        file.sync_all().map_err(|e| self.write_err(e))?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("csv:{}", self.path.display())
    }
}
