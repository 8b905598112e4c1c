//! SQLite-backed ledger.
//!
//! Same append-only contract as the CSV ledger, for installations whose
//! history has grown too large to rescan as text.

use crate::ledger::{validate_field, Ledger, LedgerError};
use crate::types::{format_timestamp, parse_timestamp, AttendanceRecord};
use rusqlite::{params, Connection};
use std::path::Path;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS attendance (
    id        INTEGER PRIMARY KEY AUTOINCREMENT,
    username  TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    section   TEXT NOT NULL DEFAULT ''
)";

pub struct SqliteLedger {
    conn: Connection,
    location: String,
}

impl SqliteLedger {
    /// Open (or create) the ledger database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let path = path.as_ref();
        let location = path.display().to_string();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| LedgerError::Write {
                path: location.clone(),
                source: Box::new(e),
            })?;
        }
        let conn = Connection::open(path).map_err(|e| LedgerError::Corrupt {
            path: location.clone(),
            reason: e.to_string(),
        })?;
        Self::init(conn, location)
    }

    pub fn open_in_memory() -> Result<Self, LedgerError> {
        let conn = Connection::open_in_memory().map_err(|e| LedgerError::Corrupt {
            path: ":memory:".into(),
            reason: e.to_string(),
        })?;
        Self::init(conn, ":memory:".into())
    }

    fn init(conn: Connection, location: String) -> Result<Self, LedgerError> {
        conn.execute_batch(SCHEMA).map_err(|e| LedgerError::Corrupt {
            path: location.clone(),
            reason: format!("schema: {e}"),
        })?;
        tracing::debug!(location = %location, "sqlite ledger ready");
        Ok(Self { conn, location })
    }

    fn corrupt(&self, reason: impl Into<String>) -> LedgerError {
        LedgerError::Corrupt {
            path: self.location.clone(),
            reason: reason.into(),
        }
    }
}

impl Ledger for SqliteLedger {
    fn load_all(&self) -> Result<Vec<AttendanceRecord>, LedgerError> {
        let mut stmt = self
            .conn
            .prepare("SELECT username, timestamp, section FROM attendance ORDER BY id")
            .map_err(|e| self.corrupt(e.to_string()))?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })
            .map_err(|e| self.corrupt(e.to_string()))?;

        let mut records = Vec::new();
        for row in rows {
            let (identity, raw_ts, section) = row.map_err(|e| self.corrupt(e.to_string()))?;
            let timestamp = parse_timestamp(&raw_ts)
                .map_err(|e| self.corrupt(format!("bad timestamp {raw_ts:?}: {e}")))?;
            records.push(AttendanceRecord::new(identity, timestamp, section));
        }
        Ok(records)
    }

    fn append(&mut self, record: &AttendanceRecord) -> Result<(), LedgerError> {
        validate_field("identity", &record.identity)?;
        validate_field("section", &record.section)?;
        self.conn
            .execute(
                "INSERT INTO attendance (username, timestamp, section) VALUES (?1, ?2, ?3)",
                params![
                    record.identity,
                    format_timestamp(&record.timestamp),
                    record.section
                ],
            )
            .map_err(|e| LedgerError::Write {
                path: self.location.clone(),
                source: Box::new(e),
            })?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("sqlite:{}", self.location)
    }
}
