use chrono::{NaiveDateTime, SubsecRound};
use serde::{Deserialize, Serialize};

use crate::policy::MarkError;

/// Wall-clock format used for every persisted timestamp (naive local time).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Label the recognizer uses for a face it could not resolve.
pub const UNKNOWN_IDENTITY: &str = "unknown";

/// One presence event in the ledger. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub identity: String,
    #[serde(with = "timestamp_serde")]
    pub timestamp: NaiveDateTime,
    /// Session/cohort tag; never consulted when deciding eligibility.
    pub section: String,
}

impl AttendanceRecord {
    pub fn new(identity: impl Into<String>, timestamp: NaiveDateTime, section: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            timestamp: timestamp.trunc_subsecs(0),
            section: section.into(),
        }
    }
}

/// Format a timestamp the way the ledger stores it.
pub fn format_timestamp(t: &NaiveDateTime) -> String {
    t.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a ledger timestamp. Surrounding whitespace is ignored.
pub fn parse_timestamp(s: &str) -> Result<NaiveDateTime, chrono::ParseError> {
    NaiveDateTime::parse_from_str(s.trim(), TIMESTAMP_FORMAT)
}

/// True for identities the recognizer failed to resolve.
pub fn is_unresolved(identity: &str) -> bool {
    let trimmed = identity.trim();
    trimmed.is_empty() || trimmed.eq_ignore_ascii_case(UNKNOWN_IDENTITY)
}

/// Why a detection produced no record. Not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Detection landed in the closed tail of its window.
    WindowClosed,
    /// The identity already has a record in this window.
    AlreadyMarked { at: NaiveDateTime },
}

/// Result of evaluating one detection.
#[derive(Debug)]
pub enum Outcome {
    Marked(NaiveDateTime),
    Skipped(SkipReason),
    Failed(MarkError),
}

impl Outcome {
    pub fn is_marked(&self) -> bool {
        matches!(self, Outcome::Marked(_))
    }

    /// Short status label for display sinks and logs.
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Marked(_) => "marked",
            Outcome::Skipped(SkipReason::WindowClosed) => "window closed",
            Outcome::Skipped(SkipReason::AlreadyMarked { .. }) => "already marked",
            Outcome::Failed(_) => "failed",
        }
    }

    /// JSON shape exposed over IPC.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Outcome::Marked(at) => serde_json::json!({
                "outcome": "marked",
                "timestamp": format_timestamp(at),
            }),
            Outcome::Skipped(SkipReason::WindowClosed) => serde_json::json!({
                "outcome": "skipped",
                "reason": "window_closed",
            }),
            Outcome::Skipped(SkipReason::AlreadyMarked { at }) => serde_json::json!({
                "outcome": "skipped",
                "reason": "already_marked",
                "last_marked": format_timestamp(at),
            }),
            Outcome::Failed(err) => serde_json::json!({
                "outcome": "failed",
                "reason": err.to_string(),
            }),
        }
    }
}

/// Serde adapter keeping JSON timestamps in the ledger format.
pub mod timestamp_serde {
    use super::{format_timestamp, parse_timestamp};
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(t: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&format_timestamp(t))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(d)?;
        parse_timestamp(&raw).map_err(serde::de::Error::custom)
    }
}
