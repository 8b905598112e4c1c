//! rollcall-core — Attendance ledger and marking window policy.
//!
//! Detections of known identities arrive from an external recognizer; the
//! [`MarkingPolicy`] decides whether each one becomes a record in the
//! append-only [`Ledger`].

pub mod ledger;
pub mod policy;
pub mod report;
pub mod sqlite;
pub mod types;
pub mod window;

pub use ledger::{CsvLedger, Ledger, LedgerError};
pub use policy::{MarkError, MarkingPolicy};
pub use report::{summarize, AttendanceSummary};
pub use sqlite::SqliteLedger;
pub use types::{AttendanceRecord, Outcome, SkipReason};
pub use window::{WindowKey, WindowPhase};
