//! Marking window policy.
//!
//! Decides whether a detection becomes an attendance record: at most one
//! record per identity per window, and none while the window is closed.
//! Keeps an in-memory index of each identity's latest mark, hydrated from the
//! ledger on construction. The ledger stays authoritative; the index is a
//! cache rebuilt on every start.

use crate::ledger::{Ledger, LedgerError};
use crate::types::{is_unresolved, AttendanceRecord, Outcome, SkipReason};
use crate::window::{phase_of, same_window, WindowPhase};
use chrono::{NaiveDateTime, SubsecRound};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MarkError {
    #[error("unresolved identity {0:?} cannot be marked")]
    UnknownIdentity(String),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

pub struct MarkingPolicy<L> {
    ledger: L,
    section: String,
    last_marked: HashMap<String, NaiveDateTime>,
}

impl<L: Ledger> MarkingPolicy<L> {
    /// Build a policy over `ledger`, tagging every record with `section`.
    ///
    /// Reads the full ledger once; fails if it exists but cannot be parsed.
    pub fn new(ledger: L, section: impl Into<String>) -> Result<Self, LedgerError> {
        let records = ledger.load_all()?;
        let total = records.len();
        let mut last_marked: HashMap<String, NaiveDateTime> = HashMap::new();
        for record in records {
            let ts = record.timestamp;
            match last_marked.entry(record.identity) {
                Entry::Occupied(mut e) => {
                    if ts > *e.get() {
                        e.insert(ts);
                    }
                }
                Entry::Vacant(e) => {
                    e.insert(ts);
                }
            }
        }

        let section = section.into();
        tracing::info!(
            ledger = %ledger.describe(),
            records = total,
            identities = last_marked.len(),
            section = %section,
            "marking policy hydrated"
        );

        Ok(Self {
            ledger,
            section,
            last_marked,
        })
    }

    /// Evaluate one detection of `identity` at `now`.
    ///
    /// `now` is truncated to whole seconds. A `Skipped` outcome has no side
    /// effects. On `Failed` the index is untouched, so the next detection in
    /// the same window is evaluated as if this one never happened.
    pub fn evaluate(&mut self, identity: &str, now: NaiveDateTime) -> Outcome {
        let now = now.trunc_subsecs(0);

        if is_unresolved(identity) {
            tracing::warn!(identity, "rejecting unresolved identity");
            return Outcome::Failed(MarkError::UnknownIdentity(identity.to_string()));
        }

        if phase_of(&now) == WindowPhase::Closed {
            tracing::debug!(identity, %now, "window closed; detection ignored");
            return Outcome::Skipped(SkipReason::WindowClosed);
        }

        if let Some(last) = self.last_marked.get(identity) {
            if same_window(last, &now) {
                tracing::debug!(identity, %now, last_marked = %last, "already marked in this window");
                return Outcome::Skipped(SkipReason::AlreadyMarked { at: *last });
            }
        }

        let record = AttendanceRecord::new(identity, now, self.section.as_str());
        match self.ledger.append(&record) {
            Ok(()) => {
                // Never move the index backwards, even if the clock did.
                let entry = self.last_marked.entry(identity.to_string()).or_insert(now);
                if now > *entry {
                    *entry = now;
                }
                tracing::info!(identity, %now, section = %self.section, "attendance marked");
                Outcome::Marked(now)
            }
            Err(e) => {
                tracing::error!(identity, %now, error = %e, "ATTENDANCE LOST: ledger append failed");
                Outcome::Failed(MarkError::Ledger(e))
            }
        }
    }

    /// Latest mark known for `identity` in this process.
    pub fn last_marked(&self, identity: &str) -> Option<NaiveDateTime> {
        self.last_marked.get(identity).copied()
    }

    /// Number of distinct identities with at least one mark.
    pub fn marked_count(&self) -> usize {
        self.last_marked.len()
    }

    pub fn section(&self) -> &str {
        &self.section
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }
}
