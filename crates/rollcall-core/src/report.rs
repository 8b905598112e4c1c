//! Attendance summaries over ledger history.
//!
//! A class attended is a distinct window in which the identity has at least
//! one record, so repeated marks in one hour (from restarts on older ledgers
//! or other sections) count once.

use crate::types::AttendanceRecord;
use crate::window::WindowKey;
use serde::Serialize;
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttendanceSummary {
    pub identity: String,
    pub section: Option<String>,
    /// Windows attended, in ledger order.
    pub windows: Vec<WindowKey>,
    pub total: usize,
}

/// Summarize `identity`'s attendance, optionally restricted to one section.
///
/// Identity and section compare trimmed and case-insensitively.
pub fn summarize(records: &[AttendanceRecord], identity: &str, section: Option<&str>) -> AttendanceSummary {
    let wanted = identity.trim();
    let wanted_section = section.map(str::trim);

    let mut seen = HashSet::new();
    let windows: Vec<WindowKey> = records
        .iter()
        .filter(|r| r.identity.trim().eq_ignore_ascii_case(wanted))
        .filter(|r| wanted_section.map_or(true, |s| r.section.trim().eq_ignore_ascii_case(s)))
        .map(|r| WindowKey::of(&r.timestamp))
        .filter(|key| seen.insert(*key))
        .collect();

    AttendanceSummary {
        identity: wanted.to_string(),
        section: wanted_section.map(str::to_string),
        total: windows.len(),
        windows,
    }
}
