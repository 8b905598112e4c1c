use crate::recorder::{RecorderError, RecorderHandle};
use chrono::NaiveDateTime;
use rollcall_core::types::{format_timestamp, parse_timestamp};
use rollcall_core::window::WindowKey;
use rollcall_core::{summarize, Outcome};
use zbus::interface;

pub const BUS_NAME: &str = "org.rollcall.Attendance1";
pub const OBJECT_PATH: &str = "/org/rollcall/Attendance1";

/// D-Bus interface for the Rollcall attendance daemon.
///
/// Bus name: org.rollcall.Attendance1
/// Object path: /org/rollcall/Attendance1
pub struct AttendanceService {
    recorder: RecorderHandle,
}

impl AttendanceService {
    pub fn new(recorder: RecorderHandle) -> Self {
        Self { recorder }
    }
}

fn failed(err: RecorderError) -> zbus::fdo::Error {
    zbus::fdo::Error::Failed(err.to_string())
}

/// JSON reply for an evaluated detection, including the label a display
/// sink shows next to the face.
fn outcome_body(identity: &str, outcome: &Outcome) -> serde_json::Value {
    let mut body = outcome.to_json();
    body["identity"] = identity.into();
    body["label"] = outcome.label().into();
    if let Outcome::Marked(at) = outcome {
        body["window"] = WindowKey::of(at).to_string().into();
    }
    body
}

/// Parse the detection time sent by the caller. Empty means now (`None`).
fn detection_time(timestamp: &str) -> zbus::fdo::Result<Option<NaiveDateTime>> {
    if timestamp.trim().is_empty() {
        return Ok(None);
    }
    parse_timestamp(timestamp)
        .map(Some)
        .map_err(|e| zbus::fdo::Error::InvalidArgs(format!("timestamp {timestamp:?}: {e}")))
}

#[interface(name = "org.rollcall.Attendance1")]
impl AttendanceService {
    /// Evaluate one detection. An empty `timestamp` means now.
    async fn evaluate(&self, identity: &str, timestamp: &str) -> zbus::fdo::Result<String> {
        let at = detection_time(timestamp)?;
        let outcome = self.recorder.evaluate(identity, at).await.map_err(failed)?;
        match &outcome {
            Outcome::Failed(err) => tracing::error!(identity, error = %err, "evaluate: failed"),
            other => tracing::info!(identity, outcome = other.label(), "evaluate"),
        }
        Ok(outcome_body(identity, &outcome).to_string())
    }

    /// Ledger records as a JSON array. An empty `identity` returns all.
    async fn records(&self, identity: &str) -> zbus::fdo::Result<String> {
        let wanted = identity.trim();
        let records: Vec<_> = self
            .recorder
            .records()
            .await
            .map_err(failed)?
            .into_iter()
            .filter(|r| wanted.is_empty() || r.identity.eq_ignore_ascii_case(wanted))
            .collect();
        serde_json::to_string(&records).map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
    }

    /// Attendance summary for `identity` within the daemon's section.
    async fn summary(&self, identity: &str) -> zbus::fdo::Result<String> {
        if identity.trim().is_empty() {
            return Err(zbus::fdo::Error::InvalidArgs("identity is required".into()));
        }
        let status = self.recorder.status().await.map_err(failed)?;
        let records = self.recorder.records().await.map_err(failed)?;
        let section = Some(status.section.as_str()).filter(|s| !s.is_empty());
        let summary = summarize(&records, identity, section);
        serde_json::to_string(&summary).map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
    }

    /// Return daemon status information.
    async fn status(&self) -> zbus::fdo::Result<String> {
        let status = self.recorder.status().await.map_err(failed)?;
        Ok(serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "section": status.section,
            "ledger": status.ledger,
            "marked_identities": status.marked_identities,
            "now": format_timestamp(&status.now),
            "window": WindowKey::of(&status.now).to_string(),
            "phase": status.phase.label(),
        })
        .to_string())
    }
}
