use chrono::NaiveDateTime;
use rollcall_core::window::{phase_of, WindowPhase};
use rollcall_core::{AttendanceRecord, Ledger, LedgerError, MarkingPolicy, Outcome};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum RecorderError {
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),
    #[error("failed to spawn recorder thread: {0}")]
    Spawn(std::io::Error),
    #[error("recorder thread exited")]
    ChannelClosed,
}

/// Snapshot of the recorder's state.
#[derive(Debug, Clone)]
pub struct RecorderStatus {
    pub section: String,
    pub ledger: String,
    pub marked_identities: usize,
    pub now: NaiveDateTime,
    pub phase: WindowPhase,
}

type BoxedLedger = Box<dyn Ledger + Send>;

/// Messages sent from D-Bus handlers to the recorder thread.
enum RecorderRequest {
    Evaluate {
        identity: String,
        at: Option<NaiveDateTime>,
        reply: oneshot::Sender<Outcome>,
    },
    Records {
        reply: oneshot::Sender<Result<Vec<AttendanceRecord>, LedgerError>>,
    },
    Status {
        reply: oneshot::Sender<RecorderStatus>,
    },
}

/// Clone-safe handle to the recorder thread.
#[derive(Clone)]
pub struct RecorderHandle {
    tx: mpsc::Sender<RecorderRequest>,
}

impl RecorderHandle {
    /// Evaluate a detection of `identity` at `at`, or at the local wall clock
    /// when `at` is `None`.
    pub async fn evaluate(
        &self,
        identity: &str,
        at: Option<NaiveDateTime>,
    ) -> Result<Outcome, RecorderError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(RecorderRequest::Evaluate {
                identity: identity.to_string(),
                at,
                reply: reply_tx,
            })
            .await
            .map_err(|_| RecorderError::ChannelClosed)?;
        reply_rx.await.map_err(|_| RecorderError::ChannelClosed)
    }

    /// Full ledger history, oldest first.
    pub async fn records(&self) -> Result<Vec<AttendanceRecord>, RecorderError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(RecorderRequest::Records { reply: reply_tx })
            .await
            .map_err(|_| RecorderError::ChannelClosed)?;
        Ok(reply_rx.await.map_err(|_| RecorderError::ChannelClosed)??)
    }

    pub async fn status(&self) -> Result<RecorderStatus, RecorderError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(RecorderRequest::Status { reply: reply_tx })
            .await
            .map_err(|_| RecorderError::ChannelClosed)?;
        reply_rx.await.map_err(|_| RecorderError::ChannelClosed)
    }
}

/// The caller hung up before the reply arrived. Marks and failures still
/// matter to an operator, so they are logged here instead.
fn report_undelivered(identity: &str, outcome: &Outcome) {
    match outcome {
        Outcome::Failed(err) => tracing::error!(
            identity,
            error = %err,
            "ATTENDANCE LOST: failure could not be reported, caller went away"
        ),
        Outcome::Marked(at) => tracing::warn!(
            identity,
            %at,
            "attendance marked but caller went away before the reply"
        ),
        Outcome::Skipped(_) => {
            tracing::debug!(identity, outcome = outcome.label(), "caller went away")
        }
    }
}

fn local_now() -> NaiveDateTime {
    chrono::Local::now().naive_local()
}

/// Spawn the recorder on a dedicated OS thread.
///
/// Hydrates the marking policy from the ledger before returning, so a corrupt
/// ledger fails startup. All detections are then evaluated one at a time on
/// that thread, which serializes both the index and the ledger appends.
pub fn spawn_recorder(ledger: BoxedLedger, section: String) -> Result<RecorderHandle, RecorderError> {
    let mut policy = MarkingPolicy::new(ledger, section)?;

    let (tx, mut rx) = mpsc::channel::<RecorderRequest>(32);

    std::thread::Builder::new()
        .name("rollcall-recorder".into())
        .spawn(move || {
            tracing::info!("recorder thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    RecorderRequest::Evaluate { identity, at, reply } => {
                        let now = at.unwrap_or_else(local_now);
                        let outcome = policy.evaluate(&identity, now);
                        if let Err(outcome) = reply.send(outcome) {
                            report_undelivered(&identity, &outcome);
                        }
                    }
                    RecorderRequest::Records { reply } => {
                        let _ = reply.send(policy.ledger().load_all());
                    }
                    RecorderRequest::Status { reply } => {
                        let now = local_now();
                        let _ = reply.send(RecorderStatus {
                            section: policy.section().to_string(),
                            ledger: policy.ledger().describe(),
                            marked_identities: policy.marked_count(),
                            now,
                            phase: phase_of(&now),
                        });
                    }
                }
            }
            tracing::info!("recorder thread exiting");
        })
        .map_err(RecorderError::Spawn)?;

    Ok(RecorderHandle { tx })
}
