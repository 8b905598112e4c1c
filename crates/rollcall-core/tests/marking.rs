use chrono::NaiveDateTime;
use rollcall_core::types::parse_timestamp;
use rollcall_core::{
    AttendanceRecord, CsvLedger, Ledger, LedgerError, MarkError, MarkingPolicy, Outcome, SkipReason,
    SqliteLedger,
};
use std::cell::Cell;
use std::fs;
use std::rc::Rc;

fn ts(s: &str) -> NaiveDateTime {
    parse_timestamp(s).unwrap()
}

fn csv_policy(dir: &tempfile::TempDir, section: &str) -> MarkingPolicy<CsvLedger> {
    MarkingPolicy::new(CsvLedger::new(dir.path().join("attendance.csv")), section).unwrap()
}

#[test]
fn test_idempotent_within_window() {
    let dir = tempfile::tempdir().unwrap();
    let mut policy = csv_policy(&dir, "A");
    assert!(policy.evaluate("alice", ts("2024-01-01 09:05:00")).is_marked());
    assert!(matches!(
        policy.evaluate("alice", ts("2024-01-01 09:50:59")),
        Outcome::Skipped(SkipReason::AlreadyMarked { .. })
    ));
    assert_eq!(policy.ledger().load_all().unwrap().len(), 1);
}

#[test]
fn test_window_transition_marks_again() {
    let dir = tempfile::tempdir().unwrap();
    let mut policy = csv_policy(&dir, "A");
    assert!(policy.evaluate("alice", ts("2024-01-01 09:10:00")).is_marked());
    assert!(policy.evaluate("alice", ts("2024-01-01 10:10:00")).is_marked());
    assert_eq!(policy.ledger().load_all().unwrap().len(), 2);
}

#[test]
fn test_closed_subinterval_does_not_write() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("attendance.csv");
    let mut policy = csv_policy(&dir, "A");
    assert!(matches!(
        policy.evaluate("alice", ts("2024-01-01 09:55:00")),
        Outcome::Skipped(SkipReason::WindowClosed)
    ));
    assert!(!path.exists());

    assert!(policy.evaluate("alice", ts("2024-01-01 10:05:00")).is_marked());
    let before = fs::read_to_string(&path).unwrap();
    assert!(matches!(
        policy.evaluate("bob", ts("2024-01-01 10:55:00")),
        Outcome::Skipped(SkipReason::WindowClosed)
    ));
    assert_eq!(fs::read_to_string(&path).unwrap(), before);
}

#[test]
fn test_cold_start_recovery() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("attendance.csv"),
        "Username,Timestamp,Section\nalice,2024-01-01 09:30:00,A\n",
    )
    .unwrap();

    let mut policy = csv_policy(&dir, "A");
    assert!(matches!(
        policy.evaluate("alice", ts("2024-01-01 09:45:00")),
        Outcome::Skipped(SkipReason::AlreadyMarked { .. })
    ));
    assert!(matches!(
        policy.evaluate("alice", ts("2024-01-01 10:05:00")),
        Outcome::Marked(t) if t == ts("2024-01-01 10:05:00")
    ));
}

#[test]
fn test_restart_mid_window_does_not_remark() {
    let dir = tempfile::tempdir().unwrap();
    {
        let mut first = csv_policy(&dir, "A");
        assert!(first.evaluate("dave", ts("2024-01-01 14:02:00")).is_marked());
    }
    let mut second = csv_policy(&dir, "A");
    assert!(!second.evaluate("dave", ts("2024-01-01 14:30:00")).is_marked());
    assert_eq!(second.ledger().load_all().unwrap().len(), 1);
}

#[test]
fn test_append_durability_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("attendance.csv"),
        "Username,Timestamp,Section\nalice,2024-01-01 09:30:00,A\n",
    )
    .unwrap();
    let mut policy = csv_policy(&dir, "B");
    let at = ts("2024-01-01 09:40:00");
    assert!(policy.evaluate("bob", at).is_marked());

    let reread = CsvLedger::new(dir.path().join("attendance.csv")).load_all().unwrap();
    assert_eq!(
        reread,
        vec![
            AttendanceRecord::new("alice", ts("2024-01-01 09:30:00"), "A"),
            AttendanceRecord::new("bob", at, "B"),
        ]
    );
}

#[test]
fn test_unknown_identity_never_appends() {
    let dir = tempfile::tempdir().unwrap();
    let mut policy = csv_policy(&dir, "A");
    let out = policy.evaluate("unknown", ts("2024-01-01 09:10:00"));
    assert!(matches!(out, Outcome::Failed(MarkError::UnknownIdentity(_))));
    assert!(!dir.path().join("attendance.csv").exists());
}

/// CSV ledger whose appends can be made to fail, as on a full disk.
struct FlakyLedger {
    inner: CsvLedger,
    failing: Rc<Cell<bool>>,
}

impl Ledger for FlakyLedger {
    fn load_all(&self) -> Result<Vec<AttendanceRecord>, LedgerError> {
        self.inner.load_all()
    }

    fn append(&mut self, record: &AttendanceRecord) -> Result<(), LedgerError> {
        if self.failing.get() {
            return Err(LedgerError::Write {
                path: self.inner.path().display().to_string(),
                source: Box::new(std::io::Error::other("no space left on device")),
            });
        }
        self.inner.append(record)
    }

    fn describe(&self) -> String {
        self.inner.describe()
    }
}

#[test]
fn test_failure_isolation() {
    let dir = tempfile::tempdir().unwrap();
    let failing = Rc::new(Cell::new(true));
    let ledger = FlakyLedger {
        inner: CsvLedger::new(dir.path().join("attendance.csv")),
        failing: failing.clone(),
    };
    let mut policy = MarkingPolicy::new(ledger, "A").unwrap();

    let out = policy.evaluate("carol", ts("2024-01-01 09:10:00"));
    assert!(matches!(out, Outcome::Failed(MarkError::Ledger(LedgerError::Write { .. }))));
    assert_eq!(policy.last_marked("carol"), None);
    assert!(policy.ledger().load_all().unwrap().is_empty());

    failing.set(false);
    assert!(policy.evaluate("carol", ts("2024-01-01 09:12:00")).is_marked());
    assert_eq!(policy.ledger().load_all().unwrap().len(), 1);
}

#[test]
fn test_unreadable_ledger_is_corrupt_not_missing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("attendance.csv");
    fs::create_dir(&path).unwrap();
    let result = MarkingPolicy::new(CsvLedger::new(&path), "A");
    assert!(matches!(result, Err(LedgerError::Corrupt { .. })));
}

#[test]
fn test_corrupt_ledger_refuses_to_start() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("attendance.csv"), "Username,Timestamp,Section\nalice,noon,A\n").unwrap();
    let result = MarkingPolicy::new(CsvLedger::new(dir.path().join("attendance.csv")), "A");
    assert!(matches!(result, Err(LedgerError::Corrupt { .. })));
}

#[test]
fn test_sqlite_backend_cold_start() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("attendance.db");
    {
        let mut policy = MarkingPolicy::new(SqliteLedger::open(&path).unwrap(), "A").unwrap();
        assert!(policy.evaluate("erin", ts("2024-05-05 08:10:00")).is_marked());
    }
    let mut policy = MarkingPolicy::new(SqliteLedger::open(&path).unwrap(), "A").unwrap();
    assert!(!policy.evaluate("erin", ts("2024-05-05 08:49:00")).is_marked());
    assert!(policy.evaluate("erin", ts("2024-05-05 09:00:00")).is_marked());
}

#[test]
fn test_padded_identity_is_refused_and_round_trip_stays_exact() {
    let dir = tempfile::tempdir().unwrap();
    {
        let mut policy = csv_policy(&dir, "A");
        assert!(matches!(
            policy.evaluate("alice ", ts("2024-01-01 09:10:00")),
            Outcome::Failed(MarkError::Ledger(LedgerError::InvalidField { .. }))
        ));
        assert_eq!(policy.last_marked("alice "), None);
        assert!(policy.evaluate("alice", ts("2024-01-01 09:10:00")).is_marked());
    }

    let mut policy = csv_policy(&dir, "A");
    assert!(!policy.evaluate("alice", ts("2024-01-01 09:20:00")).is_marked());
    assert_eq!(
        policy.ledger().load_all().unwrap(),
        vec![AttendanceRecord::new("alice", ts("2024-01-01 09:10:00"), "A")]
    );
}

#[test]
fn test_padded_section_is_refused_on_sqlite() {
    let mut policy = MarkingPolicy::new(SqliteLedger::open_in_memory().unwrap(), "B ").unwrap();
    assert!(matches!(
        policy.evaluate("bob", ts("2024-01-01 09:10:00")),
        Outcome::Failed(MarkError::Ledger(LedgerError::InvalidField { field: "section", .. }))
    ));
    assert_eq!(policy.last_marked("bob"), None);
    assert!(policy.ledger().load_all().unwrap().is_empty());
}
