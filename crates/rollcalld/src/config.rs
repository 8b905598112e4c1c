use rollcall_core::{CsvLedger, Ledger, LedgerError, SqliteLedger};
use std::path::PathBuf;

/// Storage backend for the attendance ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Backend {
    Csv,
    Sqlite,
}

impl Backend {
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Some(Backend::Csv),
            "sqlite" | "sqlite3" => Some(Backend::Sqlite),
            _ => None,
        }
    }

    fn default_file_name(self) -> &'static str {
        match self {
            Backend::Csv => "attendance.csv",
            Backend::Sqlite => "attendance.db",
        }
    }
}

/// Which message bus to claim the service name on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bus {
    Session,
    System,
}

/// Daemon configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the ledger file.
    pub ledger_path: PathBuf,
    /// Ledger storage backend (default: csv).
    pub backend: Backend,
    /// Section tag attached to every record written during this run.
    pub section: String,
    /// Bus the D-Bus service is published on (default: session).
    pub bus: Bus,
}

impl Config {
    /// Load configuration from `ROLLCALL_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let backend = var("ROLLCALL_BACKEND")
            .and_then(|v| Backend::parse(&v))
            .unwrap_or(Backend::Csv);

        let data_dir = var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                let home = var("HOME").unwrap_or_else(|| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("rollcall");

        let ledger_path = var("ROLLCALL_LEDGER_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join(backend.default_file_name()));

        let bus = match var("ROLLCALL_BUS").as_deref().map(str::trim) {
            Some("system") => Bus::System,
            _ => Bus::Session,
        };

        Self {
            ledger_path,
            backend,
            section: var("ROLLCALL_SECTION").unwrap_or_default(),
            bus,
        }
    }

    /// Open the configured ledger.
    pub fn open_ledger(&self) -> Result<Box<dyn Ledger + Send>, LedgerError> {
        let ledger: Box<dyn Ledger + Send> = match self.backend {
            Backend::Csv => Box::new(CsvLedger::new(&self.ledger_path)),
            Backend::Sqlite => Box::new(SqliteLedger::open(&self.ledger_path)?),
        };
        Ok(ledger)
    }
}
