use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use rollcall_core::types::parse_timestamp;
use rollcall_core::{summarize, CsvLedger, Ledger, SqliteLedger};
use std::io::BufRead;
use std::path::{Path, PathBuf};

#[zbus::proxy(
    interface = "org.rollcall.Attendance1",
    default_service = "org.rollcall.Attendance1",
    default_path = "/org/rollcall/Attendance1"
)]
trait Attendance {
    async fn evaluate(&self, identity: &str, timestamp: &str) -> zbus::Result<String>;
    async fn records(&self, identity: &str) -> zbus::Result<String>;
    async fn summary(&self, identity: &str) -> zbus::Result<String>;
    async fn status(&self) -> zbus::Result<String>;
}

#[derive(Parser)]
#[command(name = "rollcall", about = "Rollcall attendance CLI")]
struct Cli {
    /// Talk to the daemon on the system bus
    #[arg(long, global = true)]
    system: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Backend {
    Csv,
    Sqlite,
}

#[derive(Subcommand)]
enum Commands {
    /// Report a detection of an identity
    Mark {
        identity: String,
        /// Detection time as "YYYY-MM-DD HH:MM:SS" (default: now)
        #[arg(long)]
        at: Option<String>,
    },
    /// Read one identity per line from stdin and report each detection
    Ingest,
    /// List ledger records
    Records {
        #[arg(short, long)]
        identity: Option<String>,
    },
    /// Classes attended by an identity in the daemon's section
    Summary { identity: String },
    /// Show daemon status
    Status,
    /// Summarize attendance straight from a ledger file, without the daemon
    Report {
        identity: String,
        #[arg(long)]
        ledger: PathBuf,
        #[arg(short, long)]
        section: Option<String>,
        #[arg(long, value_enum, default_value = "csv")]
        backend: Backend,
    },
}

async fn proxy(system: bool) -> Result<AttendanceProxy<'static>> {
    let conn = if system {
        zbus::Connection::system().await
    } else {
        zbus::Connection::session().await
    };
    let conn = conn.context("connecting to D-Bus")?;
    tracing::debug!(system, "connected to D-Bus");
    AttendanceProxy::new(&conn)
        .await
        .context("rollcalld is not reachable")
}

/// Print one outcome line; failures go to stderr, they are lost attendance.
fn print_outcome(reply: &str) -> Result<()> {
    let body: serde_json::Value = serde_json::from_str(reply).context("malformed daemon reply")?;
    let identity = body["identity"].as_str().unwrap_or("?");
    match body["outcome"].as_str() {
        Some("marked") => println!(
            "{identity} marked present at {}",
            body["timestamp"].as_str().unwrap_or("?")
        ),
        Some("skipped") => println!("{identity}: {}", body["label"].as_str().unwrap_or("skipped")),
        _ => eprintln!(
            "!! {identity}: NOT RECORDED ({})",
            body["reason"].as_str().unwrap_or("unknown error")
        ),
    }
    Ok(())
}

fn open_ledger(path: &Path, backend: Backend) -> Result<Box<dyn Ledger>> {
    if !path.exists() {
        bail!("ledger {} does not exist", path.display());
    }
    let ledger: Box<dyn Ledger> = match backend {
        Backend::Csv => Box::new(CsvLedger::new(path)),
        Backend::Sqlite => Box::new(SqliteLedger::open(path)?),
    };
    Ok(ledger)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Mark { identity, at } => {
            if let Some(at) = &at {
                parse_timestamp(at).with_context(|| format!("invalid --at {at:?}"))?;
            }
            let proxy = proxy(cli.system).await?;
            let reply = proxy.evaluate(&identity, at.as_deref().unwrap_or("")).await?;
            print_outcome(&reply)?;
        }
        Commands::Ingest => {
            let proxy = proxy(cli.system).await?;
            for line in std::io::stdin().lock().lines() {
                let line = line.context("reading stdin")?;
                let identity = line.trim();
                if identity.is_empty() {
                    continue;
                }
                let reply = proxy.evaluate(identity, "").await?;
                print_outcome(&reply)?;
            }
        }
        Commands::Records { identity } => {
            let proxy = proxy(cli.system).await?;
            let reply = proxy.records(identity.as_deref().unwrap_or("")).await?;
            let records: serde_json::Value = serde_json::from_str(&reply)?;
            for r in records.as_array().into_iter().flatten() {
                println!(
                    "{}\t{}\t{}",
                    r["identity"].as_str().unwrap_or(""),
                    r["timestamp"].as_str().unwrap_or(""),
                    r["section"].as_str().unwrap_or("")
                );
            }
        }
        Commands::Summary { identity } => {
            let proxy = proxy(cli.system).await?;
            let reply = proxy.summary(&identity).await?;
            let summary: serde_json::Value = serde_json::from_str(&reply)?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Commands::Status => {
            let proxy = proxy(cli.system).await?;
            let status: serde_json::Value = serde_json::from_str(&proxy.status().await?)?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Commands::Report {
            identity,
            ledger,
            section,
            backend,
        } => {
            let records = open_ledger(&ledger, backend)?.load_all()?;
            let summary = summarize(&records, &identity, section.as_deref());
            println!("Total classes attended: {}", summary.total);
            for (i, window) in summary.windows.iter().enumerate() {
                println!("{:>4}  {window}  Present", i + 1);
            }
        }
    }

    Ok(())
}
