//! `stockpile`: import ledger server and operator CLI.
//!
//! Reads `stockpile.toml` (or the path given with `--config`), overlaid by
//! `STOCKPILE_*` environment variables, and opens the SQLite store.
//!
//! ```text
//! stockpile                                   # serve the JSON API
//! stockpile ingest --source edc_ppe --file purchases.json
//! stockpile delta <import-id>
//! stockpile promote <import-id>
//! ```

use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use stockpile_core::{
  import::{DataSource, ImportFilter, ImportStatus, Provenance},
  ledger::Ledger,
  record::NewRecord,
};
use stockpile_server::{ServerConfig, expand_tilde, file_checksum};
use stockpile_store_sqlite::SqliteStore;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(author, version, about = "Stockpile import ledger")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "stockpile.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
  /// Serve the JSON API over HTTP. The default.
  Serve,
  /// Create a candidate import from a JSON array of records.
  Ingest {
    #[arg(long)]
    source:      DataSource,
    #[arg(long)]
    file:        PathBuf,
    #[arg(long)]
    uploaded_by: Option<String>,
  },
  /// List imports, newest first.
  List {
    #[arg(long)]
    source: Option<DataSource>,
    #[arg(long)]
    status: Option<ImportStatus>,
  },
  /// Show what a candidate would change.
  Delta { id: Uuid },
  /// Promote a candidate to active.
  Promote { id: Uuid },
  /// Cancel a candidate.
  Cancel { id: Uuid },
  /// Check that no source has more than one active import.
  Sanity,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Logs go to stderr so subcommand output stays machine-readable.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();

  let server_cfg =
    ServerConfig::load(&cli.config).context("failed to load configuration")?;
  let store_path = expand_tilde(&server_cfg.store_path);
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;
  let ledger = Arc::new(Ledger::new(store).with_retention(server_cfg.retention));

  match cli.command.unwrap_or(Command::Serve) {
    Command::Serve => serve(&server_cfg, ledger).await,
    Command::Ingest { source, file, uploaded_by } => {
      let bytes = tokio::fs::read(&file)
        .await
        .with_context(|| format!("failed to read {}", file.display()))?;
      let records: Vec<NewRecord> = serde_json::from_slice(&bytes)
        .with_context(|| format!("{} is not a JSON array of records", file.display()))?;
      let provenance = Provenance {
        uploaded_by,
        file_name: file
          .file_name()
          .map(|n| n.to_string_lossy().into_owned())
          .unwrap_or_default(),
        file_checksum: file_checksum(&bytes),
      };
      let (import, records) = ledger.ingest(source, provenance, records).await?;
      print_json(&json!({ "import": import, "record_count": records.len() }))
    }
    Command::List { source, status } => {
      let filter = ImportFilter { data_source: source, status };
      print_json(&ledger.list_imports(filter).await?)
    }
    Command::Delta { id } => print_json(&ledger.compute_delta(id).await?),
    Command::Promote { id } => print_json(&ledger.promote(id).await?),
    Command::Cancel { id } => print_json(&ledger.cancel(id).await?),
    Command::Sanity => {
      let active_counts = ledger.active_counts().await?;
      let ok = active_counts.values().all(|&n| n <= 1);
      print_json(&json!({ "ok": ok, "active_counts": active_counts }))?;
      anyhow::ensure!(ok, "single-active invariant is violated");
      Ok(())
    }
  }
}

async fn serve(
  server_cfg: &ServerConfig,
  ledger: Arc<Ledger<SqliteStore>>,
) -> anyhow::Result<()> {
  let app = stockpile_server::router(ledger);
  let address = server_cfg.address();

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}
