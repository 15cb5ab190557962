//! `secmaster` binary.
//!
//! Reads `secmaster.toml` (or the path given with `--config`), opens the
//! SQLite event log, and runs one of:
//!
//! - `sync`: fetch the EDGAR listing feed, reconcile it, refresh derived
//!   facts, then write the CSV report
//! - `export`: write the CSV report from what is already stored
//! - `history <CIK>`: print one entity's events, oldest first
//! - `serve`: expose the read-only JSON API

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use secmaster_core::{
  entity::EntityId,
  projection::current_views,
  reconcile::Reconciler,
  store::EventLog,
};
use secmaster_store_sqlite::SqliteStore;
use secmaster_sync::{SyncConfig, edgar::EdgarClient, export};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Incremental securities master over SEC EDGAR")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "secmaster.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Run one reconciliation cycle against EDGAR.
  Sync {
    /// Only reconcile listings; keep previously derived facts.
    #[arg(long)]
    skip_refresh: bool,
    /// Do not write the CSV report afterwards.
    #[arg(long)]
    no_export: bool,
  },
  /// Write the current state to CSV.
  Export {
    /// Output path; defaults to `csv_output` from the config.
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Include delisted entities.
    #[arg(long)]
    include_inactive: bool,
  },
  /// Print every event recorded for one entity.
  History {
    /// SEC Central Index Key, with or without leading zeros.
    cik: u64,
  },
  /// Serve the JSON API.
  Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  // Load configuration.
  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("SECMASTER"))
    .build()
    .context("failed to read config file")?;

  let cfg: SyncConfig = settings
    .try_deserialize()
    .context("failed to deserialise SyncConfig")?;

  let store_path = cfg.store_path();
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  match cli.command {
    Command::Sync { skip_refresh, no_export } => {
      sync(&cfg, store.clone(), skip_refresh).await?;
      if !no_export {
        export_csv(&cfg, &store, &cfg.csv_output(), false).await?;
      }
    }
    Command::Export { output, include_inactive } => {
      let path = output.unwrap_or_else(|| cfg.csv_output());
      export_csv(&cfg, &store, &path, include_inactive).await?;
    }
    Command::History { cik } => history(&cfg, &store, EntityId(cik)).await?,
    Command::Serve => serve(&cfg, store).await?,
  }

  Ok(())
}

async fn sync(cfg: &SyncConfig, store: SqliteStore, skip_refresh: bool) -> anyhow::Result<()> {
  if cfg.user_agent.trim().is_empty() {
    anyhow::bail!("user_agent must be set; SEC rejects requests without a contact address");
  }

  let waterfall = cfg.waterfall().context("invalid revenue_waterfall")?;
  let client = EdgarClient::new(cfg.edgar()).context("failed to build EDGAR client")?;

  let snapshot = client
    .fetch_listings()
    .await
    .context("failed to fetch listing feed")?;

  let mut reconciler = Reconciler::new(store).with_waterfall(waterfall);
  let (cycle, refresh) = if skip_refresh {
    let cycle = reconciler.reconcile(&snapshot).await;
    (cycle.context("reconciliation cycle failed")?, None)
  } else {
    let (cycle, refresh) = reconciler
      .run_cycle(&snapshot, &client)
      .await
      .context("sync cycle failed")?;
    (cycle, Some(refresh))
  };

  let labels = cfg.rebrand_labels();
  for event in cycle.alerts() {
    tracing::info!(
      cik = %event.entity_id,
      ticker = %event.ticker,
      scenario = labels.label(&event.scenario),
      "{}",
      event.scenario
    );
  }

  if let Some(refresh) = refresh {
    tracing::info!(
      refreshed = refresh.refreshed,
      with_revenue = refresh.with_revenue,
      failed = refresh.failed.len(),
      "derived facts refreshed"
    );
  }
  Ok(())
}

async fn export_csv(
  cfg: &SyncConfig,
  store: &SqliteStore,
  path: &Path,
  include_inactive: bool,
) -> anyhow::Result<()> {
  let views = current_views(store, include_inactive)
    .await
    .context("failed to read current state")?;
  let rows = export::rows(&views, &cfg.rebrand_labels());
  export::write_csv_file(&rows, path)
    .with_context(|| format!("failed to write {path:?}"))?;

  tracing::info!(rows = rows.len(), path = %path.display(), "CSV report written");
  Ok(())
}

async fn history(cfg: &SyncConfig, store: &SqliteStore, id: EntityId) -> anyhow::Result<()> {
  let events = store
    .history(id)
    .await
    .with_context(|| format!("failed to read history for {id}"))?;
  if events.is_empty() {
    anyhow::bail!("no events recorded for CIK {}", id.padded());
  }

  let labels = cfg.rebrand_labels();
  for event in events {
    println!(
      "{}  #{:<8} {:<8} {:<9} {}  {}",
      event.observed_at.format("%Y-%m-%d %H:%M:%S"),
      event.sequence_id.0,
      event.ticker,
      if event.is_active { "active" } else { "inactive" },
      labels.label(&event.scenario),
      event.display_name,
    );
  }
  Ok(())
}

async fn serve(cfg: &SyncConfig, store: SqliteStore) -> anyhow::Result<()> {
  let app = axum::Router::new()
    .nest("/api", secmaster_api::api_router(Arc::new(store)))
    .layer(TraceLayer::new_for_http());
  let address = format!("{}:{}", cfg.host, cfg.port);

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;
  Ok(())
}
