mod api;
mod config;
mod db;
mod detector;
mod error;
mod fetcher;
mod notifier;
mod store;
mod types;
mod watcher;

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::api::health::HealthState;
use crate::api::latency::LatencyStats;
use crate::api::routes::{router, ApiState};
use crate::config::{Config, StoreBackend, CHANNEL_CAPACITY};
use crate::db::writer::DbWriter;
use crate::error::Result;
use crate::fetcher::{HttpScheduleSource, SlotFetcher};
use crate::notifier::{LogMailer, Mailer, Notifier, SmtpMailer};
use crate::store::{FileSnapshotStore, SnapshotStore, SqliteSnapshotStore};
use crate::watcher::SlotWatcher;

#[tokio::main]
async fn main() {
    // A missing .env file is fine; the environment may already be populated.
    let _ = dotenvy::dotenv();

    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    // --- Database setup ---
    let pool = db::connect(&cfg.db_path).await?;
    info!("Database ready at {}", cfg.db_path);

    // --- Baseline store ---
    let store: Arc<dyn SnapshotStore> = match cfg.store_backend {
        StoreBackend::Sqlite => Arc::new(SqliteSnapshotStore::new(pool.clone())),
        StoreBackend::File => {
            info!("Baseline file: {}", cfg.snapshot_file.display());
            Arc::new(FileSnapshotStore::new(cfg.snapshot_file.clone()))
        }
    };

    // --- Mail transport ---
    let mailer: Arc<dyn Mailer> = if cfg.dry_run {
        warn!("DRY_RUN set: notifications will be logged, not sent");
        Arc::new(LogMailer)
    } else {
        Arc::new(SmtpMailer::new(&cfg.mail)?)
    };

    // --- Shared state ---
    let health = Arc::new(HealthState::new());
    let latency = Arc::new(LatencyStats::new());

    // --- Cycle ledger writer ---
    let (report_tx, report_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let writer = DbWriter::new(pool.clone(), report_rx);
    tokio::spawn(async move { writer.run().await });

    // --- Watcher ---
    let source = HttpScheduleSource::new(cfg.clone(), Arc::clone(&latency))?;
    let watcher = Arc::new(SlotWatcher::new(
        cfg.clone(),
        SlotFetcher::new(Arc::new(source)),
        Notifier::new(mailer, &cfg),
        Arc::clone(&store),
        Arc::clone(&health),
        Some(report_tx),
    ));

    info!(
        location = %cfg.location_id,
        window_days = cfg.window_days,
        interval_secs = cfg.poll_interval_secs,
        "Watching {} for new slots",
        cfg.booking_url(),
    );

    if cfg.api_port == 0 {
        Arc::clone(&watcher).run().await;
        return Ok(());
    }

    tokio::spawn(Arc::clone(&watcher).run());

    // --- HTTP API server ---
    let api_state = ApiState {
        pool,
        store,
        watcher,
        health,
        latency,
        started_at: Instant::now(),
    };
    let app = router(api_state);
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");

    axum::serve(listener, app).await?;

    Ok(())
}
