use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::health::HealthState;
use crate::api::latency::{LatencyStats, LatencySummary};
use crate::db::models::CycleRow;
use crate::error::AppError;
use crate::store::SnapshotStore;
use crate::types::{CycleOutcome, CycleReport, SlotRecord};
use crate::watcher::SlotWatcher;

const DEFAULT_RECENT_LIMIT: i64 = 50;
const MAX_RECENT_LIMIT: i64 = 1000;

#[derive(Clone)]
pub struct ApiState {
    pub pool: sqlx::SqlitePool,
    pub store: Arc<dyn SnapshotStore>,
    pub watcher: Arc<SlotWatcher>,
    pub health: Arc<HealthState>,
    pub latency: Arc<LatencyStats>,
    pub started_at: Instant,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(get_health))
        .route("/slots", get(get_slots))
        .route("/cycles/recent", get(get_recent_cycles))
        .route("/cycles/run", post(run_cycle))
        .route("/stats/latency", get(get_stats_latency))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Query param structs
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct RecentCyclesQuery {
    pub limit: Option<i64>,
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct HealthResponse {
    pub uptime_secs: u64,
    pub cycles_run: u64,
    pub cycles_skipped: u64,
    pub notifications_sent: u64,
    pub last_cycle_at_ms: Option<i64>,
    pub last_outcome: Option<CycleOutcome>,
    pub baseline_size: usize,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn get_health(State(state): State<ApiState>) -> Json<HealthResponse> {
    let h = &state.health;
    let last_cycle_at_ms = Some(h.last_cycle_at_ms()).filter(|&ms| ms > 0);
    Json(HealthResponse {
        uptime_secs: state.started_at.elapsed().as_secs(),
        cycles_run: h.cycles_run(),
        cycles_skipped: h.cycles_skipped(),
        notifications_sent: h.notifications_sent(),
        last_cycle_at_ms,
        last_outcome: h.last_outcome(),
        baseline_size: h.baseline_size(),
    })
}

async fn get_slots(State(state): State<ApiState>) -> Result<Json<Vec<SlotRecord>>, AppError> {
    let baseline = state.store.load().await?;
    Ok(Json(baseline.map(|b| b.into_records()).unwrap_or_default()))
}

async fn get_recent_cycles(
    State(state): State<ApiState>,
    Query(params): Query<RecentCyclesQuery>,
) -> Result<Json<Vec<CycleRow>>, AppError> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_RECENT_LIMIT)
        .clamp(1, MAX_RECENT_LIMIT);

    let rows: Vec<CycleRow> = sqlx::query_as(
        r#"
        SELECT id, started_at, finished_at, outcome, slots_fetched,
               failed_dates, alerted, notified, persisted
        FROM cycles
        ORDER BY started_at DESC, id DESC
        LIMIT ?
        "#,
    )
    .bind(limit)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(rows))
}

/// Run a cycle immediately. 409 if one is already in flight.
async fn run_cycle(State(state): State<ApiState>) -> Result<Json<CycleReport>, AppError> {
    let report = state.watcher.try_run_cycle().await?;
    Ok(Json(report))
}

async fn get_stats_latency(State(state): State<ApiState>) -> Json<LatencySummary> {
    Json(state.latency.summary())
}
