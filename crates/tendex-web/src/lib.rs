//! Operational JSON surface: health probe, recent run reports, and store
//! statistics. Deliberately thin; the pipeline does not depend on it.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use tendex_core::{RunReport, RunStatus};
use tendex_storage::TenderStore;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tracing::info;

pub const CRATE_NAME: &str = "tendex-web";

/// Reports kept in memory for the dashboard.
const RUN_HISTORY_CAP: usize = 100;

const DEFAULT_RUNS_LIMIT: usize = 20;

pub struct AppState {
    runs: RwLock<Vec<RunReport>>,
    store: Option<Arc<dyn TenderStore>>,
}

impl AppState {
    pub fn new(store: Option<Arc<dyn TenderStore>>) -> Self {
        Self {
            runs: RwLock::new(Vec::new()),
            store,
        }
    }

    /// Records a finished run, newest first, capped at [`RUN_HISTORY_CAP`].
    pub async fn record_run(&self, report: RunReport) {
        let mut runs = self.runs.write().await;
        runs.insert(0, report);
        runs.truncate(RUN_HISTORY_CAP);
    }
}

pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/runs", get(runs_handler))
        .route("/stats", get(stats_handler))
        .with_state(state)
}

pub async fn serve(state: Arc<AppState>) -> anyhow::Result<()> {
    let port: u16 = std::env::var("TENDEX_WEB_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8080);
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "web surface listening");
    axum::serve(listener, app(state)).await?;
    Ok(())
}

async fn health_handler() -> Response {
    Json(serde_json::json!({ "status": "ok", "service": CRATE_NAME })).into_response()
}

#[derive(Debug, Deserialize, Default)]
struct RunsQuery {
    limit: Option<usize>,
}

async fn runs_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RunsQuery>,
) -> Response {
    let limit = query.limit.unwrap_or(DEFAULT_RUNS_LIMIT);
    let runs = state.runs.read().await;
    let page: Vec<&RunReport> = runs.iter().take(limit).collect();
    Json(&page).into_response()
}

async fn stats_handler(State(state): State<Arc<AppState>>) -> Response {
    let total_tenders = match &state.store {
        Some(store) => match store.count().await {
            Ok(count) => Some(count),
            Err(err) => {
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(serde_json::json!({ "error": err.to_string() })),
                )
                    .into_response();
            }
        },
        None => None,
    };

    let runs = state.runs.read().await;
    let recent = &runs[..runs.len().min(10)];
    let successful = recent
        .iter()
        .filter(|r| r.status == RunStatus::Success)
        .count();
    let last_run = runs.first().map(|r| {
        serde_json::json!({
            "run_id": r.run_id,
            "status": r.status,
            "target_date": r.target_date,
            "total_persisted": r.total_persisted,
            "execution_secs": r.execution_secs,
        })
    });

    Json(serde_json::json!({
        "total_tenders": total_tenders,
        "runs_recorded": runs.len(),
        "recent_success_rate": if recent.is_empty() {
            None
        } else {
            Some(successful as f64 / recent.len() as f64)
        },
        "last_run": last_run,
    }))
    .into_response()
}
