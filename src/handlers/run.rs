use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::dispatch::DispatchState;
use crate::report::SummaryReport;
use crate::AppState;

use super::ApiError;

#[derive(Debug, Serialize)]
pub struct RunStatus {
    pub state: DispatchState,
    pub in_flight: usize,
    pub cancelled: bool,
    pub message: String,
}

fn status(state: &AppState, message: impl Into<String>) -> RunStatus {
    RunStatus {
        state: state.run.state(),
        in_flight: state.run.in_flight(),
        cancelled: state.run.is_cancelled(),
        message: message.into(),
    }
}

// ─── GET /api/run/status ─────────────────────────────────────────

pub async fn run_status(State(state): State<Arc<AppState>>) -> Json<RunStatus> {
    let message = match state.run.state() {
        DispatchState::Idle => "Idle",
        DispatchState::Running => "Dispatching",
        DispatchState::Draining => "Waiting for in-flight requests",
        DispatchState::Completed => "Completed",
    };
    Json(status(&state, message))
}

// ─── POST /api/run/stop ──────────────────────────────────────────

pub async fn stop_run(State(state): State<Arc<AppState>>) -> Result<Json<RunStatus>, ApiError> {
    if state.run.state() == DispatchState::Completed {
        return Err(ApiError::AlreadyFinished);
    }

    tracing::info!("stop requested over the metrics api");
    state.run.cancel();
    Ok(Json(status(&state, "Cancellation requested")))
}

// ─── GET /api/run/summary ────────────────────────────────────────

pub async fn run_summary(State(state): State<Arc<AppState>>) -> Result<Json<SummaryReport>, ApiError> {
    let summary = state.metrics.summarize()?;
    Ok(Json(SummaryReport::from(&summary)))
}
