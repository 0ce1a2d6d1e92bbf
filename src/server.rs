use axum::{
    middleware as axum_mw,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::error::AppError;
use crate::handlers;
use crate::metrics::stream;
use crate::middleware::timing;
use crate::AppState;

/// Builds the metrics `Router`: live snapshots, run control and the final
/// summary.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // ── Metrics ─────────────────────────────────────────────
        .route("/api/metrics", get(stream::get_metrics))
        .route("/api/metrics/stream", get(stream::metrics_stream))
        // ── Run control ─────────────────────────────────────────
        .route("/api/run/status", get(handlers::run::run_status))
        .route("/api/run/stop", post(handlers::run::stop_run))
        .route("/api/run/summary", get(handlers::run::run_summary))
        .with_state(state)
        // ── Global middleware (applied bottom-up) ───────────────
        .layer(axum_mw::from_fn(timing::timing_middleware))
        .layer(CorsLayer::permissive())
}

/// Bind `addr` and serve the metrics api in the background.
/// Returns the bound address (useful when `addr` has port 0).
pub async fn spawn(addr: SocketAddr, state: Arc<AppState>) -> Result<SocketAddr, AppError> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| AppError::Bind {
            addr: addr.to_string(),
            source,
        })?;
    let bound = listener.local_addr().map_err(|source| AppError::Bind {
        addr: addr.to_string(),
        source,
    })?;

    let app = create_router(state);
    tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, app).await {
            tracing::error!(%err, "metrics server exited");
        }
    });

    tracing::info!("metrics api listening on http://{bound}/api/metrics");
    Ok(bound)
}
