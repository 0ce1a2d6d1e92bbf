pub mod run;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::error::SummaryError;

// ─── Unified error type ──────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    NotCompleted,
    AlreadyFinished,
}

impl From<SummaryError> for ApiError {
    fn from(err: SummaryError) -> Self {
        match err {
            SummaryError::NotCompleted => ApiError::NotCompleted,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotCompleted => (
                StatusCode::CONFLICT,
                "Run still in progress; summary not available yet",
            ),
            Self::AlreadyFinished => (StatusCode::CONFLICT, "Run already completed"),
        };

        let body = serde_json::json!({
            "error":  message,
            "status": status.as_u16(),
        });

        (status, Json(body)).into_response()
    }
}
