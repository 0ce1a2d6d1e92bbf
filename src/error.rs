//! Error types shared by the dispatch engine, the executors and the binary.

use thiserror::Error;

/// Rejected configuration. Raised before any attempt is dispatched.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("concurrency must be at least 1")]
    ZeroConcurrency,
    #[error("concurrency {0} exceeds the supported maximum")]
    ConcurrencyTooLarge(u64),
    #[error("rate must be between one request per day and 1e9 requests per second (got {0})")]
    InvalidRate(f64),
    #[error("burst must be at least 1 token and small enough to refill in finite time (got {0})")]
    InvalidBurst(u32),
    #[error("invalid target url \"{url}\": {reason}")]
    InvalidTarget { url: String, reason: String },
    #[error("proxies requested but none configured (set PROXIES)")]
    NoProxies,
    #[error("invalid proxy \"{proxy}\": {reason}")]
    InvalidProxy { proxy: String, reason: String },
}

/// Why a single attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FailureKind {
    Timeout,
    Connect,
    Status(u16),
    ContentMismatch,
    Transport,
    Panicked,
}

impl FailureKind {
    /// Key used in logs and reports.
    pub fn label(&self) -> String {
        match self {
            FailureKind::Timeout => "timeout".into(),
            FailureKind::Connect => "connect".into(),
            FailureKind::Status(code) => format!("status_{code}"),
            FailureKind::ContentMismatch => "content_mismatch".into(),
            FailureKind::Transport => "transport".into(),
            FailureKind::Panicked => "panicked".into(),
        }
    }
}

/// Failure inside one attempt. Never escapes the execution unit; it is
/// turned into `Outcome::Failure` before being recorded.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("unexpected status code {0}")]
    Status(u16),
    #[error("page did not contain \"{0}\"")]
    ContentMismatch(String),
    #[error("transport error: {0}")]
    Transport(String),
}

impl ExecutionError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ExecutionError::Timeout => FailureKind::Timeout,
            ExecutionError::Connect(_) => FailureKind::Connect,
            ExecutionError::Status(code) => FailureKind::Status(*code),
            ExecutionError::ContentMismatch(_) => FailureKind::ContentMismatch,
            ExecutionError::Transport(_) => FailureKind::Transport,
        }
    }
}

impl From<reqwest::Error> for ExecutionError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ExecutionError::Timeout
        } else if err.is_connect() {
            ExecutionError::Connect(err.to_string())
        } else if let Some(status) = err.status() {
            ExecutionError::Status(status.as_u16())
        } else {
            ExecutionError::Transport(err.to_string())
        }
    }
}

/// The run was cancelled while the caller was suspended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("run cancelled")]
pub struct Cancelled;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SummaryError {
    #[error("summary requested before the run completed")]
    NotCompleted,
}

/// Top-level failures of the binary.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to build http client: {0}")]
    Client(#[from] reqwest::Error),
    #[error("failed to bind metrics server on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode report: {0}")]
    Encode(#[from] serde_json::Error),
}

pub type Result<T, E = AppError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execution_errors_map_to_failure_kinds() {
        assert_eq!(ExecutionError::Timeout.kind(), FailureKind::Timeout);
        assert_eq!(ExecutionError::Status(503).kind(), FailureKind::Status(503));
        assert_eq!(
            ExecutionError::ContentMismatch("Destination".into()).kind(),
            FailureKind::ContentMismatch
        );
    }

    #[test]
    fn failure_labels_are_stable() {
        assert_eq!(FailureKind::Status(404).label(), "status_404");
        assert_eq!(FailureKind::Timeout.label(), "timeout");
    }
}
