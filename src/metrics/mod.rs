pub mod collector;
pub mod percentiles;
pub mod stream;

use tokio::time::{Duration, Instant};

use crate::error::FailureKind;

pub use collector::{MetricsCollector, MetricsSnapshot, MetricsSummary};

/// Result of one attempt as seen by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success { status: u16, latency: Duration },
    Failure { kind: FailureKind, latency: Duration },
}

impl Outcome {
    pub fn latency(&self) -> Duration {
        match self {
            Outcome::Success { latency, .. } | Outcome::Failure { latency, .. } => *latency,
        }
    }
}

/// A completed attempt, handed to the collector by the execution unit that
/// ran it. The collector keeps only what it aggregates.
#[derive(Debug, Clone)]
pub struct RequestAttempt {
    /// 0..N-1, assigned at admission
    pub sequence: u64,
    pub dispatched_at: Instant,
    pub completed_at: Instant,
    pub outcome: Outcome,
}
