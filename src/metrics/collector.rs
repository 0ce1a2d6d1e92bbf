use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::{Duration, Instant};
use uuid::Uuid;

use super::percentiles::PercentileSet;
use super::{Outcome, RequestAttempt};
use crate::error::{FailureKind, SummaryError};

// ─── Public types ────────────────────────────────────────────────

/// Thread-safe outcome aggregator.
/// Execution units call `record()`, the dispatcher freezes it once the run
/// is complete, the metrics server reads `snapshot()` at any time.
pub struct MetricsCollector {
    inner: Mutex<Inner>,
}

/// Frozen result of a completed (or cancelled) run.
///
/// Only raw aggregates are stored; everything else is derived on read.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsSummary {
    pub run_id: Uuid,
    pub total_dispatched: u64,
    pub success_count: u64,
    pub failure_count: u64,
    /// Per-attempt latency in μs, in completion order.
    pub latencies_us: Vec<u64>,
    pub status_codes: BTreeMap<u16, u64>,
    pub failures: BTreeMap<FailureKind, u64>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub elapsed: Duration,
    pub cancelled: bool,
}

/// Live view served while the run is in progress.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub run_id: Uuid,
    pub dispatched: u64,
    /// dispatched but not yet recorded
    pub outstanding: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub requests_per_sec: f64,
    pub elapsed_secs: f64,
    pub latency_us: PercentileSet,
    pub frozen: bool,
}

// ─── Internal state ──────────────────────────────────────────────

struct Inner {
    run_id: Uuid,
    dispatched: u64,
    success_count: u64,
    failure_count: u64,
    latencies_us: Vec<u64>,
    status_codes: BTreeMap<u16, u64>,
    failures: BTreeMap<FailureKind, u64>,
    // Monotonic anchor for elapsed time, wall clock for the report
    started: Option<(Instant, DateTime<Utc>)>,
    frozen: Option<MetricsSummary>,
}

// ─── MetricsCollector impl ───────────────────────────────────────

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::new()),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.inner.lock().run_id
    }

    /// Anchor the run clock. Called when the dispatcher starts running.
    pub fn start(&self) {
        let mut inner = self.inner.lock();
        inner.started = Some((Instant::now(), Utc::now()));
    }

    /// Count one admitted attempt.
    pub fn note_dispatched(&self) {
        self.inner.lock().dispatched += 1;
    }

    /// Fold a completed attempt into the aggregates.
    pub fn record(&self, attempt: RequestAttempt) {
        let mut inner = self.inner.lock();
        if inner.frozen.is_some() {
            tracing::debug!(sequence = attempt.sequence, "attempt recorded after freeze; ignored");
            return;
        }
        tracing::trace!(
            sequence = attempt.sequence,
            turnaround_us = (attempt.completed_at - attempt.dispatched_at).as_micros() as u64,
            "attempt recorded"
        );
        inner.record(&attempt.outcome);
    }

    /// Freeze the aggregates into the final summary. Later calls return the
    /// summary frozen by the first one.
    pub fn freeze(&self, cancelled: bool) -> MetricsSummary {
        let mut inner = self.inner.lock();
        if let Some(summary) = &inner.frozen {
            return summary.clone();
        }

        let summary = inner.summary(cancelled);
        inner.frozen = Some(summary.clone());
        summary
    }

    /// The frozen summary, once the run has completed.
    pub fn summarize(&self) -> Result<MetricsSummary, SummaryError> {
        self.inner
            .lock()
            .frozen
            .clone()
            .ok_or(SummaryError::NotCompleted)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.inner.lock().snapshot()
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Inner impl ──────────────────────────────────────────────────

impl Inner {
    fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            dispatched: 0,
            success_count: 0,
            failure_count: 0,
            latencies_us: Vec::with_capacity(1024),
            status_codes: BTreeMap::new(),
            failures: BTreeMap::new(),
            started: None,
            frozen: None,
        }
    }

    fn record(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Success { status, .. } => {
                self.success_count += 1;
                *self.status_codes.entry(*status).or_default() += 1;
            }
            Outcome::Failure { kind, .. } => {
                self.failure_count += 1;
                if let FailureKind::Status(status) = kind {
                    *self.status_codes.entry(*status).or_default() += 1;
                }
                *self.failures.entry(*kind).or_default() += 1;
            }
        }
        self.latencies_us
            .push(outcome.latency().as_micros().min(u64::MAX as u128) as u64);
    }

    fn elapsed(&self) -> Duration {
        self.started
            .map(|(at, _)| at.elapsed())
            .unwrap_or(Duration::ZERO)
    }

    fn summary(&self, cancelled: bool) -> MetricsSummary {
        let finished_at = Utc::now();
        MetricsSummary {
            run_id: self.run_id,
            total_dispatched: self.dispatched,
            success_count: self.success_count,
            failure_count: self.failure_count,
            latencies_us: self.latencies_us.clone(),
            status_codes: self.status_codes.clone(),
            failures: self.failures.clone(),
            started_at: self.started.map(|(_, wall)| wall).unwrap_or(finished_at),
            finished_at,
            elapsed: self.elapsed(),
            cancelled,
        }
    }

    fn snapshot(&self) -> MetricsSnapshot {
        if let Some(summary) = &self.frozen {
            return summary.snapshot();
        }

        let elapsed_secs = self.elapsed().as_secs_f64();
        let recorded = self.success_count + self.failure_count;
        MetricsSnapshot {
            run_id: self.run_id,
            dispatched: self.dispatched,
            outstanding: self.dispatched.saturating_sub(recorded),
            success_count: self.success_count,
            failure_count: self.failure_count,
            requests_per_sec: rate(recorded, elapsed_secs),
            elapsed_secs,
            latency_us: PercentileSet::from_samples(&self.latencies_us),
            frozen: false,
        }
    }
}

fn rate(count: u64, secs: f64) -> f64 {
    if secs > 0.0 {
        count as f64 / secs
    } else {
        0.0
    }
}

// ─── Derived statistics ──────────────────────────────────────────

impl MetricsSummary {
    /// Attempts that produced an outcome.
    pub fn recorded(&self) -> u64 {
        self.success_count + self.failure_count
    }

    /// Attempts admitted but abandoned by cancellation.
    pub fn abandoned(&self) -> u64 {
        self.total_dispatched.saturating_sub(self.recorded())
    }

    pub fn latency(&self) -> PercentileSet {
        PercentileSet::from_samples(&self.latencies_us)
    }

    /// Exact mean over the raw samples.
    pub fn mean_latency(&self) -> Option<Duration> {
        if self.latencies_us.is_empty() {
            return None;
        }
        let total: u128 = self.latencies_us.iter().map(|us| *us as u128).sum();
        let mean = total / self.latencies_us.len() as u128;
        Some(Duration::from_micros(mean as u64))
    }

    pub fn min_latency(&self) -> Option<Duration> {
        self.latencies_us.iter().min().map(|us| Duration::from_micros(*us))
    }

    pub fn max_latency(&self) -> Option<Duration> {
        self.latencies_us.iter().max().map(|us| Duration::from_micros(*us))
    }

    /// Percentage of dispatched attempts that succeeded.
    pub fn success_rate(&self) -> f64 {
        if self.total_dispatched == 0 {
            return 0.0;
        }
        self.success_count as f64 / self.total_dispatched as f64 * 100.0
    }

    /// Recorded attempts per second of wall time.
    pub fn throughput(&self) -> f64 {
        rate(self.recorded(), self.elapsed.as_secs_f64())
    }

    fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            run_id: self.run_id,
            dispatched: self.total_dispatched,
            outstanding: 0,
            success_count: self.success_count,
            failure_count: self.failure_count,
            requests_per_sec: self.throughput(),
            elapsed_secs: self.elapsed.as_secs_f64(),
            latency_us: self.latency(),
            frozen: true,
        }
    }
}
