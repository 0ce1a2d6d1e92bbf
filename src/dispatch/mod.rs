//! Rate-limited, concurrency-bounded dispatch of request attempts.

pub mod gate;
pub mod rate_limiter;

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::Instant;
use tracing::Instrument;

use crate::cancel::CancelSignal;
use crate::error::{ConfigError, FailureKind};
use crate::executor::{RequestExecutor, RequestOptions};
use crate::metrics::{MetricsCollector, MetricsSummary, Outcome, RequestAttempt};

pub use gate::{ConcurrencyGate, GateSlot};
pub use rate_limiter::RateLimiter;

// ─── Configuration ───────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Total attempts (N)
    pub total: u64,
    /// Maximum attempts in flight (C)
    pub concurrency: usize,
    /// Admissions per second (R)
    pub rate: f64,
    /// Tokens the rate limiter may bank while idle
    pub burst: u32,
    /// Opaque target handed to the executor
    pub target: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchState {
    Idle,
    Running,
    Draining,
    Completed,
}

/// Read side of a run, shared with the metrics server.
#[derive(Clone)]
pub struct RunHandle {
    state: Arc<Mutex<DispatchState>>,
    gate: Arc<ConcurrencyGate>,
    cancel: CancelSignal,
}

impl RunHandle {
    pub fn state(&self) -> DispatchState {
        *self.state.lock()
    }

    pub fn in_flight(&self) -> usize {
        self.gate.in_flight()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

// ─── Dispatcher ──────────────────────────────────────────────────

/// Drives `total` attempts through the rate limiter and the concurrency
/// gate, one spawned execution unit per admitted attempt.
pub struct Dispatcher<E> {
    total: u64,
    target: Arc<str>,
    executor: Arc<E>,
    options: Arc<RequestOptions>,
    limiter: RateLimiter,
    gate: Arc<ConcurrencyGate>,
    metrics: Arc<MetricsCollector>,
    cancel: CancelSignal,
    state: Arc<Mutex<DispatchState>>,
}

impl<E: RequestExecutor> Dispatcher<E> {
    /// Validate the configuration and build an idle dispatcher.
    pub fn new(
        config: DispatchConfig,
        executor: E,
        options: RequestOptions,
        cancel: CancelSignal,
    ) -> Result<Self, ConfigError> {
        let gate = ConcurrencyGate::new(config.concurrency)?;
        let limiter = RateLimiter::new(config.rate, config.burst)?;

        Ok(Self {
            total: config.total,
            target: config.target.into(),
            executor: Arc::new(executor),
            options: Arc::new(options),
            limiter,
            gate: Arc::new(gate),
            metrics: Arc::new(MetricsCollector::new()),
            cancel,
            state: Arc::new(Mutex::new(DispatchState::Idle)),
        })
    }

    pub fn metrics(&self) -> Arc<MetricsCollector> {
        self.metrics.clone()
    }

    pub fn handle(&self) -> RunHandle {
        RunHandle {
            state: self.state.clone(),
            gate: self.gate.clone(),
            cancel: self.cancel.clone(),
        }
    }

    fn set_state(&self, state: DispatchState) {
        *self.state.lock() = state;
        tracing::debug!(?state, "dispatcher state changed");
    }

    /// Run to completion (or cancellation) and return the frozen summary.
    pub async fn run(self) -> MetricsSummary {
        let span = tracing::info_span!("run", run_id = %self.metrics.run_id());
        self.run_inner().instrument(span).await
    }

    async fn run_inner(self) -> MetricsSummary {
        self.set_state(DispatchState::Running);
        self.limiter.reset();
        self.metrics.start();
        tracing::info!(
            target_url = %self.target,
            total = self.total,
            concurrency = self.gate.capacity(),
            rate = self.limiter.rate(),
            burst = self.limiter.burst(),
            "dispatch started"
        );

        let mut interrupted = false;
        for sequence in 0..self.total {
            if self.limiter.acquire(&self.cancel).await.is_err() {
                interrupted = true;
                break;
            }
            let Ok(slot) = self.gate.acquire(&self.cancel).await else {
                interrupted = true;
                break;
            };

            self.metrics.note_dispatched();
            let unit = ExecutionUnit {
                sequence,
                target: self.target.clone(),
                executor: self.executor.clone(),
                options: self.options.clone(),
                metrics: self.metrics.clone(),
                cancel: self.cancel.clone(),
            };
            tokio::spawn(unit.run(slot).in_current_span());
        }

        if interrupted {
            tracing::warn!("run cancelled; abandoning in-flight attempts");
        }
        self.set_state(DispatchState::Draining);
        tracing::debug!(in_flight = self.gate.in_flight(), "waiting for in-flight attempts");
        self.gate.drain().await;

        let summary = self
            .metrics
            .freeze(interrupted || self.cancel.is_cancelled());
        self.set_state(DispatchState::Completed);
        tracing::info!(
            dispatched = summary.total_dispatched,
            succeeded = summary.success_count,
            failed = summary.failure_count,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            cancelled = summary.cancelled,
            "dispatch completed"
        );
        summary
    }
}

// ─── Execution unit ──────────────────────────────────────────────

/// One admitted attempt. Owns its gate slot until the outcome is recorded.
struct ExecutionUnit<E> {
    sequence: u64,
    target: Arc<str>,
    executor: Arc<E>,
    options: Arc<RequestOptions>,
    metrics: Arc<MetricsCollector>,
    cancel: CancelSignal,
}

impl<E: RequestExecutor> ExecutionUnit<E> {
    async fn run(self, slot: GateSlot) {
        let sequence = self.sequence;
        let dispatched_at = Instant::now();

        let call = AssertUnwindSafe(self.executor.execute(&self.target, &self.options, sequence))
            .catch_unwind();
        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                tracing::debug!(sequence, "attempt abandoned");
                drop(slot);
                return;
            }
            result = call => result,
        };

        let completed_at = Instant::now();
        let latency = completed_at - dispatched_at;
        let latency_ms = latency.as_secs_f64() * 1000.0;
        let outcome = match result {
            Ok(Ok(status)) => {
                tracing::info!(sequence, status, latency_ms, "request completed");
                Outcome::Success { status, latency }
            }
            Ok(Err(err)) => {
                let kind = err.kind();
                tracing::warn!(sequence, kind = %kind.label(), error = %err, latency_ms, "request failed");
                Outcome::Failure { kind, latency }
            }
            Err(_) => {
                tracing::error!(sequence, latency_ms, "executor panicked");
                Outcome::Failure {
                    kind: FailureKind::Panicked,
                    latency,
                }
            }
        };

        self.metrics.record(RequestAttempt {
            sequence,
            dispatched_at,
            completed_at,
            outcome,
        });
        drop(slot);
    }
}
