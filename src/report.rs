use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::metrics::percentiles::PercentileSet;
use crate::metrics::MetricsSummary;

/// Serializable view of a summary with every derived figure filled in.
#[derive(Debug, Serialize)]
pub struct SummaryReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub elapsed_secs: f64,
    pub cancelled: bool,
    pub total_dispatched: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub abandoned: u64,
    pub success_rate_pct: f64,
    pub throughput_rps: f64,
    pub latency_us: PercentileSet,
    pub status_codes: BTreeMap<u16, u64>,
    pub failures: BTreeMap<String, u64>,
}

impl From<&MetricsSummary> for SummaryReport {
    fn from(summary: &MetricsSummary) -> Self {
        Self {
            run_id: summary.run_id,
            started_at: summary.started_at,
            finished_at: summary.finished_at,
            elapsed_secs: summary.elapsed.as_secs_f64(),
            cancelled: summary.cancelled,
            total_dispatched: summary.total_dispatched,
            success_count: summary.success_count,
            failure_count: summary.failure_count,
            abandoned: summary.abandoned(),
            success_rate_pct: summary.success_rate(),
            throughput_rps: summary.throughput(),
            latency_us: summary.latency(),
            status_codes: summary.status_codes.clone(),
            failures: summary
                .failures
                .iter()
                .map(|(kind, count)| (kind.label(), *count))
                .collect(),
        }
    }
}

pub fn to_json(summary: &MetricsSummary) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&SummaryReport::from(summary))
}

/// Log the summary for a human reader.
pub fn log_summary(summary: &MetricsSummary) {
    tracing::info!("--- Results ---");
    if summary.cancelled {
        tracing::warn!(abandoned = summary.abandoned(), "run was cancelled before completion");
    }
    tracing::info!("Total dispatched: {}", summary.total_dispatched);
    tracing::info!("Successful: {}", summary.success_count);
    tracing::info!("Failed: {}", summary.failure_count);
    tracing::info!("Success rate: {:.1}%", summary.success_rate());
    tracing::info!(
        "Wall time: {:.3}s ({:.1} req/s)",
        summary.elapsed.as_secs_f64(),
        summary.throughput()
    );

    for (kind, count) in &summary.failures {
        tracing::info!("  {}: {}", kind.label(), count);
    }

    let (Some(min), Some(max), Some(mean)) = (
        summary.min_latency(),
        summary.max_latency(),
        summary.mean_latency(),
    ) else {
        tracing::warn!("No completed attempts to measure time.");
        return;
    };

    let pct = summary.latency();
    tracing::info!("--- Timing Stats ---");
    tracing::info!("Min time: {:.3}s", min.as_secs_f64());
    tracing::info!("Max time: {:.3}s", max.as_secs_f64());
    tracing::info!("Avg time: {:.3}s", mean.as_secs_f64());
    tracing::info!(
        "p50 {:.3}s  p95 {:.3}s  p99 {:.3}s",
        pct.p50 as f64 / 1e6,
        pct.p95 as f64 / 1e6,
        pct.p99 as f64 / 1e6
    );
}
