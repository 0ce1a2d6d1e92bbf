use hdrhistogram::Histogram;
use serde::Serialize;

/// HdrHistogram range: 1 μs → 10 min, 3 significant figures
const HIST_LOW: u64 = 1;
const HIST_HIGH: u64 = 600_000_000;
const HIST_SIGFIG: u8 = 3;

/// Latency percentile breakdown in microseconds.
/// Built on demand from the raw samples; never stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PercentileSet {
    pub min: u64,
    pub max: u64,
    pub mean: f64,
    pub p50: u64,
    pub p95: u64,
    pub p99: u64,
    pub p999: u64,
    pub count: u64,
}

impl PercentileSet {
    /// Histogram the samples and read the percentiles back out.
    /// Returns zeroed values for an empty slice.
    pub fn from_samples(samples_us: &[u64]) -> Self {
        if samples_us.is_empty() {
            return Self::empty();
        }

        let mut hist = Histogram::<u64>::new_with_bounds(HIST_LOW, HIST_HIGH, HIST_SIGFIG)
            .expect("histogram bounds are valid");
        for &us in samples_us {
            // clamp to ≥ 1 μs, saturate above the upper bound
            hist.saturating_record(us.max(1));
        }

        Self::from_histogram(&hist)
    }

    fn from_histogram(hist: &Histogram<u64>) -> Self {
        Self {
            min: hist.min(),
            max: hist.max(),
            mean: hist.mean(),
            p50: hist.value_at_percentile(50.0),
            p95: hist.value_at_percentile(95.0),
            p99: hist.value_at_percentile(99.0),
            p999: hist.value_at_percentile(99.9),
            count: hist.len(),
        }
    }

    pub fn empty() -> Self {
        Self {
            min: 0,
            max: 0,
            mean: 0.0,
            p50: 0,
            p95: 0,
            p99: 0,
            p999: 0,
            count: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_samples_yield_zeroes() {
        let set = PercentileSet::from_samples(&[]);
        assert_eq!(set, PercentileSet::empty());
    }

    #[test]
    fn percentiles_track_the_distribution() {
        let samples: Vec<u64> = (1..=1000).map(|i| i * 100).collect();
        let set = PercentileSet::from_samples(&samples);

        assert_eq!(set.count, 1000);
        assert_eq!(set.min, 100);
        // 3 significant figures: values are within 0.1 %
        assert!((set.p50 as f64 - 50_000.0).abs() <= 50.0);
        assert!((set.p99 as f64 - 99_000.0).abs() <= 100.0);
        assert!((set.max as f64 - 100_000.0).abs() <= 100.0);
    }

    #[test]
    fn zero_latency_is_clamped_to_one_microsecond() {
        let set = PercentileSet::from_samples(&[0, 0]);
        assert_eq!(set.min, 1);
        assert_eq!(set.count, 2);
    }
}
