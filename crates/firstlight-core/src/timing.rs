use std::time::{Duration, Instant};

use serde_json::json;

use crate::stats::nearest_rank;

/// Environment variable that enables the timing report.
pub const TIMING_ENV: &str = "FIRSTLIGHT_TIMING";

/// Aggregated timing report across pipeline stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimingReport {
    /// Per-stage statistics, in the order stages first ran.
    pub operations: Vec<OpTiming>,
}

/// Timing statistics for a single named stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpTiming {
    pub name: String,
    pub p50: Duration,
    pub p95: Duration,
    pub p99: Duration,
    pub total: Duration,
    /// Number of samples collected for this stage.
    pub count: usize,
}

/// Collects stage durations for one or more runs.
///
/// Owned by the caller and passed down the pipeline, so concurrent runs
/// never share samples.
#[derive(Debug, Clone, Default)]
pub struct StageTimer {
    samples: Vec<(&'static str, Duration)>,
}

impl StageTimer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` and record its wall-clock duration under `stage`.
    pub fn time<R>(&mut self, stage: &'static str, f: impl FnOnce() -> R) -> R {
        let started = Instant::now();
        let result = f();
        self.record(stage, started.elapsed());
        result
    }

    pub fn record(&mut self, stage: &'static str, elapsed: Duration) {
        self.samples.push((stage, elapsed));
    }

    /// Group samples by stage and compute percentiles.
    #[must_use]
    pub fn report(&self) -> TimingReport {
        let mut grouped: Vec<(&'static str, Vec<Duration>)> = Vec::new();
        for &(name, elapsed) in &self.samples {
            match grouped.iter_mut().find(|(n, _)| *n == name) {
                Some((_, values)) => values.push(elapsed),
                None => grouped.push((name, vec![elapsed])),
            }
        }

        let operations = grouped
            .into_iter()
            .map(|(name, mut values)| {
                values.sort_unstable();
                let at = |pct| nearest_rank(&values, pct).unwrap_or_default();
                OpTiming {
                    name: name.to_string(),
                    p50: at(50),
                    p95: at(95),
                    p99: at(99),
                    total: values.iter().sum(),
                    count: values.len(),
                }
            })
            .collect();

        TimingReport { operations }
    }
}

/// Returns true when `FIRSTLIGHT_TIMING` enables timing output.
///
/// Supported truthy values: `1`, `true`, `yes`, `on` (case-insensitive).
#[must_use]
pub fn timing_enabled_from_env() -> bool {
    std::env::var(TIMING_ENV)
        .ok()
        .is_some_and(|value| is_truthy(value.as_str()))
}

impl TimingReport {
    /// Returns true when no timing samples were recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Render the timing report as JSON.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let operations = self
            .operations
            .iter()
            .map(|op| {
                json!({
                    "name": op.name,
                    "count": op.count,
                    "p50_us": op.p50.as_micros(),
                    "p95_us": op.p95.as_micros(),
                    "p99_us": op.p99.as_micros(),
                    "total_us": op.total.as_micros(),
                })
            })
            .collect::<Vec<_>>();

        json!({ "operations": operations })
    }

    /// Render the timing report as a simple table for terminal output.
    #[must_use]
    pub fn display_table(&self) -> String {
        if self.operations.is_empty() {
            return "No timing samples recorded.".to_string();
        }

        let mut out = String::new();
        out.push_str("stage                count      p50      p95      p99    total\n");
        out.push_str("--------------------------------------------------------------\n");

        for op in &self.operations {
            out.push_str(&format!(
                "{:<20} {:>5} {:>8} {:>8} {:>8} {:>8}\n",
                op.name,
                op.count,
                format_duration(op.p50),
                format_duration(op.p95),
                format_duration(op.p99),
                format_duration(op.total)
            ));
        }

        out
    }
}

fn format_duration(duration: Duration) -> String {
    let micros = duration.as_micros();

    if micros >= 1_000_000 {
        let secs = micros / 1_000_000;
        let millis = (micros % 1_000_000) / 1_000;
        format!("{secs}.{millis:03}s")
    } else if micros >= 1_000 {
        let millis = micros / 1_000;
        let rem = micros % 1_000;
        format!("{millis}.{rem:03}ms")
    } else {
        format!("{micros}µs")
    }
}

fn is_truthy(value: &str) -> bool {
    value.eq_ignore_ascii_case("1")
        || value.eq_ignore_ascii_case("true")
        || value.eq_ignore_ascii_case("yes")
        || value.eq_ignore_ascii_case("on")
}
