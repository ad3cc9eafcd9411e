use crate::{Outcome, ThresholdSet};
use std::collections::BTreeMap;
use std::time::Duration;

/// Percentiles reported for successful response times.
pub const REPORTED_PERCENTILES: [f64; 4] = [0.50, 0.90, 0.95, 0.99];

/// Aggregated statistics for one benchmark run.
///
/// Built once every Outcome is in; there is no streaming reduction.
#[derive(Debug, Clone, PartialEq)]
pub struct RunStatistics {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub success_rate: f64,
    pub elapsed: Duration,
    /// All requests (successful or not) per second of wall clock.
    pub throughput: f64,
    /// `None` when there were no successful requests.
    pub latency: Option<LatencySummary>,
    pub endpoints: Vec<EndpointStats>,
    /// Failure reasons, most frequent first.
    pub failures: Vec<(String, usize)>,
    /// `None` when thresholds are not configured or nothing succeeded.
    pub thresholds: Option<Vec<ThresholdCheck>>,
}

/// Descriptive statistics over successful response times, in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatencySummary {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
    /// Sample standard deviation; undefined for a single sample.
    pub std_dev: Option<f64>,
    pub p50: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EndpointStats {
    pub endpoint: String,
    pub requests: usize,
    pub successful: usize,
    /// Mean response time of the successful requests, `0` if there were none.
    pub mean_response_time: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Fail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdKind {
    FailureRate,
    P95ResponseTime,
    P99ResponseTime,
    RequestsPerSecond,
}

impl ThresholdKind {
    pub fn label(&self) -> &'static str {
        match self {
            ThresholdKind::FailureRate => "Failure Rate",
            ThresholdKind::P95ResponseTime => "P95 Response Time",
            ThresholdKind::P99ResponseTime => "P99 Response Time",
            ThresholdKind::RequestsPerSecond => "Requests/Second",
        }
    }
}

/// One threshold evaluated against its measured value. Both bounds are inclusive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdCheck {
    pub kind: ThresholdKind,
    pub actual: f64,
    pub bound: f64,
    pub verdict: Verdict,
}

impl ThresholdCheck {
    pub fn at_most(kind: ThresholdKind, actual: f64, max: f64) -> Self {
        Self {
            kind,
            actual,
            bound: max,
            verdict: if actual <= max {
                Verdict::Pass
            } else {
                Verdict::Fail
            },
        }
    }

    pub fn at_least(kind: ThresholdKind, actual: f64, min: f64) -> Self {
        Self {
            kind,
            actual,
            bound: min,
            verdict: if actual >= min {
                Verdict::Pass
            } else {
                Verdict::Fail
            },
        }
    }

    pub fn passed(&self) -> bool {
        self.verdict == Verdict::Pass
    }
}

impl RunStatistics {
    pub fn from_outcomes(
        outcomes: &[Outcome],
        elapsed: Duration,
        thresholds: Option<&ThresholdSet>,
    ) -> Self {
        let total = outcomes.len();
        let successful = outcomes.iter().filter(|o| o.success).count();
        let failed = total - successful;

        let success_rate = ratio(successful, total);
        let failure_rate = ratio(failed, total);
        let throughput = if elapsed.is_zero() {
            0.
        } else {
            total as f64 / elapsed.as_secs_f64()
        };

        let times: Vec<f64> = outcomes
            .iter()
            .filter(|o| o.success)
            .map(|o| o.response_time)
            .collect();
        let latency = LatencySummary::from_times(&times);

        let thresholds = match (thresholds, latency) {
            (Some(set), Some(latency)) => Some(vec![
                ThresholdCheck::at_most(
                    ThresholdKind::FailureRate,
                    failure_rate,
                    set.max_failure_rate,
                ),
                ThresholdCheck::at_most(
                    ThresholdKind::P95ResponseTime,
                    latency.p95,
                    set.max_p95_response_time,
                ),
                ThresholdCheck::at_most(
                    ThresholdKind::P99ResponseTime,
                    latency.p99,
                    set.max_p99_response_time,
                ),
                ThresholdCheck::at_least(
                    ThresholdKind::RequestsPerSecond,
                    throughput,
                    set.min_requests_per_second,
                ),
            ]),
            _ => None,
        };

        Self {
            total,
            successful,
            failed,
            success_rate,
            elapsed,
            throughput,
            latency,
            endpoints: endpoint_breakdown(outcomes),
            failures: failure_breakdown(outcomes),
            thresholds,
        }
    }

    pub fn failure_rate(&self) -> f64 {
        ratio(self.failed, self.total)
    }

    /// `Some(false)` if any threshold failed, `None` if no checks ran.
    pub fn thresholds_passed(&self) -> Option<bool> {
        self.thresholds
            .as_ref()
            .map(|checks| checks.iter().all(ThresholdCheck::passed))
    }
}

impl LatencySummary {
    pub fn from_times(times: &[f64]) -> Option<Self> {
        if times.is_empty() {
            return None;
        }

        let mut sorted = times.to_vec();
        sorted.sort_by(f64::total_cmp);

        let mean = statistical::mean(&sorted);
        let std_dev = if sorted.len() > 1 {
            Some(statistical::standard_deviation(&sorted, Some(mean)))
        } else {
            None
        };

        let [p50, p90, p95, p99] = REPORTED_PERCENTILES.map(|p| nearest_rank(&sorted, p));

        Some(Self {
            min: sorted[0],
            max: sorted[sorted.len() - 1],
            mean,
            median: statistical::median(&sorted),
            std_dev,
            p50,
            p90,
            p95,
            p99,
        })
    }
}

/// Percentile by indexing an ascending list at `floor(len * p)`.
///
/// This is the nearest-rank style used by existing reports; it is biased for small samples but
/// kept so numbers stay comparable. Returns `None` for an empty list.
pub fn percentile(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() {
        None
    } else {
        Some(nearest_rank(sorted, p))
    }
}

fn nearest_rank(sorted: &[f64], p: f64) -> f64 {
    let idx = (sorted.len() as f64 * p).floor() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn ratio(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.
    } else {
        part as f64 / total as f64
    }
}

fn endpoint_breakdown(outcomes: &[Outcome]) -> Vec<EndpointStats> {
    let mut groups: BTreeMap<&str, Vec<&Outcome>> = BTreeMap::new();
    for outcome in outcomes {
        groups.entry(outcome.endpoint.as_str()).or_default().push(outcome);
    }

    groups
        .into_iter()
        .map(|(endpoint, group)| {
            let times: Vec<f64> = group
                .iter()
                .filter(|o| o.success)
                .map(|o| o.response_time)
                .collect();
            EndpointStats {
                endpoint: endpoint.to_string(),
                requests: group.len(),
                successful: times.len(),
                mean_response_time: if times.is_empty() {
                    0.
                } else {
                    statistical::mean(&times)
                },
            }
        })
        .collect()
}

fn failure_breakdown(outcomes: &[Outcome]) -> Vec<(String, usize)> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for outcome in outcomes.iter().filter(|o| !o.success) {
        *counts.entry(outcome.failure_reason()).or_default() += 1;
    }

    let mut counts: Vec<_> = counts.into_iter().collect();
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts
}
