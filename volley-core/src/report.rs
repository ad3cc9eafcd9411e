use crate::{RunStatistics, TestMix, ThresholdKind, Verdict};
use std::fmt;
use std::time::Duration;

const RULE_WIDTH: usize = 70;

/// How a run drives its load, as shown in the report header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunShape {
    Planned { total_requests: usize },
    Swarm { duration: Duration },
}

/// Printed before any request is dispatched.
#[derive(Debug, Clone)]
pub struct RunHeader {
    pub target: String,
    pub concurrency: usize,
    pub shape: RunShape,
    pub mix: TestMix,
}

impl fmt::Display for RunHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", "=".repeat(RULE_WIDTH))?;
        writeln!(f, "Inference Service Benchmark")?;
        writeln!(f, "{}", "=".repeat(RULE_WIDTH))?;
        writeln!(f, "Target URL: {}", self.target)?;
        writeln!(f, "Concurrent users: {}", self.concurrency)?;
        match self.shape {
            RunShape::Planned { total_requests } => {
                writeln!(f, "Total requests: {total_requests}")?
            }
            RunShape::Swarm { duration } => writeln!(
                f,
                "Duration: {}",
                humantime::format_duration(duration)
            )?,
        }
        let mix = self
            .mix
            .weights()
            .iter()
            .map(|(kind, ratio)| format!("{kind}={ratio}"))
            .collect::<Vec<_>>()
            .join(", ");
        writeln!(f, "Test distribution: {mix}")?;
        write!(f, "{}", "-".repeat(RULE_WIDTH))
    }
}

impl fmt::Display for RunStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", "=".repeat(RULE_WIDTH))?;
        writeln!(f, "BENCHMARK RESULTS")?;
        writeln!(f, "{}", "=".repeat(RULE_WIDTH))?;

        writeln!(f)?;
        writeln!(f, "Total requests: {}", self.total)?;
        writeln!(f, "Successful: {}", self.successful)?;
        writeln!(f, "Failed: {}", self.failed)?;
        writeln!(f, "Success rate: {:.2}%", self.success_rate * 100.)?;
        writeln!(f, "Total time: {:.2}s", self.elapsed.as_secs_f64())?;
        writeln!(f, "Requests/second: {:.2}", self.throughput)?;

        writeln!(f)?;
        match &self.latency {
            Some(latency) => {
                writeln!(f, "Response times (successful requests):")?;
                writeln!(f, "  Min: {:.3}s", latency.min)?;
                writeln!(f, "  Max: {:.3}s", latency.max)?;
                writeln!(f, "  Mean: {:.3}s", latency.mean)?;
                writeln!(f, "  Median: {:.3}s", latency.median)?;
                match latency.std_dev {
                    Some(std_dev) => writeln!(f, "  Std Dev: {std_dev:.3}s")?,
                    None => writeln!(f, "  Std Dev: undefined (single sample)")?,
                }

                writeln!(f)?;
                writeln!(f, "Percentiles:")?;
                writeln!(f, "  50th: {:.3}s", latency.p50)?;
                writeln!(f, "  90th: {:.3}s", latency.p90)?;
                writeln!(f, "  95th: {:.3}s", latency.p95)?;
                writeln!(f, "  99th: {:.3}s", latency.p99)?;
            }
            None => {
                writeln!(f, "Response times: undefined (no successful requests)")?;
                writeln!(f, "Percentiles: undefined (no successful requests)")?;
            }
        }

        writeln!(f)?;
        writeln!(f, "Breakdown by endpoint:")?;
        for endpoint in &self.endpoints {
            writeln!(f, "  {}", endpoint.endpoint)?;
            writeln!(
                f,
                "    Requests: {}, Success: {}, Avg time: {:.3}s",
                endpoint.requests, endpoint.successful, endpoint.mean_response_time
            )?;
        }

        if let Some(checks) = &self.thresholds {
            writeln!(f)?;
            writeln!(f, "Threshold Checks:")?;
            for check in checks {
                let status = match check.verdict {
                    Verdict::Pass => "✓ PASS",
                    Verdict::Fail => "✗ FAIL",
                };
                let label = check.kind.label();
                match check.kind {
                    ThresholdKind::FailureRate => writeln!(
                        f,
                        "  {label}: {:.2}% (max: {:.2}%) {status}",
                        check.actual * 100.,
                        check.bound * 100.
                    )?,
                    ThresholdKind::P95ResponseTime | ThresholdKind::P99ResponseTime => writeln!(
                        f,
                        "  {label}: {:.3}s (max: {}s) {status}",
                        check.actual, check.bound
                    )?,
                    ThresholdKind::RequestsPerSecond => writeln!(
                        f,
                        "  {label}: {:.2} (min: {}) {status}",
                        check.actual, check.bound
                    )?,
                }
            }
        }

        if !self.failures.is_empty() {
            writeln!(f)?;
            writeln!(f, "Failed requests details:")?;
            for (reason, count) in &self.failures {
                writeln!(f, "  {reason}: {count} occurrences")?;
            }
        }

        write!(f, "{}", "=".repeat(RULE_WIDTH))
    }
}
