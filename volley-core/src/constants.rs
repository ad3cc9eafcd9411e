use std::time::Duration;

/// Concurrency used when neither a profile nor `--concurrent` is given.
pub const DEFAULT_CONCURRENCY: usize = 10;

/// Total request count used when neither a profile nor `--requests` is given.
pub const DEFAULT_TOTAL_REQUESTS: usize = 100;

/// A named profile only carries a user count; the planned run issues this many requests per
/// user unless overridden.
pub const REQUESTS_PER_USER: usize = 10;

/// Environment picked when no `--url` or `--env` is supplied.
pub const DEFAULT_ENVIRONMENT: &str = "local";

pub const DEFAULT_HEALTH_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_PREDICT_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_LARGE_TIMEOUT: Duration = Duration::from_secs(120);

/// JPEG quality for re-encoded pool images. Synthetic images keep the encoder default.
pub const POOL_JPEG_QUALITY: u8 = 95;

/// Emit a progress line every this many completed requests.
pub const PROGRESS_INTERVAL: usize = 10;

/// Default run length for the swarm driver.
pub const DEFAULT_SWARM_DURATION: Duration = Duration::from_secs(60);

/// Default per-user pause between swarm requests.
pub const DEFAULT_WAIT_TIME: (Duration, Duration) =
    (Duration::from_secs(1), Duration::from_secs(3));

pub const DEFAULT_MAX_FAILURE_RATE: f64 = 0.01;
pub const DEFAULT_MAX_P95_RESPONSE_TIME: f64 = 2.0;
pub const DEFAULT_MAX_P99_RESPONSE_TIME: f64 = 5.0;
pub const DEFAULT_MIN_REQUESTS_PER_SECOND: f64 = 10.;
