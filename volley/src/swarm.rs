//! Duration-bound runs where simulated users pick request types at random.
//!
//! Each user loops until the deadline: draw a kind weighted by the test mix, run it, then pause
//! for a uniformly random wait. There is no precomputed plan and no ramp-up.
use crate::executor::Executor;
use crate::payload::PayloadGenerator;
use crate::transport::{HttpTransport, Transport};
use crate::{BenchError, BenchmarkReport};
use metrics_util::AtomicBucket;
use rand::{
    distributions::{Distribution, WeightedIndex},
    rngs::SmallRng,
    Rng, SeedableRng,
};
use std::{
    future::Future,
    num::NonZeroUsize,
    path::PathBuf,
    pin::Pin,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    task::{Context, Poll},
    time::Duration,
};
use tokio::task::JoinSet;
use tokio::time::Instant;
#[allow(unused_imports)]
use tracing::{debug, error, info, instrument, trace, warn, Instrument};
use volley_core::{
    BenchConfig, Outcome, Profile, RunHeader, RunShape, RunStatistics, DEFAULT_CONCURRENCY,
    DEFAULT_SWARM_DURATION, DEFAULT_WAIT_TIME,
};

type RunnerFut = Pin<Box<dyn Future<Output = Result<BenchmarkReport, BenchError>> + Send>>;

#[derive(Debug, Clone)]
struct SwarmSettings {
    config: BenchConfig,
    target: String,
    users: NonZeroUsize,
    duration: Duration,
    wait_time: (Duration, Duration),
    image_pool: Option<PathBuf>,
}

/// `users` independent request loops running for `duration`.
///
/// Requests still in flight at the deadline are dropped and do not appear in the report.
///
/// # Example
/// ```no_run
/// use volley::prelude::*;
/// use std::time::Duration;
///
/// # async fn run(config: BenchConfig) -> Result<(), BenchError> {
/// let profile = config.profile("load")?.clone();
/// let report = Swarm::new(config, "http://localhost:8000")
///     .profile(&profile)
///     .duration(Duration::from_secs(300))
///     .await?;
/// println!("{}", report.statistics);
/// # Ok(())
/// # }
/// ```
#[pin_project::pin_project]
pub struct Swarm<T = HttpTransport> {
    settings: SwarmSettings,
    transport: Option<Result<T, BenchError>>,
    runner_fut: Option<RunnerFut>,
}

impl Swarm<HttpTransport> {
    pub fn new(config: BenchConfig, target: impl Into<String>) -> Self {
        let image_pool = config.image_pool.clone();
        Self {
            settings: SwarmSettings {
                config,
                target: target.into(),
                users: NonZeroUsize::new(DEFAULT_CONCURRENCY).unwrap_or(NonZeroUsize::MIN),
                duration: DEFAULT_SWARM_DURATION,
                wait_time: DEFAULT_WAIT_TIME,
                image_pool,
            },
            transport: Some(HttpTransport::new().map_err(BenchError::from)),
            runner_fut: None,
        }
    }
}

impl<T> Swarm<T> {
    pub fn users(mut self, users: NonZeroUsize) -> Self {
        self.settings.users = users;
        self
    }

    pub fn duration(mut self, duration: Duration) -> Self {
        self.settings.duration = duration;
        self
    }

    /// Pause between a user's requests, drawn uniformly from `[min, max]`.
    pub fn wait_time(mut self, min: Duration, max: Duration) -> Self {
        self.settings.wait_time = (min.min(max), max.max(min));
        self
    }

    /// Take users, and duration and wait time where the profile sets them.
    pub fn profile(mut self, profile: &Profile) -> Self {
        if let Some(users) = NonZeroUsize::new(profile.users) {
            self.settings.users = users;
        }
        if let Some(duration) = profile.duration {
            self.settings.duration = duration;
        }
        if let Some((min, max)) = profile.wait_time {
            self = self.wait_time(min, max);
        }
        self
    }

    pub fn image_pool(mut self, dir: impl Into<PathBuf>) -> Self {
        self.settings.image_pool = Some(dir.into());
        self
    }

    pub fn with_transport<U>(self, transport: U) -> Swarm<U> {
        Swarm {
            settings: self.settings,
            transport: Some(Ok(transport)),
            runner_fut: None,
        }
    }

    pub fn header(&self) -> RunHeader {
        RunHeader {
            target: self.settings.target.clone(),
            concurrency: self.settings.users.get(),
            shape: RunShape::Swarm {
                duration: self.settings.duration,
            },
            mix: self.settings.config.test_mix,
        }
    }
}

impl<T> Future for Swarm<T>
where
    T: Transport + Sync + 'static,
{
    type Output = Result<BenchmarkReport, BenchError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        if this.runner_fut.is_none() {
            let settings = this.settings.clone();
            let transport = this.transport.take();
            *this.runner_fut = Some(Box::pin(async move {
                match transport {
                    Some(transport) => run_swarm(settings, transport?).await,
                    None => unreachable!("transport is only taken once"),
                }
            }));
        }

        match this.runner_fut {
            Some(runner) => runner.as_mut().poll(cx),
            None => unreachable!(),
        }
    }
}

#[instrument(name = "swarm", skip_all, fields(target = %settings.target))]
async fn run_swarm<T>(settings: SwarmSettings, transport: T) -> Result<BenchmarkReport, BenchError>
where
    T: Transport + Sync + 'static,
{
    let SwarmSettings {
        config,
        target,
        users,
        duration,
        wait_time,
        image_pool,
    } = settings;

    let weights = config.test_mix.weights();
    let picker = WeightedIndex::new(weights.iter().map(|(_, weight)| *weight))?;

    let payloads = match &image_pool {
        Some(dir) => PayloadGenerator::from_dir(dir)?,
        None => PayloadGenerator::synthetic(),
    };
    let executor = Arc::new(Executor::from_config(target, &config, transport, payloads));
    let bucket = Arc::new(AtomicBucket::new());
    let dropped = Arc::new(AtomicUsize::new(0));

    info!(
        "Starting {users} users against {} for {}",
        executor.base_url(),
        humantime::format_duration(duration)
    );

    let start = Instant::now();
    let deadline = start + duration;
    let mut set = JoinSet::new();
    for user in 0..users.get() {
        let executor = executor.clone();
        let bucket = bucket.clone();
        let dropped = dropped.clone();
        let picker = picker.clone();
        set.spawn(
            async move {
                let mut rng = SmallRng::from_entropy();
                let mut sent = 0usize;
                while Instant::now() < deadline {
                    let kind = weights[picker.sample(&mut rng)].0;
                    match tokio::time::timeout_at(deadline, executor.execute(kind)).await {
                        Ok(outcome) => bucket.push(outcome),
                        Err(_) => {
                            dropped.fetch_add(1, Ordering::Relaxed);
                            break;
                        }
                    }
                    sent += 1;

                    let pause = rng.gen_range(wait_time.0..=wait_time.1);
                    tokio::time::sleep_until(deadline.min(Instant::now() + pause)).await;
                }
                trace!("User finished after {sent} requests");
            }
            .instrument(tracing::debug_span!("user", id = user)),
        );
    }

    while let Some(res) = set.join_next().await {
        if let Err(err) = res {
            error!("User task did not complete: {err}");
        }
    }
    let elapsed = start.elapsed();

    let mut outcomes: Vec<Outcome> = Vec::new();
    bucket.clear_with(|chunk| outcomes.extend_from_slice(chunk));
    let dropped = dropped.load(Ordering::Relaxed);
    if dropped > 0 {
        info!("Dropped {dropped} requests still in flight at the deadline");
    }

    let statistics = RunStatistics::from_outcomes(&outcomes, elapsed, config.thresholds.as_ref());
    info!(
        "Swarm complete: {}/{} successful",
        statistics.successful, statistics.total
    );

    Ok(BenchmarkReport {
        outcomes,
        statistics,
        elapsed,
        dropped,
    })
}
