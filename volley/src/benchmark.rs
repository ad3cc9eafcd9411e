//! Planned benchmark runs
use crate::executor::Executor;
use crate::payload::PayloadGenerator;
use crate::planner::TrafficPlanner;
use crate::scheduler::Scheduler;
use crate::transport::{HttpTransport, Transport};
use crate::BenchError;
use std::{
    future::Future,
    num::{NonZeroU32, NonZeroUsize},
    path::PathBuf,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    time::Duration,
};
use tokio::time::Instant;
#[allow(unused_imports)]
use tracing::{debug, error, info, instrument, trace, warn};
use volley_core::{
    BenchConfig, LoadShape, Outcome, RunHeader, RunShape, RunStatistics, DEFAULT_CONCURRENCY,
    DEFAULT_TOTAL_REQUESTS,
};

type RunnerFut = Pin<Box<dyn Future<Output = Result<BenchmarkReport, BenchError>> + Send>>;

/// Everything a finished run produced.
#[derive(Debug, Clone)]
pub struct BenchmarkReport {
    /// In completion order.
    pub outcomes: Vec<Outcome>,
    pub statistics: RunStatistics,
    pub elapsed: Duration,
    /// Requests abandoned at a swarm deadline. Always zero for planned runs.
    pub dropped: usize,
}

impl BenchmarkReport {
    /// `None` when thresholds were not checked.
    pub fn passed(&self) -> Option<bool> {
        self.statistics.thresholds_passed()
    }
}

#[derive(Debug, Clone)]
struct RunSettings {
    config: BenchConfig,
    target: String,
    concurrency: NonZeroUsize,
    total_requests: usize,
    tps: Option<NonZeroU32>,
    image_pool: Option<PathBuf>,
}

/// A planned run of `total_requests` requests with at most `concurrency` in flight.
///
/// The run starts when the value is awaited.
///
/// # Example
/// ```no_run
/// use volley::prelude::*;
/// use std::num::{NonZeroU32, NonZeroUsize};
///
/// # async fn run(config: BenchConfig) -> Result<(), BenchError> {
/// let report = Benchmark::new(config, "http://localhost:8000")
///     .concurrency(NonZeroUsize::new(50).unwrap())
///     .requests(5_000)
///     .tps(NonZeroU32::new(200).unwrap())
///     .await?;
/// assert_eq!(report.outcomes.len(), 5_000);
/// # Ok(())
/// # }
/// ```
#[pin_project::pin_project]
pub struct Benchmark<T = HttpTransport> {
    settings: RunSettings,
    transport: Option<Result<T, BenchError>>,
    runner_fut: Option<RunnerFut>,
}

impl Benchmark<HttpTransport> {
    pub fn new(config: BenchConfig, target: impl Into<String>) -> Self {
        let image_pool = config.image_pool.clone();
        Self {
            settings: RunSettings {
                config,
                target: target.into(),
                concurrency: NonZeroUsize::new(DEFAULT_CONCURRENCY).unwrap_or(NonZeroUsize::MIN),
                total_requests: DEFAULT_TOTAL_REQUESTS,
                tps: None,
                image_pool,
            },
            transport: Some(HttpTransport::new().map_err(BenchError::from)),
            runner_fut: None,
        }
    }
}

impl<T> Benchmark<T> {
    pub fn concurrency(mut self, concurrency: NonZeroUsize) -> Self {
        self.settings.concurrency = concurrency;
        self
    }

    pub fn requests(mut self, total_requests: usize) -> Self {
        self.settings.total_requests = total_requests;
        self
    }

    /// Concurrency and request count in one go, as resolved by [`BenchConfig::load_shape`].
    pub fn load_shape(self, shape: LoadShape) -> Self {
        self.concurrency(shape.concurrency)
            .requests(shape.total_requests)
    }

    /// Additionally cap dispatch at `tps` requests per second.
    pub fn tps(mut self, tps: NonZeroU32) -> Self {
        self.settings.tps = Some(tps);
        self
    }

    /// Upload re-encoded images from `dir` instead of synthetic noise.
    pub fn image_pool(mut self, dir: impl Into<PathBuf>) -> Self {
        self.settings.image_pool = Some(dir.into());
        self
    }

    pub fn with_transport<U>(self, transport: U) -> Benchmark<U> {
        Benchmark {
            settings: self.settings,
            transport: Some(Ok(transport)),
            runner_fut: None,
        }
    }

    /// The request count shown is the planned one, which exceeds the configured count when the
    /// mix ratios sum past one.
    pub fn header(&self) -> RunHeader {
        let planned = TrafficPlanner::from_mix(&self.settings.config.test_mix)
            .plan(self.settings.total_requests)
            .len();
        RunHeader {
            target: self.settings.target.clone(),
            concurrency: self.settings.concurrency.get(),
            shape: RunShape::Planned {
                total_requests: planned,
            },
            mix: self.settings.config.test_mix,
        }
    }
}

impl<T> Future for Benchmark<T>
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
                    Some(transport) => run_benchmark(settings, transport?).await,
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

#[instrument(name = "benchmark", skip_all, fields(target = %settings.target))]
async fn run_benchmark<T>(settings: RunSettings, transport: T) -> Result<BenchmarkReport, BenchError>
where
    T: Transport + Sync + 'static,
{
    let RunSettings {
        config,
        target,
        concurrency,
        total_requests,
        tps,
        image_pool,
    } = settings;

    let payloads = match &image_pool {
        Some(dir) => PayloadGenerator::from_dir(dir)?,
        None => PayloadGenerator::synthetic(),
    };
    let executor = Arc::new(Executor::from_config(target, &config, transport, payloads));

    let plan = TrafficPlanner::from_mix(&config.test_mix).plan(total_requests);
    info!(
        "Running {} requests against {} with {concurrency} permits",
        plan.len(),
        executor.base_url()
    );

    let scheduler = Scheduler::new(concurrency).tps(tps);
    let start = Instant::now();
    let outcomes = scheduler
        .run(plan, move |kind| {
            let executor = executor.clone();
            async move { executor.execute(kind).await }
        })
        .await;
    let elapsed = start.elapsed();

    let statistics = RunStatistics::from_outcomes(&outcomes, elapsed, config.thresholds.as_ref());
    info!(
        "Benchmark complete: {}/{} successful in {}",
        statistics.successful,
        statistics.total,
        humantime::format_duration(Duration::from_millis(elapsed.as_millis() as u64))
    );

    Ok(BenchmarkReport {
        outcomes,
        statistics,
        elapsed,
        dropped: 0,
    })
}
