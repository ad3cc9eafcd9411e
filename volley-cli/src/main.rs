//! `volley` command line driver.
//!
//! Loads the YAML config, resolves target and load shape, runs a planned benchmark (or a swarm
//! with `--swarm`), prints the report and maps threshold verdicts onto the exit status.
use anyhow::{anyhow, Context, Result};
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::num::{NonZeroU32, NonZeroUsize};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
#[allow(unused)]
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use volley::core::{RunHeader, Target};
use volley::prelude::*;

const DEFAULT_LOG_FILTER: &str = "volley=info";

/// Any threshold check failed.
const THRESHOLD_FAILURE: u8 = 2;
/// The run could not be set up.
const SETUP_FAILURE: u8 = 1;

#[derive(Parser, Debug)]
#[command(version, about = "Benchmark an HTTP inference service")]
struct VolleyCli {
    /// YAML configuration file
    #[arg(long, env = "VOLLEY_CONFIG", default_value = "config.yaml")]
    config: PathBuf,

    /// Named environment from the config (default `local`)
    #[arg(short, long)]
    env: Option<String>,

    /// Named test profile from the config
    #[arg(short, long)]
    profile: Option<String>,

    /// Target base URL; overrides `--env`
    #[arg(short, long)]
    url: Option<String>,

    /// Maximum requests in flight (users, with `--swarm`)
    #[arg(short, long)]
    concurrent: Option<usize>,

    /// Total number of requests to plan
    #[arg(short = 'n', long)]
    requests: Option<usize>,

    /// Directory of JPEG images to upload instead of synthetic noise
    #[arg(long)]
    images: Option<PathBuf>,

    /// Cap dispatch at this many requests per second
    #[arg(long)]
    tps: Option<NonZeroU32>,

    /// Run weighted-random users for a fixed duration instead of a planned request count
    #[arg(long)]
    swarm: bool,

    /// Swarm run length, e.g. `90s` or `5m`
    #[arg(long, value_parser = humantime::parse_duration)]
    duration: Option<Duration>,

    /// Serve Prometheus metrics on this address while the run is in progress
    #[arg(long)]
    prometheus: Option<SocketAddr>,

    /// Always exit 0 once the run completes, even if thresholds fail
    #[arg(long)]
    ignore_thresholds: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    FmtSubscriber::builder().with_env_filter(filter).init();

    let args = VolleyCli::parse();
    match run(args).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::from(SETUP_FAILURE)
        }
    }
}

async fn run(args: VolleyCli) -> Result<ExitCode> {
    if let Some(addr) = args.prometheus {
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("Failed to install Prometheus exporter")?;
        info!("Serving metrics on {addr}");
    }

    let config = BenchConfig::from_file(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;
    let target = config.target(args.url.as_deref(), args.env.as_deref())?;
    describe(&target);
    if let Some(profile) = &args.profile {
        let description = &config.profile(profile)?.description;
        info!("Profile: {profile} ({description})");
    }

    let report = if args.swarm {
        swarm(&args, config, &target).await?
    } else {
        planned(&args, config, &target).await?
    };

    println!();
    println!("{}", report.statistics);
    if report.dropped > 0 {
        println!("{} requests were still in flight at the deadline", report.dropped);
    }

    Ok(exit_code(&report, args.ignore_thresholds))
}

async fn planned(
    args: &VolleyCli,
    config: BenchConfig,
    target: &Target,
) -> Result<BenchmarkReport> {
    if args.duration.is_some() {
        warn!("--duration only applies to --swarm runs");
    }

    let shape = config.load_shape(args.profile.as_deref(), args.concurrent, args.requests)?;
    let mut benchmark = Benchmark::new(config, target.url.clone()).load_shape(shape);
    if let Some(tps) = args.tps {
        benchmark = benchmark.tps(tps);
    }
    if let Some(dir) = &args.images {
        benchmark = benchmark.image_pool(dir);
    }

    print_header(benchmark.header());
    Ok(benchmark.await?)
}

async fn swarm(
    args: &VolleyCli,
    config: BenchConfig,
    target: &Target,
) -> Result<BenchmarkReport> {
    if args.tps.is_some() {
        warn!("--tps is ignored for --swarm runs");
    }
    if args.requests.is_some() {
        warn!("--requests is ignored for --swarm runs");
    }

    let profile = match &args.profile {
        Some(name) => Some(config.profile(name)?.clone()),
        None => None,
    };

    let mut swarm = Swarm::new(config, target.url.clone());
    if let Some(profile) = &profile {
        swarm = swarm.profile(profile);
    }
    if let Some(users) = args.concurrent {
        let users = NonZeroUsize::new(users)
            .ok_or_else(|| anyhow!("--concurrent must be at least 1"))?;
        swarm = swarm.users(users);
    }
    if let Some(duration) = args.duration {
        swarm = swarm.duration(duration);
    }
    if let Some(dir) = &args.images {
        swarm = swarm.image_pool(dir);
    }

    print_header(swarm.header());
    Ok(swarm.await?)
}

fn describe(target: &Target) {
    match (&target.environment, &target.description) {
        (Some(env), Some(description)) => info!("Environment: {env} ({description})"),
        (Some(env), None) => info!("Environment: {env}"),
        _ => debug!("Using explicit target URL"),
    }
}

fn print_header(header: RunHeader) {
    println!("{header}");
}

fn exit_code(report: &BenchmarkReport, ignore_thresholds: bool) -> ExitCode {
    ExitCode::from(exit_status(report, ignore_thresholds))
}

fn exit_status(report: &BenchmarkReport, ignore_thresholds: bool) -> u8 {
    match report.passed() {
        Some(false) if !ignore_thresholds => {
            warn!("One or more threshold checks failed");
            THRESHOLD_FAILURE
        }
        _ => 0,
    }
}
