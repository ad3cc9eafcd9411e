//! Stand-in inference service with the same routes as the real one, plus fault injection.
use axum::{
    debug_handler,
    extract::{Multipart, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
#[allow(unused)]
use metrics::{counter, gauge, histogram};
use rand_distr::{Distribution, Normal};
use serde::Deserialize;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::{
    num::NonZeroU32,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tower_http::trace::TraceLayer;
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct MockConfig {
    /// Mean time spent "inferring" per predict request.
    pub delay: Duration,
    /// Standard deviation of normally distributed noise added to `delay`.
    pub jitter: Duration,
    /// Every n-th predict request answers 500.
    pub fail_every: Option<u64>,
    /// Every n-th predict request answers 200 without a `predictions` field.
    pub malformed_every: Option<u64>,
    /// Predict requests beyond this rate answer 503.
    pub max_tps: Option<NonZeroU32>,
}

struct MockState {
    config: MockConfig,
    limiter: Option<DefaultDirectRateLimiter>,
    predictions: AtomicU64,
}

#[derive(Debug, Deserialize)]
pub struct PredictParams {
    #[serde(default)]
    return_image: bool,
}

pub fn router(config: MockConfig) -> Router {
    let limiter = config
        .max_tps
        .map(|tps| RateLimiter::direct(Quota::per_second(tps)));
    let state = Arc::new(MockState {
        config,
        limiter,
        predictions: AtomicU64::new(0),
    });

    Router::new()
        .route("/health", get(health))
        .route("/predict", post(predict))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run(addr: SocketAddr, config: MockConfig) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, router(config)).await?;
    Ok(())
}

/// Serve on an ephemeral loopback port in the background and return the bound address.
pub async fn spawn(config: MockConfig) -> anyhow::Result<SocketAddr> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let app = router(config);
    tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, app).await {
            tracing::error!("Mock service stopped: {err}");
        }
    });
    debug!("Mock service listening on {addr}");
    Ok(addr)
}

#[debug_handler]
async fn health() -> Json<Value> {
    counter!("mock_service.requests", "route" => "health").increment(1);
    TPS_MEASURE.fetch_add(1, Ordering::Relaxed);
    Json(json!({ "status": "healthy" }))
}

#[debug_handler]
async fn predict(
    State(state): State<Arc<MockState>>,
    Query(params): Query<PredictParams>,
    mut multipart: Multipart,
) -> Result<Json<Value>, StatusCode> {
    counter!("mock_service.requests", "route" => "predict").increment(1);
    TPS_MEASURE.fetch_add(1, Ordering::Relaxed);

    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| StatusCode::BAD_REQUEST)?
    {
        if field.name() == Some("file") {
            let bytes = field.bytes().await.map_err(|_| StatusCode::BAD_REQUEST)?;
            upload = Some(bytes.len());
        }
    }
    let Some(size) = upload else {
        return Err(StatusCode::UNPROCESSABLE_ENTITY);
    };

    if let Some(limiter) = &state.limiter {
        if limiter.check().is_err() {
            return Err(StatusCode::SERVICE_UNAVAILABLE);
        }
    }

    tokio::time::sleep(sample_delay(&state.config)).await;

    let n = state.predictions.fetch_add(1, Ordering::Relaxed) + 1;
    if state.config.fail_every.is_some_and(|k| k > 0 && n % k == 0) {
        debug!("Injecting failure on request {n}");
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    }
    if state.config.malformed_every.is_some_and(|k| k > 0 && n % k == 0) {
        debug!("Injecting malformed body on request {n}");
        return Ok(Json(json!({ "status": "ok" })));
    }

    let mut body = json!({
        "predictions": [
            { "class": "person", "confidence": 0.91, "bbox": [12, 20, 64, 128] },
        ],
        "upload_bytes": size,
    });
    if params.return_image {
        body["image"] = json!("/9j/");
    }
    Ok(Json(body))
}

fn sample_delay(config: &MockConfig) -> Duration {
    let mean = config.delay.as_secs_f64();
    match Normal::new(mean, config.jitter.as_secs_f64()) {
        Ok(normal) => Duration::from_secs_f64(normal.sample(&mut rand::thread_rng()).max(0.)),
        Err(_) => config.delay,
    }
}

/** TPS Printer **/

static TPS_MEASURE: AtomicU64 = AtomicU64::new(0);

pub async fn tps_measure_task() {
    loop {
        tokio::time::sleep(Duration::from_millis(1000)).await;
        let transactions = TPS_MEASURE.swap(0, Ordering::Relaxed);
        if transactions > 0 {
            println!("{transactions} TPS");
        }
    }
}
