//! Request executors: one async unit of work per request type, each yielding one [`Outcome`].
use crate::payload::PayloadGenerator;
use crate::transport::{Reply, Transport, TransportError, Upload};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace, warn};
use volley_core::{BenchConfig, Dimensions, ImageSizes, Outcome, RequestKind, Timeouts};

const MISSING_PREDICTIONS: &str = "Response missing 'predictions' field";

/// Runs single requests against one target. Every failure below this boundary is folded into
/// the returned Outcome.
#[derive(Debug, Clone)]
pub struct Executor<T> {
    base_url: String,
    transport: T,
    payloads: PayloadGenerator,
    image_sizes: ImageSizes,
    timeouts: Timeouts,
}

impl<T> Executor<T>
where
    T: Transport + Sync,
{
    pub fn new(
        base_url: impl Into<String>,
        transport: T,
        payloads: PayloadGenerator,
        image_sizes: ImageSizes,
        timeouts: Timeouts,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            transport,
            payloads,
            image_sizes,
            timeouts,
        }
    }

    pub fn from_config(
        base_url: impl Into<String>,
        config: &BenchConfig,
        transport: T,
        payloads: PayloadGenerator,
    ) -> Self {
        Self::new(
            base_url,
            transport,
            payloads,
            config.image_sizes,
            config.timeouts,
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn execute(&self, kind: RequestKind) -> Outcome {
        let outcome = match kind {
            RequestKind::Health => self.health().await,
            RequestKind::PredictNoImage | RequestKind::PredictWithImage => {
                self.predict(kind, self.image_sizes.small, "test_image.jpg")
                    .await
            }
            RequestKind::PredictLarge => {
                self.predict(kind, self.image_sizes.large, "test_large_image.jpg")
                    .await
            }
        };

        if outcome.success {
            trace!(
                "{} -> {} in {:.3}s",
                outcome.endpoint,
                outcome.status_code,
                outcome.response_time
            );
        } else {
            debug!(
                "{} failed ({}) in {:.3}s",
                outcome.endpoint,
                outcome.failure_reason(),
                outcome.response_time
            );
        }

        #[cfg(feature = "metrics")]
        record_metrics(&outcome);

        outcome
    }

    /// `GET {base}/health`; success iff the status is 200.
    pub async fn health(&self) -> Outcome {
        let endpoint = RequestKind::Health.endpoint();
        let url = format!("{}{endpoint}", self.base_url);
        let timeout = self.timeouts.health;

        let start = Instant::now();
        let res = with_timeout(timeout, self.transport.get(&url)).await;
        let elapsed = start.elapsed();

        match res {
            Ok(reply) if reply.status == 200 => Outcome::success(endpoint, reply.status, elapsed),
            Ok(reply) => Outcome::rejected(endpoint, reply.status, elapsed, None),
            Err(err) => transport_failure(endpoint, elapsed, err),
        }
    }

    /// `POST {base}/predict?return_image=…` with one JPEG upload; success iff the status is 200
    /// and the JSON body carries a `predictions` key.
    async fn predict(
        &self,
        kind: RequestKind,
        dims: Dimensions,
        file_name: &'static str,
    ) -> Outcome {
        let endpoint = kind.endpoint();
        let url = format!("{}{endpoint}", self.base_url);
        let timeout = self.timeouts.for_kind(kind);

        let bytes = match self.payloads.generate(dims) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!("Payload generation failed: {err}");
                return Outcome::transport_failure(endpoint, Duration::ZERO, err.to_string());
            }
        };

        let start = Instant::now();
        let upload = Upload::jpeg(file_name, bytes);
        let res = with_timeout(timeout, self.transport.post_file(&url, upload)).await;
        let elapsed = start.elapsed();

        match res {
            Ok(reply) if reply.status == 200 => match check_predictions(&reply) {
                Ok(()) => Outcome::success(endpoint, reply.status, elapsed),
                Err(reason) => Outcome::rejected(endpoint, reply.status, elapsed, Some(reason)),
            },
            Ok(reply) => Outcome::rejected(endpoint, reply.status, elapsed, None),
            Err(err) => transport_failure(endpoint, elapsed, err),
        }
    }
}

async fn with_timeout<F>(timeout: Duration, fut: F) -> Result<Reply, TransportError>
where
    F: Future<Output = Result<Reply, TransportError>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(res) => res,
        Err(_) => Err(TransportError::Timeout(timeout)),
    }
}

fn transport_failure(endpoint: &str, elapsed: Duration, err: TransportError) -> Outcome {
    warn!("{endpoint}: {err}");
    Outcome::transport_failure(endpoint, elapsed, err.to_string())
}

fn check_predictions(reply: &Reply) -> Result<(), String> {
    match serde_json::from_slice::<serde_json::Value>(&reply.body) {
        Ok(serde_json::Value::Object(body)) if body.contains_key("predictions") => Ok(()),
        Ok(_) => Err(MISSING_PREDICTIONS.to_string()),
        Err(err) => Err(format!("Failed to parse JSON: {err}")),
    }
}

#[cfg(feature = "metrics")]
fn record_metrics(outcome: &Outcome) {
    let endpoint = outcome.endpoint.clone();
    metrics::histogram!("volley_request_latency", "endpoint" => endpoint.clone())
        .record(outcome.response_time);
    if outcome.success {
        metrics::counter!("volley_requests_success", "endpoint" => endpoint).increment(1);
    } else {
        metrics::counter!("volley_requests_error", "endpoint" => endpoint).increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Behaviour, FakeTransport};
    use ntest::assert_about_eq;

    fn executor(transport: FakeTransport) -> Executor<FakeTransport> {
        let sizes = ImageSizes {
            small: Dimensions(32, 24),
            medium: Dimensions(48, 32),
            large: Dimensions(64, 48),
        };
        let timeouts = Timeouts {
            health: Duration::from_secs(1),
            predict: Duration::from_secs(2),
            large: Duration::from_secs(4),
        };
        Executor::new(
            "http://svc.test/",
            transport,
            PayloadGenerator::synthetic(),
            sizes,
            timeouts,
        )
    }

    #[tokio::test]
    async fn health_success() {
        let transport = FakeTransport::new(|_, _| Behaviour::reply(200, "ok"));
        let outcome = executor(transport.clone()).execute(RequestKind::Health).await;

        assert!(outcome.success);
        assert_eq!(outcome.endpoint, "/health");
        assert_eq!(outcome.status_code, 200);
        assert_eq!(outcome.error, None);
        assert_eq!(transport.urls(), vec!["http://svc.test/health"]);
    }

    #[tokio::test]
    async fn health_non_200_is_failure_without_error() {
        let transport = FakeTransport::new(|_, _| Behaviour::reply(503, "down"));
        let outcome = executor(transport).execute(RequestKind::Health).await;

        assert!(!outcome.success);
        assert_eq!(outcome.status_code, 503);
        assert_eq!(outcome.error, None);
        assert_eq!(outcome.failure_reason(), "HTTP 503");
    }

    #[tokio::test]
    async fn predict_variants_use_their_route_and_size() {
        let transport =
            FakeTransport::new(|_, _| Behaviour::reply(200, r#"{"predictions": []}"#));
        let executor = executor(transport.clone());

        let with_image = executor.execute(RequestKind::PredictWithImage).await;
        assert!(with_image.success);
        assert_eq!(with_image.endpoint, "/predict?return_image=true");

        let large = executor.execute(RequestKind::PredictLarge).await;
        assert!(large.success);
        assert_eq!(large.endpoint, "/predict?return_image=false");

        assert_eq!(
            transport.urls(),
            vec![
                "http://svc.test/predict?return_image=true",
                "http://svc.test/predict?return_image=false",
            ]
        );

        let uploads = transport.uploads();
        assert_eq!(uploads[0].field, "file");
        assert_eq!(uploads[0].content_type, "image/jpeg");
        assert_eq!(uploads[1].file_name, "test_large_image.jpg");
        let img = image::load_from_memory(&uploads[1].bytes).unwrap();
        assert_eq!((img.width(), img.height()), (64, 48));
    }

    #[tokio::test]
    async fn predict_requires_predictions_key() {
        let transport = FakeTransport::new(|_, _| Behaviour::reply(200, r#"{"image": "aGk="}"#));
        let outcome = executor(transport).execute(RequestKind::PredictNoImage).await;

        assert!(!outcome.success);
        assert_eq!(outcome.status_code, 200);
        assert_eq!(outcome.error.as_deref(), Some(MISSING_PREDICTIONS));
    }

    #[tokio::test]
    async fn predict_rejects_malformed_json() {
        let transport = FakeTransport::new(|_, _| Behaviour::reply(200, "<html>"));
        let outcome = executor(transport).execute(RequestKind::PredictNoImage).await;

        assert!(!outcome.success);
        assert!(outcome
            .error
            .as_deref()
            .unwrap()
            .starts_with("Failed to parse JSON"));
    }

    #[tokio::test]
    async fn transport_errors_become_outcomes() {
        let transport = FakeTransport::new(|_, _| Behaviour::fail("connection refused"));
        let outcome = executor(transport).execute(RequestKind::PredictWithImage).await;

        assert!(!outcome.success);
        assert_eq!(outcome.status_code, 0);
        assert_eq!(outcome.error.as_deref(), Some("connection refused"));
    }

    #[tracing_test::traced_test]
    #[tokio::test(start_paused = true)]
    async fn hangs_are_cut_off_by_the_kind_timeout() {
        let transport = FakeTransport::new(|_, _| Behaviour::Hang);
        let executor = executor(transport);

        let outcome = executor.execute(RequestKind::Health).await;
        assert_eq!(outcome.status_code, 0);
        assert_about_eq!(outcome.response_time, 1.0, 0.01);
        assert_eq!(outcome.error.as_deref(), Some("Request timed out after 1s"));

        let outcome = executor.execute(RequestKind::PredictLarge).await;
        assert_about_eq!(outcome.response_time, 4.0, 0.01);
        assert!(logs_contain("timed out"));
    }
}
