mod utils;
#[allow(unused)]
use utils::*;

mod tests {
    use super::*;
    use mock_service::MockConfig;
    use ntest::assert_about_eq;
    use std::num::{NonZeroU32, NonZeroUsize};
    use std::time::Duration;
    use volley::core::{RequestKind, TestMix, ThresholdSet};
    use volley::prelude::*;

    #[tokio::test]
    #[ntest::timeout(60000)]
    async fn planned_run_against_mock() {
        let url = mock(MockConfig {
            delay: Duration::from_millis(5),
            fail_every: Some(10),
            ..Default::default()
        })
        .await;
        let config = config_for(&url);
        let target = config.target(None, None).unwrap();
        assert_eq!(target.url, url);

        let report = Benchmark::new(config, target.url)
            .concurrency(NonZeroUsize::new(10).unwrap())
            .requests(100)
            .await
            .unwrap();

        let stats = &report.statistics;
        assert_eq!(report.outcomes.len(), 100);
        assert_eq!(stats.total, 100);
        // 90 predict requests, every 10th rejected by the service
        assert_eq!(stats.failed, 9);
        assert_eq!(stats.failures, vec![("HTTP 500".to_string(), 9)]);
        assert_about_eq!(stats.success_rate, 0.91);

        let latency = stats.latency.as_ref().unwrap();
        assert!(latency.min > 0.);
        assert!(latency.p50 <= latency.p99);

        let health = stats
            .endpoints
            .iter()
            .find(|e| e.endpoint == "/health")
            .unwrap();
        assert_eq!(health.requests, 10);
        assert_eq!(health.successful, 10);
    }

    #[tokio::test]
    #[ntest::timeout(60000)]
    async fn malformed_bodies_are_failures() {
        let url = mock(MockConfig {
            malformed_every: Some(5),
            ..Default::default()
        })
        .await;
        let mut config = config_for(&url);
        config.test_mix = TestMix {
            health_check: 0.,
            predict_no_image: 0.,
            predict_with_image: 1.,
            predict_large_image: 0.,
        };

        let report = Benchmark::new(config, url.as_str())
            .concurrency(NonZeroUsize::new(5).unwrap())
            .requests(50)
            .await
            .unwrap();

        let stats = &report.statistics;
        assert_eq!(stats.failed, 10);
        assert_eq!(
            stats.failures,
            vec![("Response missing 'predictions' field".to_string(), 10)]
        );
        assert!(report
            .outcomes
            .iter()
            .all(|o| o.endpoint == RequestKind::PredictWithImage.endpoint() && o.status_code == 200));
    }

    #[tokio::test]
    #[ntest::timeout(60000)]
    async fn unreachable_target_yields_failed_outcomes() {
        init();
        let config = config_for("http://127.0.0.1:1");

        let report = Benchmark::new(config, "http://127.0.0.1:1")
            .concurrency(NonZeroUsize::new(4).unwrap())
            .requests(12)
            .await
            .unwrap();

        let stats = &report.statistics;
        assert_eq!(stats.total, 12);
        assert_eq!(stats.failed, 12);
        assert!(report.outcomes.iter().all(|o| o.status_code == 0));
        assert!(stats.latency.is_none());
        assert!(stats.thresholds.is_none());
        assert!(stats.to_string().contains("Percentiles: undefined"));
    }

    #[tokio::test]
    #[ntest::timeout(60000)]
    async fn thresholds_and_metrics() {
        let handle = init();
        let url = mock(MockConfig::default()).await;
        let mut config = config_for(&url);
        config.thresholds = Some(ThresholdSet {
            min_requests_per_second: 1_000_000.,
            ..Default::default()
        });

        let report = Benchmark::new(config, url.as_str())
            .requests(30)
            .tps(NonZeroU32::new(1_000).unwrap())
            .await
            .unwrap();

        assert_eq!(report.statistics.failed, 0);
        assert_eq!(report.passed(), Some(false));
        let text = report.statistics.to_string();
        assert!(text.contains("Failure Rate: 0.00% (max: 1.00%) ✓ PASS"));
        assert!(text.contains("✗ FAIL"));

        let rendered = handle.render();
        assert!(rendered.contains("volley_requests_success"));
        assert!(rendered.contains("volley_request_latency"));
    }

    #[tokio::test]
    #[ntest::timeout(60000)]
    async fn image_pool_uploads() {
        let url = mock(MockConfig::default()).await;
        let dir = std::env::temp_dir().join(format!("volley-it-pool-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        // no JPEGs in the directory, so payloads fall back to synthetic images
        std::fs::write(dir.join("README"), b"empty pool").unwrap();

        let report = Benchmark::new(config_for(&url), url.as_str())
            .requests(10)
            .image_pool(&dir)
            .await
            .unwrap();

        assert_eq!(report.statistics.successful, 10);
    }
}
