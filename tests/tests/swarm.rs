mod utils;
#[allow(unused)]
use utils::*;

mod tests {
    use super::*;
    use mock_service::MockConfig;
    use std::num::NonZeroUsize;
    use std::time::Duration;
    use volley::prelude::*;

    #[tokio::test]
    #[ntest::timeout(60000)]
    async fn swarm_with_profile() {
        let url = mock(MockConfig {
            delay: Duration::from_millis(10),
            ..Default::default()
        })
        .await;
        let config = config_for(&url);
        let profile = config.profile("smoke").unwrap().clone();

        let report = Swarm::new(config, url.as_str())
            .profile(&profile)
            .await
            .unwrap();

        let stats = &report.statistics;
        assert!(stats.total >= 10, "only {} requests", stats.total);
        assert_eq!(stats.failed, 0);
        assert!(report.elapsed >= Duration::from_secs(2));
        assert!(report.elapsed < Duration::from_secs(4));
    }

    #[tokio::test]
    #[ntest::timeout(60000)]
    async fn swarm_counts_service_failures() {
        let url = mock(MockConfig {
            fail_every: Some(2),
            ..Default::default()
        })
        .await;

        let report = Swarm::new(config_for(&url), url.as_str())
            .users(NonZeroUsize::new(4).unwrap())
            .duration(Duration::from_secs(1))
            .wait_time(Duration::from_millis(10), Duration::from_millis(20))
            .await
            .unwrap();

        let stats = &report.statistics;
        assert!(stats.failed > 0);
        assert!(stats.successful > 0);
        assert!(stats
            .failures
            .iter()
            .all(|(reason, _)| reason == "HTTP 500"));
    }

    /// Sustained run to eyeball throughput numbers; slow, so only with `--features integration`.
    #[cfg(feature = "integration")]
    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    #[ntest::timeout(300000)]
    async fn sustained_swarm() {
        let url = mock(MockConfig {
            delay: Duration::from_millis(20),
            jitter: Duration::from_millis(5),
            ..Default::default()
        })
        .await;

        let report = Swarm::new(config_for(&url), url.as_str())
            .users(NonZeroUsize::new(50).unwrap())
            .duration(Duration::from_secs(60))
            .wait_time(Duration::from_millis(50), Duration::from_millis(150))
            .await
            .unwrap();

        println!("{}", report.statistics);
        assert!(report.statistics.throughput > 100.);
    }
}
