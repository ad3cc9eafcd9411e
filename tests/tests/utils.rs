use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use mock_service::MockConfig;
use std::net::SocketAddr;
use std::sync::OnceLock;
use tracing::error;
use tracing_subscriber::FmtSubscriber;
use volley::core::BenchConfig;

/// Installs logging and the metrics recorder once per test binary.
#[allow(unused)]
pub fn init() -> &'static PrometheusHandle {
    static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

    HANDLE.get_or_init(|| {
        let default_panic = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            default_panic(info);
            error!("Panic occurred: {info:?}");
        }));

        FmtSubscriber::builder()
            .with_env_filter("volley=debug,mock_service=debug,axum::rejection=trace")
            .init();

        PrometheusBuilder::new().install_recorder().unwrap()
    })
}

#[allow(unused)]
pub async fn mock(config: MockConfig) -> String {
    init();
    let addr: SocketAddr = mock_service::spawn(config).await.unwrap();
    format!("http://{addr}")
}

/// Config pointing the `local` environment at `url`, with small images so runs stay quick.
#[allow(unused)]
pub fn config_for(url: &str) -> BenchConfig {
    let yaml = format!(
        r#"
environments:
  local:
    url: "{url}"
    description: "mock service"
test_profiles:
  smoke:
    users: 2
    description: "smoke"
    duration: 2
    wait_time: [0.05, 0.1]
image_sizes:
  small: [64, 48]
  medium: [96, 64]
  large: [128, 96]
timeouts:
  health: 2
  predict: 5
  large: 5
"#
    );
    yaml.parse().unwrap()
}
