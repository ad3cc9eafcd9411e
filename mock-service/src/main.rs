use mock_service::{run, tps_measure_task, MockConfig};
use std::net::SocketAddr;
use std::time::Duration;
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    FmtSubscriber::builder()
        .with_env_filter("mock_service=debug,tower_http=info")
        .init();

    tokio::task::spawn(async { tps_measure_task().await });

    let config = MockConfig {
        delay: Duration::from_millis(25),
        jitter: Duration::from_millis(5),
        fail_every: None,
        malformed_every: None,
        max_tps: None,
    };
    let addr: SocketAddr = "0.0.0.0:8000".parse()?;
    run(addr, config).await
}
