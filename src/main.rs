use anyhow::Result;
use tracing_subscriber::EnvFilter;

use mev_alert_lib::start_service;

#[tokio::main(worker_threads = 4)]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_ansi(atty::is(atty::Stream::Stdout))
        .init();

    start_service().await
}
