use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fresnel_worker=info,fresnel_engine=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    fresnel_engine::metrics::init_metrics();

    let cfg = fresnel_worker::WorkerConfig::from_env();

    tokio::select! {
        result = fresnel_worker::run_worker(cfg, Arc::new(fresnel_worker::LogRunner)) => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
            Ok(())
        }
    }
}
