use std::sync::Arc;
use std::time::Duration;

use fresnel_core::{TaskDefinition, TaskOutcome, TaskRunner};
use fresnel_engine::store::redis::RedisStore;
use fresnel_engine::{EngineConfig, Fresnel};

#[derive(Clone)]
pub struct WorkerConfig {
    pub redis_url: String,        // e.g. redis://localhost:6379
    pub namespace: String,        // e.g. fresnel
    pub buffer_interval_ms: u64,  // e.g. 500
    pub migrate_interval_ms: u64, // e.g. 1000
    pub max_retries: u32,         // e.g. 10
}

impl WorkerConfig {
    pub fn from_env() -> Self {
        let redis_url = std::env::var("REDIS_URL")
            .unwrap_or_else(|_| "redis://localhost:6379".to_string());
        let namespace =
            std::env::var("FRESNEL_NAMESPACE").unwrap_or_else(|_| "fresnel".to_string());
        let buffer_interval_ms = std::env::var("BUFFER_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(500);
        let migrate_interval_ms = std::env::var("MIGRATE_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(1_000);
        let max_retries = std::env::var("MAX_RETRIES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(10);

        Self {
            redis_url,
            namespace,
            buffer_interval_ms,
            migrate_interval_ms,
            max_retries,
        }
    }
}

/// Example runner: just logs the task and reports success. Host
/// applications supply their own [`TaskRunner`] with the real per-class
/// work.
pub struct LogRunner;

#[async_trait::async_trait]
impl TaskRunner for LogRunner {
    async fn run(&self, task: TaskDefinition) -> TaskOutcome {
        tracing::info!(
            task_id = task.id,
            class = %task.class,
            attempts = task.attempts,
            "processing task"
        );
        TaskOutcome::Success
    }
}

pub async fn run_worker(cfg: WorkerConfig, runner: Arc<dyn TaskRunner>) -> anyhow::Result<()> {
    let store = Arc::new(RedisStore::connect(&cfg.redis_url).await?);
    let engine_cfg = EngineConfig {
        max_retries: cfg.max_retries,
        ..EngineConfig::default()
    };
    let engine = Fresnel::with_runner(store, cfg.namespace.clone(), engine_cfg, runner);

    tracing::info!(
        namespace = %cfg.namespace,
        buffer_interval_ms = cfg.buffer_interval_ms,
        migrate_interval_ms = cfg.migrate_interval_ms,
        max_retries = cfg.max_retries,
        "worker started"
    );

    let mut migrate = tokio::time::interval(Duration::from_millis(cfg.migrate_interval_ms));
    let mut buffer = tokio::time::interval(Duration::from_millis(cfg.buffer_interval_ms));

    loop {
        tokio::select! {
            _ = migrate.tick() => {
                if let Err(e) = engine.migrate_tasks().await {
                    tracing::warn!(error = %e, "migrate cycle failed");
                }
            }
            _ = buffer.tick() => {
                match engine.buffer_tasks().await {
                    Ok(n) if n > 0 => tracing::debug!(buffered = n, "buffered tasks"),
                    Ok(_) => {}
                    Err(e) => tracing::warn!(error = %e, "buffer cycle failed"),
                }
            }
        }
    }
}
