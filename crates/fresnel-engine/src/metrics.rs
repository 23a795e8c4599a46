use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};

pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

pub static TASKS_CREATED: Lazy<IntCounter> =
    Lazy::new(|| IntCounter::new("tasks_created_total", "Total tasks created").unwrap());

pub static TASKS_DUPLICATE: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("tasks_duplicate_total", "Total duplicate submissions rejected").unwrap()
});

pub static TASKS_MIGRATED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("tasks_migrated_total", "Total tasks migrated out of the reservoir").unwrap()
});

pub static TASKS_BUFFERED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("tasks_buffered_total", "Total tasks claimed into local dispatch").unwrap()
});

pub static TASKS_SUCCEEDED: Lazy<IntCounter> =
    Lazy::new(|| IntCounter::new("tasks_succeeded_total", "Total tasks succeeded").unwrap());

pub static TASKS_RETRIED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("tasks_retried_total", "Total failures with a retry scheduled").unwrap()
});

pub static TASKS_ERRORED_OUT: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("tasks_errored_out_total", "Total tasks that exhausted their retries").unwrap()
});

pub static LAST_BUFFERED: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("last_buffered_batch", "Size of the most recent buffered batch").unwrap()
});

pub fn init_metrics() {
    // Ignore errors if called multiple times (common in tests)
    let _ = REGISTRY.register(Box::new(TASKS_CREATED.clone()));
    let _ = REGISTRY.register(Box::new(TASKS_DUPLICATE.clone()));
    let _ = REGISTRY.register(Box::new(TASKS_MIGRATED.clone()));
    let _ = REGISTRY.register(Box::new(TASKS_BUFFERED.clone()));
    let _ = REGISTRY.register(Box::new(TASKS_SUCCEEDED.clone()));
    let _ = REGISTRY.register(Box::new(TASKS_RETRIED.clone()));
    let _ = REGISTRY.register(Box::new(TASKS_ERRORED_OUT.clone()));
    let _ = REGISTRY.register(Box::new(LAST_BUFFERED.clone()));
}

pub fn gather() -> String {
    let metric_families = REGISTRY.gather();
    let mut buf = Vec::new();
    let encoder = TextEncoder::new();
    encoder.encode(&metric_families, &mut buf).unwrap();
    String::from_utf8(buf).unwrap()
}
