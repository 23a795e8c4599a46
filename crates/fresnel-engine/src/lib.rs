//! The Fresnel task lifecycle engine.
//!
//! Embeds in one or more worker processes that share a single namespaced
//! keyspace in a durable store. Producers submit tasks with [`Fresnel::create_task`];
//! a recurring [`Fresnel::migrate_tasks`] cycle moves due scheduled tasks
//! into the primary queue, and a recurring [`Fresnel::buffer_tasks`] cycle
//! atomically claims queued tasks into per-class local dispatch queues for
//! execution by the injected [`fresnel_core::TaskRunner`].

mod dispatch;
mod engine;
pub mod metrics;
pub mod store;

pub use engine::{EngineConfig, Fresnel};
