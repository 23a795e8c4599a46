//! Per-class local dispatch queues.
//!
//! Each task class gets an unbounded in-process channel drained by a single
//! consumer task, so a class executes at most one task at a time while
//! distinct classes run concurrently. A stuck runner therefore stalls only
//! its own class.

use std::collections::HashMap;

use fresnel_core::TaskDefinition;
use tokio::sync::{mpsc, Mutex};

use crate::engine::Fresnel;

pub(crate) struct LocalQueues {
    channels: Mutex<HashMap<String, mpsc::UnboundedSender<TaskDefinition>>>,
}

impl LocalQueues {
    pub(crate) fn new() -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
        }
    }

    /// Queue a buffered definition for its class, spawning the class
    /// consumer on first use.
    pub(crate) async fn dispatch(&self, engine: Fresnel, def: TaskDefinition) {
        let mut channels = self.channels.lock().await;
        let sender = channels
            .entry(def.class.clone())
            .or_insert_with(|| spawn_consumer(engine.clone(), def.class.clone()));
        if let Err(mpsc::error::SendError(def)) = sender.send(def) {
            // consumer is gone; replace it and re-send
            let class = def.class.clone();
            let sender = spawn_consumer(engine, class.clone());
            let _ = sender.send(def);
            channels.insert(class, sender);
        }
    }
}

fn spawn_consumer(engine: Fresnel, class: String) -> mpsc::UnboundedSender<TaskDefinition> {
    let (tx, mut rx) = mpsc::unbounded_channel::<TaskDefinition>();
    tokio::spawn(async move {
        while let Some(def) = rx.recv().await {
            let task_id = def.id;
            if let Err(e) = engine.execute_task(def).await {
                tracing::warn!(task_id, class = %class, error = %e, "task execution did not complete");
            }
        }
    });
    tx
}
