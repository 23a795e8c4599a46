use thiserror::Error;

use crate::TaskId;

/// Failures surfaced by the shared store client.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("command error: {0}")]
    Command(String),

    #[error("unexpected reply: {0}")]
    Reply(String),
}

#[derive(Debug, Error)]
pub enum FresnelError {
    #[error("task not found: {0}")]
    NotFound(TaskId),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("malformed store entry: {0}")]
    Malformed(String),

    #[error("no task runner configured")]
    NoRunner,
}
