use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub type TaskId = u64;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Ready,
    Reserved,
    Running,
    /// Failed at least once, still under the retry limit.
    Error,
    /// Exhausted the retry limit; retained for inspection.
    Failed,
}

/// A unit of work as submitted: an executor name plus its arguments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    pub class: String,
    pub args: Vec<serde_json::Value>,
}

impl TaskSpec {
    pub fn new(class: impl Into<String>, args: Vec<serde_json::Value>) -> Self {
        Self {
            class: class.into(),
            args,
        }
    }

    pub fn content_hash(&self) -> String {
        content_hash(&self.class, &self.args)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDefinition {
    pub id: TaskId,
    pub class: String,
    pub args: Vec<serde_json::Value>,

    pub state: TaskState,

    pub attempts: u32,

    pub reserved_at: Option<DateTime<Utc>>,
    pub queued_at: Option<DateTime<Utc>>,
    pub first_queued_at: Option<DateTime<Utc>>,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub first_scheduled_for: Option<DateTime<Utc>>,
    pub first_run_at: Option<DateTime<Utc>>,
    pub last_run_at: Option<DateTime<Utc>>,
}

impl TaskDefinition {
    pub fn new(id: TaskId, spec: TaskSpec) -> Self {
        Self {
            id,
            class: spec.class,
            args: spec.args,
            state: TaskState::Ready,
            attempts: 0,
            reserved_at: None,
            queued_at: None,
            first_queued_at: None,
            scheduled_for: None,
            first_scheduled_for: None,
            first_run_at: None,
            last_run_at: None,
        }
    }

    pub fn content_hash(&self) -> String {
        content_hash(&self.class, &self.args)
    }
}

/// Content hash over the public fields only. The id and the bookkeeping
/// timestamps never participate, so two submissions with identical
/// class/args hash identically regardless of timing.
pub fn content_hash(class: &str, args: &[serde_json::Value]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(class.as_bytes());
    hasher.update([0u8]);
    // an array of JSON values always encodes
    let encoded = serde_json::to_vec(args).expect("JSON array encoding cannot fail");
    hasher.update(&encoded);
    hex::encode(hasher.finalize())
}
