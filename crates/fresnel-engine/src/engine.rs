use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use fresnel_core::{
    FresnelError, RetryPolicy, TaskDefinition, TaskId, TaskOutcome, TaskRunner, TaskSpec,
    TaskState, TaskStore,
};

use crate::dispatch::LocalQueues;
use crate::metrics;

// Store keys, relative to the engine namespace. Mind the registry names:
// the key "failed" holds retryable failures and the key "error" holds
// tasks that exhausted their retries. Both are part of the shared keyspace
// and must not change.
const DEDUP_INDEX: &str = "tasks";
const PRIMARY_QUEUE: &str = "queue";
const RESERVOIR: &str = "reservoir";
const PENDING: &str = "pending";
const RETRY_REGISTRY: &str = "failed";
const TERMINAL_REGISTRY: &str = "error";
const ID_COUNTER: &str = "id";

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Failure count at which a task stops being retried.
    pub max_retries: u32,
    pub retry: RetryPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_retries: 10,
            retry: RetryPolicy::default(),
        }
    }
}

/// Handle on one task queue instance. Cheap to clone; all clones share the
/// same store client and local dispatch queues.
#[derive(Clone)]
pub struct Fresnel {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<dyn TaskStore>,
    namespace: String,
    config: EngineConfig,
    runner: Option<Arc<dyn TaskRunner>>,
    local_queues: LocalQueues,
}

impl Fresnel {
    /// Engine handle for submission and inspection. Buffering and execution
    /// need a runner; see [`Fresnel::with_runner`].
    pub fn new(
        store: Arc<dyn TaskStore>,
        namespace: impl Into<String>,
        config: EngineConfig,
    ) -> Self {
        Self::build(store, namespace.into(), config, None)
    }

    /// Engine handle that can also buffer and execute tasks through the
    /// given runner.
    pub fn with_runner(
        store: Arc<dyn TaskStore>,
        namespace: impl Into<String>,
        config: EngineConfig,
        runner: Arc<dyn TaskRunner>,
    ) -> Self {
        Self::build(store, namespace.into(), config, Some(runner))
    }

    fn build(
        store: Arc<dyn TaskStore>,
        namespace: String,
        config: EngineConfig,
        runner: Option<Arc<dyn TaskRunner>>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                namespace,
                config,
                runner,
                local_queues: LocalQueues::new(),
            }),
        }
    }

    fn key(&self, name: &str) -> String {
        format!("{}:{}", self.inner.namespace, name)
    }

    fn definition_key(&self, id: TaskId) -> String {
        format!("{}:definitions:{}", self.inner.namespace, id)
    }

    fn error_key(&self, id: TaskId) -> String {
        format!("{}:errors:{}", self.inner.namespace, id)
    }

    /// Submit a task for immediate execution.
    ///
    /// Returns the created definition, or `None` when a task with the same
    /// class and args is already live (duplicate submissions consume no id
    /// and change nothing).
    pub async fn create_task(
        &self,
        spec: TaskSpec,
    ) -> Result<Option<TaskDefinition>, FresnelError> {
        self.create(spec, None).await
    }

    /// Submit a task scheduled to become due at `scheduled_for`. An instant
    /// that is not in the future queues the task immediately.
    pub async fn create_task_at(
        &self,
        spec: TaskSpec,
        scheduled_for: DateTime<Utc>,
    ) -> Result<Option<TaskDefinition>, FresnelError> {
        self.create(spec, Some(scheduled_for)).await
    }

    async fn create(
        &self,
        spec: TaskSpec,
        scheduled_for: Option<DateTime<Utc>>,
    ) -> Result<Option<TaskDefinition>, FresnelError> {
        // the sadd doubles as the duplicate check; of two concurrent
        // submissions exactly one sees a fresh insert
        let hash = spec.content_hash();
        if !self.inner.store.sadd(&self.key(DEDUP_INDEX), &hash).await? {
            metrics::TASKS_DUPLICATE.inc();
            tracing::debug!(class = %spec.class, "duplicate task rejected");
            return Ok(None);
        }

        let id = self.inner.store.incr(&self.key(ID_COUNTER)).await?;
        let mut def = TaskDefinition::new(id, spec);
        self.queue_task(&mut def, scheduled_for).await?;

        metrics::TASKS_CREATED.inc();
        tracing::debug!(task_id = id, class = %def.class, "task created");
        Ok(Some(def))
    }

    /// Sole entry point for both initial enqueue and retry re-enqueue.
    ///
    /// Stamps `queued_at` (and the sticky `first_queued_at`), records the
    /// schedule when one is given, persists the definition, and places the
    /// id: a schedule strictly in the future goes to the reservoir scored
    /// by that instant, everything else goes to the primary queue scored
    /// by now.
    async fn queue_task(
        &self,
        def: &mut TaskDefinition,
        scheduled_for: Option<DateTime<Utc>>,
    ) -> Result<(), FresnelError> {
        let now = Utc::now();
        def.queued_at = Some(now);
        if def.first_queued_at.is_none() {
            def.first_queued_at = Some(now);
        }
        if let Some(at) = scheduled_for {
            def.scheduled_for = Some(at);
            if def.first_scheduled_for.is_none() {
                def.first_scheduled_for = Some(at);
            }
        }
        self.update_definition(def).await?;

        let member = def.id.to_string();
        match scheduled_for {
            Some(at) if at > now => {
                self.inner
                    .store
                    .zadd(&self.key(RESERVOIR), &member, at.timestamp_millis())
                    .await?;
            }
            _ => {
                self.inner
                    .store
                    .zadd(&self.key(PRIMARY_QUEUE), &member, now.timestamp_millis())
                    .await?;
            }
        }
        Ok(())
    }

    /// Move every reservoir entry that has come due into the primary queue.
    ///
    /// Entries keep their scheduled instant as the queue score, preserving
    /// relative order. Safe to run from any number of processes: the pop is
    /// atomic, so each entry migrates at most once. Returns the number of
    /// entries migrated.
    pub async fn migrate_tasks(&self) -> Result<usize, FresnelError> {
        let now_ms = Utc::now().timestamp_millis();
        let due = self
            .inner
            .store
            .zpop_by_score(&self.key(RESERVOIR), now_ms)
            .await?;
        for (member, score) in &due {
            self.inner
                .store
                .zadd(&self.key(PRIMARY_QUEUE), member, *score)
                .await?;
        }
        if !due.is_empty() {
            metrics::TASKS_MIGRATED.inc_by(due.len() as u64);
            tracing::debug!(count = due.len(), "migrated due tasks");
        }
        Ok(due.len())
    }

    /// Atomically claim everything in the primary queue into the per-class
    /// local dispatch queues.
    ///
    /// The claim is one atomic pop, so concurrent callers never take the
    /// same id and the unbuffered queue length reads 0 immediately after.
    /// Each claimed task is marked reserved, added to the pending registry,
    /// and handed to its class's dispatch queue. Returns the number of
    /// tasks buffered; an empty queue is a no-op.
    pub async fn buffer_tasks(&self) -> Result<usize, FresnelError> {
        if self.inner.runner.is_none() {
            return Err(FresnelError::NoRunner);
        }

        let claimed = self
            .inner
            .store
            .zpop_by_score(&self.key(PRIMARY_QUEUE), i64::MAX)
            .await?;

        let now = Utc::now();
        let mut buffered = 0usize;
        for (member, _) in claimed {
            let id = parse_id(&member)?;
            let Some(mut def) = self.get_definition(id).await? else {
                tracing::warn!(task_id = id, "claimed id has no definition, skipping");
                continue;
            };
            def.state = TaskState::Reserved;
            def.reserved_at = Some(now);
            self.update_definition(&def).await?;
            self.inner.store.sadd(&self.key(PENDING), &member).await?;
            self.inner.local_queues.dispatch(self.clone(), def).await;
            buffered += 1;
        }

        if buffered > 0 {
            metrics::TASKS_BUFFERED.inc_by(buffered as u64);
        }
        metrics::LAST_BUFFERED.set(buffered as i64);
        Ok(buffered)
    }

    /// Run one task through the injected runner and apply the outcome.
    ///
    /// Normally driven by the per-class dispatch queues after
    /// [`Fresnel::buffer_tasks`].
    pub async fn execute_task(&self, mut def: TaskDefinition) -> Result<(), FresnelError> {
        let runner = self
            .inner
            .runner
            .clone()
            .ok_or(FresnelError::NoRunner)?;

        let now = Utc::now();
        def.state = TaskState::Running;
        def.last_run_at = Some(now);
        if def.first_run_at.is_none() {
            def.first_run_at = Some(now);
        }
        self.update_definition(&def).await?;

        match runner.run(def.clone()).await {
            TaskOutcome::Success => self.complete_success(def).await,
            TaskOutcome::Failure(message) => self.complete_failure(def, message).await,
        }
    }

    /// Successful completion is the only path that destroys state: the
    /// definition is deleted and the content hash leaves the dedup index,
    /// so an identical task may be submitted again.
    async fn complete_success(&self, def: TaskDefinition) -> Result<(), FresnelError> {
        let member = def.id.to_string();
        let store = &self.inner.store;

        store.del(&self.definition_key(def.id)).await?;
        store
            .srem(&self.key(DEDUP_INDEX), &def.content_hash())
            .await?;
        store.srem(&self.key(PENDING), &member).await?;
        store.del(&self.error_key(def.id)).await?;

        metrics::TASKS_SUCCEEDED.inc();
        tracing::info!(task_id = def.id, class = %def.class, "task succeeded");
        Ok(())
    }

    async fn complete_failure(
        &self,
        mut def: TaskDefinition,
        message: Option<String>,
    ) -> Result<(), FresnelError> {
        let member = def.id.to_string();
        let store = &self.inner.store;

        def.attempts += 1;
        if let Some(message) = &message {
            store.set(&self.error_key(def.id), message).await?;
        }
        store.srem(&self.key(PENDING), &member).await?;

        if def.attempts < self.inner.config.max_retries {
            def.state = TaskState::Error;
            store
                .zadd(&self.key(RETRY_REGISTRY), &member, i64::from(def.attempts))
                .await?;

            let delay = self.inner.config.retry.delay_for(def.attempts);
            let retry_at = Utc::now() + ChronoDuration::milliseconds(delay.as_millis() as i64);
            let attempts = def.attempts;
            self.queue_task(&mut def, Some(retry_at)).await?;

            metrics::TASKS_RETRIED.inc();
            tracing::warn!(
                task_id = def.id,
                class = %def.class,
                attempts,
                error = message.as_deref().unwrap_or(""),
                "task failed, retry scheduled"
            );
        } else {
            def.state = TaskState::Failed;
            self.update_definition(&def).await?;
            store.zrem(&self.key(RETRY_REGISTRY), &member).await?;
            store
                .zadd(
                    &self.key(TERMINAL_REGISTRY),
                    &member,
                    Utc::now().timestamp_millis(),
                )
                .await?;

            metrics::TASKS_ERRORED_OUT.inc();
            tracing::error!(
                task_id = def.id,
                class = %def.class,
                attempts = def.attempts,
                error = message.as_deref().unwrap_or(""),
                "task failed permanently"
            );
        }
        Ok(())
    }

    pub async fn get_definition(
        &self,
        id: TaskId,
    ) -> Result<Option<TaskDefinition>, FresnelError> {
        match self.inner.store.get(&self.definition_key(id)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Load definitions for a sequence of ids, silently omitting ids with
    /// no definition. An empty input yields an empty result.
    pub async fn get_definitions(
        &self,
        ids: &[TaskId],
    ) -> Result<Vec<TaskDefinition>, FresnelError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let keys: Vec<String> = ids.iter().map(|id| self.definition_key(*id)).collect();
        let raws = self.inner.store.mget(&keys).await?;
        let mut defs = Vec::with_capacity(raws.len());
        for raw in raws.into_iter().flatten() {
            defs.push(serde_json::from_str(&raw)?);
        }
        Ok(defs)
    }

    /// Full upsert of a definition by its id.
    pub async fn update_definition(&self, def: &TaskDefinition) -> Result<(), FresnelError> {
        let encoded = serde_json::to_string(def)?;
        self.inner
            .store
            .set(&self.definition_key(def.id), &encoded)
            .await?;
        Ok(())
    }

    /// Rewrite only the `attempts` field of a stored definition.
    pub async fn set_failure_attempts(
        &self,
        id: TaskId,
        attempts: u32,
    ) -> Result<(), FresnelError> {
        let mut def = self
            .get_definition(id)
            .await?
            .ok_or(FresnelError::NotFound(id))?;
        def.attempts = attempts;
        self.update_definition(&def).await
    }

    /// Increment the `attempts` field of a stored definition, returning the
    /// new count.
    pub async fn increment_failure_attempts(&self, id: TaskId) -> Result<u32, FresnelError> {
        let mut def = self
            .get_definition(id)
            .await?
            .ok_or(FresnelError::NotFound(id))?;
        def.attempts += 1;
        self.update_definition(&def).await?;
        Ok(def.attempts)
    }

    /// Number of tasks queued but not yet claimed into local dispatch.
    pub async fn get_unbuffered_queue_length(&self) -> Result<u64, FresnelError> {
        Ok(self.inner.store.zcard(&self.key(PRIMARY_QUEUE)).await?)
    }

    /// Number of tasks claimed for local execution but not yet finished.
    pub async fn get_pending_count(&self) -> Result<u64, FresnelError> {
        Ok(self.inner.store.scard(&self.key(PENDING)).await?)
    }

    pub async fn get_failed_count(&self) -> Result<u64, FresnelError> {
        Ok(self.inner.store.zcard(&self.key(RETRY_REGISTRY)).await?)
    }

    pub async fn get_errored_out_count(&self) -> Result<u64, FresnelError> {
        Ok(self.inner.store.zcard(&self.key(TERMINAL_REGISTRY)).await?)
    }

    /// Retryable failures as (id, attempts) pairs, ordered by attempt count.
    pub async fn get_failed_tasks(
        &self,
        offset: u64,
        count: u64,
    ) -> Result<Vec<(TaskId, u32)>, FresnelError> {
        let entries = self
            .inner
            .store
            .zrange(&self.key(RETRY_REGISTRY), offset, count)
            .await?;
        entries
            .into_iter()
            .map(|(member, score)| Ok((parse_id(&member)?, score as u32)))
            .collect()
    }

    /// Tasks that exhausted their retries, as (id, errored-out-at) pairs.
    pub async fn get_errored_out_tasks(
        &self,
        offset: u64,
        count: u64,
    ) -> Result<Vec<(TaskId, DateTime<Utc>)>, FresnelError> {
        let entries = self
            .inner
            .store
            .zrange(&self.key(TERMINAL_REGISTRY), offset, count)
            .await?;
        entries
            .into_iter()
            .map(|(member, score)| Ok((parse_id(&member)?, ms_to_datetime(score)?)))
            .collect()
    }

    /// Last failure message recorded for a task, or `None`.
    pub async fn get_last_error(&self, id: TaskId) -> Result<Option<String>, FresnelError> {
        Ok(self.inner.store.get(&self.error_key(id)).await?)
    }

    /// Primary queue contents as (id, queued instant) pairs.
    pub async fn queued_tasks(
        &self,
        offset: u64,
        count: u64,
    ) -> Result<Vec<(TaskId, DateTime<Utc>)>, FresnelError> {
        self.ranged_instants(PRIMARY_QUEUE, offset, count).await
    }

    /// Reservoir contents as (id, due instant) pairs.
    pub async fn reservoir_tasks(
        &self,
        offset: u64,
        count: u64,
    ) -> Result<Vec<(TaskId, DateTime<Utc>)>, FresnelError> {
        self.ranged_instants(RESERVOIR, offset, count).await
    }

    async fn ranged_instants(
        &self,
        name: &str,
        offset: u64,
        count: u64,
    ) -> Result<Vec<(TaskId, DateTime<Utc>)>, FresnelError> {
        let entries = self.inner.store.zrange(&self.key(name), offset, count).await?;
        entries
            .into_iter()
            .map(|(member, score)| Ok((parse_id(&member)?, ms_to_datetime(score)?)))
            .collect()
    }
}

fn parse_id(member: &str) -> Result<TaskId, FresnelError> {
    member
        .parse()
        .map_err(|_| FresnelError::Malformed(format!("non-numeric task id: {member}")))
}

fn ms_to_datetime(ms: i64) -> Result<DateTime<Utc>, FresnelError> {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .ok_or_else(|| FresnelError::Malformed(format!("timestamp out of range: {ms}")))
}
