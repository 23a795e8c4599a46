use async_trait::async_trait;

use crate::StoreError;

/// Atomic primitives of the shared durable store.
///
/// Every method maps onto a single atomic store command. The engine never
/// builds a counter or a claim out of separate read and write steps; that
/// is what keeps multiple processes on one keyspace correct.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Atomically increment the integer at `key`, returning the new value.
    async fn incr(&self, key: &str) -> Result<u64, StoreError>;

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    async fn del(&self, key: &str) -> Result<(), StoreError>;
    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>, StoreError>;

    /// Add `member` to the set at `key`. Returns true when the member was
    /// newly added (atomic test-and-set).
    async fn sadd(&self, key: &str, member: &str) -> Result<bool, StoreError>;
    async fn srem(&self, key: &str, member: &str) -> Result<bool, StoreError>;
    async fn scard(&self, key: &str) -> Result<u64, StoreError>;

    /// Insert `member` with `score`, replacing any existing score.
    async fn zadd(&self, key: &str, member: &str, score: i64) -> Result<(), StoreError>;
    async fn zrem(&self, key: &str, member: &str) -> Result<bool, StoreError>;
    async fn zcard(&self, key: &str) -> Result<u64, StoreError>;

    /// Ascending range by rank, with scores.
    async fn zrange(
        &self,
        key: &str,
        offset: u64,
        count: u64,
    ) -> Result<Vec<(String, i64)>, StoreError>;

    /// Atomically remove and return every member scored at or below `max`,
    /// in ascending score order. Two concurrent callers never receive the
    /// same member.
    async fn zpop_by_score(&self, key: &str, max: i64)
        -> Result<Vec<(String, i64)>, StoreError>;
}
