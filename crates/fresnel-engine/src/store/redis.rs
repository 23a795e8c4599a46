//! Redis-backed store client.
//!
//! One multiplexed async connection, cloned per operation. Connection
//! parameters come from the caller; pooling and shutdown are the host's
//! concern.

use async_trait::async_trait;
use fresnel_core::{StoreError, TaskStore};
use once_cell::sync::Lazy;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Script};

// ZRANGEBYSCORE + ZREMRANGEBYSCORE in one server-side step, so concurrent
// claimers never see the same member.
static POP_BY_SCORE: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r#"
local due = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1], 'WITHSCORES')
if #due > 0 then
    redis.call('ZREMRANGEBYSCORE', KEYS[1], '-inf', ARGV[1])
end
return due
"#,
    )
});

#[derive(Clone)]
pub struct RedisStore {
    conn: MultiplexedConnection,
}

impl RedisStore {
    /// Connect to the store at `url` (e.g. `redis://localhost:6379`).
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url).map_err(map_err)?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(map_err)?;
        Ok(Self { conn })
    }
}

fn map_err(e: redis::RedisError) -> StoreError {
    if e.is_connection_refusal() || e.is_connection_dropped() || e.is_io_error() {
        StoreError::Connection(e.to_string())
    } else {
        StoreError::Command(e.to_string())
    }
}

#[async_trait]
impl TaskStore for RedisStore {
    async fn incr(&self, key: &str) -> Result<u64, StoreError> {
        let mut conn = self.conn.clone();
        conn.incr(key, 1i64).await.map_err(map_err)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        conn.get(key).await.map_err(map_err)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn.set(key, value).await.map_err(map_err)?;
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(key).await.map_err(map_err)?;
        Ok(())
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>, StoreError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        conn.mget(keys).await.map_err(map_err)
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let added: i64 = conn.sadd(key, member).await.map_err(map_err)?;
        Ok(added == 1)
    }

    async fn srem(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let removed: i64 = conn.srem(key, member).await.map_err(map_err)?;
        Ok(removed == 1)
    }

    async fn scard(&self, key: &str) -> Result<u64, StoreError> {
        let mut conn = self.conn.clone();
        conn.scard(key).await.map_err(map_err)
    }

    async fn zadd(&self, key: &str, member: &str, score: i64) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn.zadd(key, member, score).await.map_err(map_err)?;
        Ok(())
    }

    async fn zrem(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let removed: i64 = conn.zrem(key, member).await.map_err(map_err)?;
        Ok(removed == 1)
    }

    async fn zcard(&self, key: &str) -> Result<u64, StoreError> {
        let mut conn = self.conn.clone();
        conn.zcard(key).await.map_err(map_err)
    }

    async fn zrange(
        &self,
        key: &str,
        offset: u64,
        count: u64,
    ) -> Result<Vec<(String, i64)>, StoreError> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        let start = offset as isize;
        let stop = (offset + count - 1) as isize;
        let entries: Vec<(String, f64)> = conn
            .zrange_withscores(key, start, stop)
            .await
            .map_err(map_err)?;
        Ok(entries.into_iter().map(|(m, s)| (m, s as i64)).collect())
    }

    async fn zpop_by_score(
        &self,
        key: &str,
        max: i64,
    ) -> Result<Vec<(String, i64)>, StoreError> {
        let mut conn = self.conn.clone();
        let flat: Vec<String> = POP_BY_SCORE
            .key(key)
            .arg(max)
            .invoke_async(&mut conn)
            .await
            .map_err(map_err)?;

        let mut entries = Vec::with_capacity(flat.len() / 2);
        let mut it = flat.into_iter();
        while let (Some(member), Some(score)) = (it.next(), it.next()) {
            let score = score
                .parse::<f64>()
                .map_err(|_| StoreError::Reply(format!("non-numeric score: {score}")))?;
            entries.push((member, score as i64));
        }
        Ok(entries)
    }
}
