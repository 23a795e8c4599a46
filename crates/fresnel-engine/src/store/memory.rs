//! Single-process store for tests and local development.
//!
//! Every trait method takes the one lock for its whole body, so each
//! primitive stays atomic under concurrent engines sharing the store, the
//! same contract the networked commands give.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use fresnel_core::{StoreError, TaskStore};

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    strings: HashMap<String, String>,
    sets: HashMap<String, HashSet<String>>,
    zsets: HashMap<String, ZSet>,
}

#[derive(Default)]
struct ZSet {
    by_score: BTreeSet<(i64, String)>,
    scores: HashMap<String, i64>,
}

impl ZSet {
    fn insert(&mut self, member: String, score: i64) {
        if let Some(old) = self.scores.insert(member.clone(), score) {
            self.by_score.remove(&(old, member.clone()));
        }
        self.by_score.insert((score, member));
    }

    fn remove(&mut self, member: &str) -> bool {
        match self.scores.remove(member) {
            Some(score) => {
                self.by_score.remove(&(score, member.to_string()));
                true
            }
            None => false,
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, State>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Command("store mutex poisoned".into()))
    }
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn incr(&self, key: &str) -> Result<u64, StoreError> {
        let mut state = self.state()?;
        let entry = state
            .strings
            .entry(key.to_string())
            .or_insert_with(|| "0".to_string());
        let next = entry
            .parse::<u64>()
            .map_err(|_| StoreError::Reply(format!("not an integer: {entry}")))?
            + 1;
        *entry = next.to_string();
        Ok(next)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.state()?.strings.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.state()?
            .strings
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<(), StoreError> {
        self.state()?.strings.remove(key);
        Ok(())
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>, StoreError> {
        let state = self.state()?;
        Ok(keys.iter().map(|k| state.strings.get(k).cloned()).collect())
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        Ok(self
            .state()?
            .sets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string()))
    }

    async fn srem(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        Ok(self
            .state()?
            .sets
            .get_mut(key)
            .map(|set| set.remove(member))
            .unwrap_or(false))
    }

    async fn scard(&self, key: &str) -> Result<u64, StoreError> {
        Ok(self
            .state()?
            .sets
            .get(key)
            .map(|set| set.len() as u64)
            .unwrap_or(0))
    }

    async fn zadd(&self, key: &str, member: &str, score: i64) -> Result<(), StoreError> {
        self.state()?
            .zsets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string(), score);
        Ok(())
    }

    async fn zrem(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        Ok(self
            .state()?
            .zsets
            .get_mut(key)
            .map(|zset| zset.remove(member))
            .unwrap_or(false))
    }

    async fn zcard(&self, key: &str) -> Result<u64, StoreError> {
        Ok(self
            .state()?
            .zsets
            .get(key)
            .map(|zset| zset.scores.len() as u64)
            .unwrap_or(0))
    }

    async fn zrange(
        &self,
        key: &str,
        offset: u64,
        count: u64,
    ) -> Result<Vec<(String, i64)>, StoreError> {
        let state = self.state()?;
        let Some(zset) = state.zsets.get(key) else {
            return Ok(Vec::new());
        };
        Ok(zset
            .by_score
            .iter()
            .skip(offset as usize)
            .take(count as usize)
            .map(|(score, member)| (member.clone(), *score))
            .collect())
    }

    async fn zpop_by_score(
        &self,
        key: &str,
        max: i64,
    ) -> Result<Vec<(String, i64)>, StoreError> {
        let mut state = self.state()?;
        let Some(zset) = state.zsets.get_mut(key) else {
            return Ok(Vec::new());
        };
        let due: Vec<(i64, String)> = zset
            .by_score
            .iter()
            .take_while(|(score, _)| *score <= max)
            .cloned()
            .collect();
        for (score, member) in &due {
            zset.scores.remove(member);
            zset.by_score.remove(&(*score, member.clone()));
        }
        Ok(due.into_iter().map(|(score, member)| (member, score)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn incr_counts_from_one() {
        let store = MemoryStore::new();
        assert_eq!(store.incr("id").await.unwrap(), 1);
        assert_eq!(store.incr("id").await.unwrap(), 2);
        assert_eq!(store.incr("id").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn sadd_reports_new_members_only() {
        let store = MemoryStore::new();
        assert!(store.sadd("s", "a").await.unwrap());
        assert!(!store.sadd("s", "a").await.unwrap());
        assert_eq!(store.scard("s").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn zadd_replaces_the_score() {
        let store = MemoryStore::new();
        store.zadd("z", "a", 5).await.unwrap();
        store.zadd("z", "a", 9).await.unwrap();
        assert_eq!(store.zcard("z").await.unwrap(), 1);
        assert_eq!(
            store.zrange("z", 0, 10).await.unwrap(),
            vec![("a".to_string(), 9)]
        );
    }

    #[tokio::test]
    async fn zpop_by_score_takes_only_due_members() {
        let store = MemoryStore::new();
        store.zadd("z", "a", 1).await.unwrap();
        store.zadd("z", "b", 5).await.unwrap();
        store.zadd("z", "c", 10).await.unwrap();

        let due = store.zpop_by_score("z", 5).await.unwrap();
        assert_eq!(
            due,
            vec![("a".to_string(), 1), ("b".to_string(), 5)]
        );
        assert_eq!(store.zcard("z").await.unwrap(), 1);

        // popping again returns nothing new
        assert!(store.zpop_by_score("z", 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn mget_preserves_positions_for_missing_keys() {
        let store = MemoryStore::new();
        store.set("k1", "v1").await.unwrap();
        let got = store
            .mget(&["k1".to_string(), "k2".to_string()])
            .await
            .unwrap();
        assert_eq!(got, vec![Some("v1".to_string()), None]);
    }
}
