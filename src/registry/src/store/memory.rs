use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use super::KvStore;
use crate::error::StoreError;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| now < at)
    }
}

/// A write attempt as seen by the store, successful or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutRecord {
    pub key: String,
    pub value: String,
    pub ttl: Duration,
}

#[derive(Debug, Default)]
struct State {
    entries: HashMap<String, Entry>,
    puts: Vec<PutRecord>,
    failing_keys: HashSet<String>,
    fail_sync: bool,
    fail_delete: bool,
    statuses: HashMap<String, u16>,
    syncs: usize,
    record_puts: bool,
}

impl State {
    fn prune_expired(&mut self, now: Instant) {
        self.entries.retain(|_, entry| entry.is_live(now));
    }
}

/// Process-local store with TTL expiry and failure injection. Expired
/// entries are dropped on every write, so a long-running process holds only
/// live keys.
#[derive(Debug, Clone)]
pub struct InMemoryKvStore {
    state: Arc<Mutex<State>>,
    endpoints: Vec<String>,
}

impl Default for InMemoryKvStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryKvStore {
    pub fn new() -> Self {
        Self::with_endpoints(vec!["memory://local".to_string()])
    }

    pub fn with_endpoints(endpoints: Vec<String>) -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            endpoints,
        }
    }

    /// Keep a log of every write attempt, readable through [`Self::puts`].
    /// Off by default since the log grows with every refresh.
    pub fn with_write_log(self) -> Self {
        self.lock().record_puts = true;
        self
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Live value at `key`, if any.
    pub fn get(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        self.lock()
            .entries
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.clone())
    }

    /// Live keys beginning with `prefix`, sorted.
    pub fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        let now = Instant::now();
        let mut keys: Vec<String> = self
            .lock()
            .entries
            .iter()
            .filter(|(key, entry)| key.starts_with(prefix) && entry.is_live(now))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Live key/value pairs beginning with `prefix`, sorted by key.
    pub fn snapshot(&self, prefix: &str) -> Vec<(String, String)> {
        self.keys_with_prefix(prefix)
            .into_iter()
            .filter_map(|key| self.get(&key).map(|value| (key, value)))
            .collect()
    }

    /// Every write attempted so far, in order. Empty unless built
    /// [`with_write_log`](Self::with_write_log).
    pub fn puts(&self) -> Vec<PutRecord> {
        self.lock().puts.clone()
    }

    pub fn sync_count(&self) -> usize {
        self.lock().syncs
    }

    /// Make every later write to `key` fail.
    pub fn fail_key(&self, key: impl Into<String>) {
        self.lock().failing_keys.insert(key.into());
    }

    pub fn fail_sync(&self, fail: bool) {
        self.lock().fail_sync = fail;
    }

    pub fn fail_delete(&self, fail: bool) {
        self.lock().fail_delete = fail;
    }

    /// Status reported for `endpoint`; unknown endpoints answer 200.
    pub fn set_status(&self, endpoint: impl Into<String>, status: u16) {
        self.lock().statuses.insert(endpoint.into(), status);
    }
}

#[async_trait]
impl KvStore for InMemoryKvStore {
    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut state = self.lock();
        if state.record_puts {
            state.puts.push(PutRecord {
                key: key.to_string(),
                value: value.to_string(),
                ttl,
            });
        }
        if state.failing_keys.contains(key) {
            return Err(StoreError::Injected(format!("write to {key}")));
        }
        let now = Instant::now();
        state.prune_expired(now);
        let expires_at = (!ttl.is_zero()).then(|| now + ttl);
        state.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn delete_recursive(&self, prefix: &str) -> Result<(), StoreError> {
        let mut state = self.lock();
        if state.fail_delete {
            return Err(StoreError::Injected(format!("delete of {prefix}")));
        }
        state.prune_expired(Instant::now());
        let dir = format!("{prefix}/");
        state
            .entries
            .retain(|key, _| key != prefix && !key.starts_with(&dir));
        Ok(())
    }

    async fn sync_membership(&self) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.syncs += 1;
        if state.fail_sync {
            return Err(StoreError::Injected("membership sync".to_string()));
        }
        Ok(())
    }

    fn endpoints(&self) -> Vec<String> {
        self.endpoints.clone()
    }

    async fn endpoint_status(&self, endpoint: &str) -> Result<u16, StoreError> {
        Ok(self.lock().statuses.get(endpoint).copied().unwrap_or(200))
    }
}
