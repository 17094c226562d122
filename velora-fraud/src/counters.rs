use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use velora_core::EngineError;

/// Shared counter primitives behind the fraud gate. Requests are
/// stateless and may land on any instance, so the production
/// implementation lives in Redis (velora-store); nothing here may rely
/// on process memory outside of tests and local runs.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Increments a windowed counter and returns the count including
    /// this hit. The window starts at the first hit.
    async fn hit(&self, key: &str, window_secs: u64) -> Result<u64, EngineError>;

    /// SET-NX-style lock: true when the key was newly acquired, false
    /// when it already exists inside its TTL.
    async fn acquire_once(&self, key: &str, ttl_secs: u64) -> Result<bool, EngineError>;

    /// Adds a member to a windowed set and returns its cardinality.
    async fn add_member(
        &self,
        key: &str,
        member: &str,
        window_secs: u64,
    ) -> Result<u64, EngineError>;

    /// Unix seconds at which the key was first observed; the first call
    /// records now and returns it.
    async fn first_seen(&self, key: &str) -> Result<i64, EngineError>;
}

#[derive(Default)]
struct MemoryInner {
    counters: HashMap<String, (u64, Instant)>,
    locks: HashMap<String, Instant>,
    sets: HashMap<String, (HashSet<String>, Instant)>,
    first_seen: HashMap<String, i64>,
}

/// Process-local counter store for tests and single-node development
/// runs. Same expiry semantics as the Redis implementation.
#[derive(Default)]
pub struct MemoryCounterStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn hit(&self, key: &str, window_secs: u64) -> Result<u64, EngineError> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| EngineError::Persistence("counter lock poisoned".into()))?;
        let now = Instant::now();
        let entry = inner.counters.entry(key.to_string()).or_insert((
            0,
            now + Duration::from_secs(window_secs),
        ));
        if now >= entry.1 {
            *entry = (0, now + Duration::from_secs(window_secs));
        }
        entry.0 += 1;
        Ok(entry.0)
    }

    async fn acquire_once(&self, key: &str, ttl_secs: u64) -> Result<bool, EngineError> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| EngineError::Persistence("counter lock poisoned".into()))?;
        let now = Instant::now();
        match inner.locks.get(key) {
            Some(deadline) if now < *deadline => Ok(false),
            _ => {
                inner
                    .locks
                    .insert(key.to_string(), now + Duration::from_secs(ttl_secs));
                Ok(true)
            }
        }
    }

    async fn add_member(
        &self,
        key: &str,
        member: &str,
        window_secs: u64,
    ) -> Result<u64, EngineError> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| EngineError::Persistence("counter lock poisoned".into()))?;
        let now = Instant::now();
        let entry = inner.sets.entry(key.to_string()).or_insert((
            HashSet::new(),
            now + Duration::from_secs(window_secs),
        ));
        if now >= entry.1 {
            *entry = (HashSet::new(), now + Duration::from_secs(window_secs));
        }
        entry.0.insert(member.to_string());
        Ok(entry.0.len() as u64)
    }

    async fn first_seen(&self, key: &str) -> Result<i64, EngineError> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| EngineError::Persistence("counter lock poisoned".into()))?;
        let now = chrono::Utc::now().timestamp();
        Ok(*inner.first_seen.entry(key.to_string()).or_insert(now))
    }
}
