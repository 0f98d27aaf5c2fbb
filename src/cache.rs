//! # Result Cache
//! Thread-safe TTL memo of score results per (entity id, date key).
//!
//! Advisory only: a miss or an evicted entry just means the caller recomputes.
//! Nothing here writes back to the weights or the factor provider.

use std::{
    collections::HashMap,
    sync::Mutex,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use crate::scoring::ScoreResult;

/// Default freshness window: 12 hours.
pub const DEFAULT_TTL: Duration = Duration::from_secs(12 * 3600);

#[derive(Debug, Clone)]
struct Entry {
    stored_at: u64,
    ttl_secs: u64,
    result: ScoreResult,
}

impl Entry {
    fn is_fresh(&self, now: u64) -> bool {
        now.saturating_sub(self.stored_at) < self.ttl_secs
    }
}

/// TTL cache keyed by `(entity_id, date_key)`.
#[derive(Debug, Default)]
pub struct ResultCache {
    inner: Mutex<HashMap<(String, String), Entry>>,
}

impl ResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh entry for the key, or `None`. Expired entries are evicted on
    /// the way out.
    pub fn get(&self, entity_id: &str, date_key: &str) -> Option<ScoreResult> {
        self.get_at(entity_id, date_key, now_unix())
    }

    /// Store a result under the default 12h TTL.
    pub fn put(&self, entity_id: &str, date_key: &str, result: ScoreResult) {
        self.put_with_ttl(entity_id, date_key, result, DEFAULT_TTL);
    }

    pub fn put_with_ttl(&self, entity_id: &str, date_key: &str, result: ScoreResult, ttl: Duration) {
        self.put_at(entity_id, date_key, result, ttl, now_unix());
    }

    /// Explicit-clock variant, used by callers that carry their own time
    /// source and by tests.
    pub fn get_at(&self, entity_id: &str, date_key: &str, now: u64) -> Option<ScoreResult> {
        let key = (entity_id.to_string(), date_key.to_string());
        let mut map = self.lock_map();
        match map.get(&key) {
            Some(entry) if entry.is_fresh(now) => Some(entry.result.clone()),
            Some(_) => {
                map.remove(&key);
                None
            }
            None => None,
        }
    }

    pub fn put_at(
        &self,
        entity_id: &str,
        date_key: &str,
        result: ScoreResult,
        ttl: Duration,
        now: u64,
    ) {
        let mut map = self.lock_map();
        map.insert(
            (entity_id.to_string(), date_key.to_string()),
            Entry {
                stored_at: now,
                ttl_secs: ttl.as_secs(),
                result,
            },
        );
    }

    /// Drop every expired entry; returns how many were evicted.
    pub fn purge_expired(&self) -> usize {
        let now = now_unix();
        let mut map = self.lock_map();
        let before = map.len();
        map.retain(|_, e| e.is_fresh(now));
        before - map.len()
    }

    pub fn len(&self) -> usize {
        self.lock_map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Recover a poisoned guard: the map holds only complete entries (every
    /// insert is a single call), so the data is valid even after a panic in
    /// another thread.
    fn lock_map(&self) -> std::sync::MutexGuard<'_, HashMap<(String, String), Entry>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
