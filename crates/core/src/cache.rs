//! In-process response cache for generated advice.
//!
//! Entries expire lazily on read once older than the TTL. When the map is full,
//! the single oldest entry (by insertion time) is evicted before a new key is
//! inserted. Each `get` and `set` runs under one lock acquisition.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::config::CacheConfig;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheEntry {
    pub value: String,
    pub created_at: DateTime<Utc>,
}

pub struct ResponseCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    ttl: chrono::Duration,
    max_entries: usize,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache")
            .field("ttl", &self.ttl)
            .field("max_entries", &self.max_entries)
            .field("len", &self.len())
            .finish()
    }
}

impl ResponseCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self::with_clock(ttl, max_entries, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, max_entries: usize, clock: Arc<dyn Clock>) -> Self {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        Self { entries: Mutex::new(HashMap::new()), ttl, max_entries, clock }
    }

    /// `None` when caching is disabled.
    pub fn from_config(config: &CacheConfig) -> Option<Self> {
        config
            .enabled
            .then(|| Self::new(Duration::from_secs(config.ttl_secs), config.max_entries))
    }

    /// One-way key over the concatenated request fields; collisions are tolerated.
    pub fn key(user_id: &str, question: &str, context: Option<&str>) -> String {
        let mut hasher = Sha256::new();
        hasher.update(user_id.as_bytes());
        hasher.update(question.as_bytes());
        hasher.update(context.unwrap_or_default().as_bytes());
        format!("{:x}", hasher.finalize())
    }

    pub fn get(&self, user_id: &str, question: &str, context: Option<&str>) -> Option<String> {
        let key = Self::key(user_id, question, context);
        let now = self.clock.now();
        let mut entries = self.lock();

        let expired = match entries.get(&key) {
            None => return None,
            Some(entry) => now - entry.created_at >= self.ttl,
        };
        if expired {
            entries.remove(&key);
            debug!(event_name = "cache.expired", key = %key, "evicted expired cache entry on read");
            return None;
        }

        entries.get(&key).map(|entry| entry.value.clone())
    }

    pub fn set(
        &self,
        user_id: &str,
        question: &str,
        context: Option<&str>,
        value: impl Into<String>,
    ) {
        if self.max_entries == 0 {
            return;
        }

        let key = Self::key(user_id, question, context);
        let created_at = self.clock.now();
        let mut entries = self.lock();

        if !entries.contains_key(&key) && entries.len() >= self.max_entries {
            let oldest = entries
                .iter()
                .min_by_key(|(_, entry)| entry.created_at)
                .map(|(oldest_key, _)| oldest_key.clone());
            if let Some(oldest) = oldest {
                entries.remove(&oldest);
                debug!(event_name = "cache.evicted", key = %oldest, "evicted oldest cache entry");
            }
        }

        entries.insert(key, CacheEntry { value: value.into(), created_at });
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        // A panic while holding the lock cannot leave a half-written entry behind.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use chrono::{DateTime, TimeZone, Utc};

    use super::{Clock, ResponseCache};
    use crate::config::CacheConfig;

    struct ManualClock(Mutex<DateTime<Utc>>);

    impl ManualClock {
        fn starting_at(seconds: i64) -> Arc<Self> {
            Arc::new(Self(Mutex::new(Utc.timestamp_opt(seconds, 0).single().expect("valid ts"))))
        }

        fn advance(&self, seconds: i64) {
            let mut now = self.0.lock().expect("clock lock");
            *now += chrono::Duration::seconds(seconds);
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.0.lock().expect("clock lock")
        }
    }

    fn cache(clock: Arc<ManualClock>, max_entries: usize) -> ResponseCache {
        ResponseCache::with_clock(Duration::from_secs(3600), max_entries, clock)
    }

    #[test]
    fn set_then_get_returns_stored_value() {
        let cache = cache(ManualClock::starting_at(1_700_000_000), 100);
        cache.set("u1", "How do I save money?", Some("student"), "Save 20%. Invest.");

        assert_eq!(
            cache.get("u1", "How do I save money?", Some("student")).as_deref(),
            Some("Save 20%. Invest.")
        );
        assert_eq!(cache.get("u2", "How do I save money?", Some("student")), None);
        assert_eq!(cache.get("u1", "How do I save money?", None), None);
    }

    #[test]
    fn entries_expire_lazily_after_ttl() {
        let clock = ManualClock::starting_at(1_700_000_000);
        let cache = cache(clock.clone(), 100);
        cache.set("u1", "q", None, "advice text");

        clock.advance(3599);
        assert!(cache.get("u1", "q", None).is_some());
        assert_eq!(cache.len(), 1);

        clock.advance(2);
        assert_eq!(cache.get("u1", "q", None), None);
        assert!(cache.is_empty(), "expired entry should be removed on access");
    }

    #[test]
    fn inserting_past_capacity_evicts_only_the_oldest_entry() {
        let clock = ManualClock::starting_at(1_700_000_000);
        let cache = cache(clock.clone(), 3);

        for question in ["q1", "q2", "q3"] {
            cache.set("u1", question, None, format!("answer to {question}"));
            clock.advance(10);
        }
        cache.set("u1", "q4", None, "answer to q4");

        assert_eq!(cache.len(), 3);
        assert_eq!(cache.get("u1", "q1", None), None);
        for question in ["q2", "q3", "q4"] {
            assert_eq!(
                cache.get("u1", question, None),
                Some(format!("answer to {question}")),
                "{question} should be retained"
            );
        }
    }

    #[test]
    fn overwriting_an_existing_key_does_not_evict() {
        let clock = ManualClock::starting_at(1_700_000_000);
        let cache = cache(clock.clone(), 2);
        cache.set("u1", "q1", None, "first");
        clock.advance(1);
        cache.set("u1", "q2", None, "second");
        clock.advance(1);
        cache.set("u1", "q1", None, "first, revised");

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("u1", "q1", None).as_deref(), Some("first, revised"));
        assert_eq!(cache.get("u1", "q2", None).as_deref(), Some("second"));
    }

    #[test]
    fn key_is_stable_hex_digest() {
        let first = ResponseCache::key("u1", "q", Some("c"));
        assert_eq!(first, ResponseCache::key("u1", "q", Some("c")));
        assert_eq!(first.len(), 64);
        assert_ne!(first, ResponseCache::key("u1", "q", None));
    }

    #[test]
    fn disabled_config_builds_no_cache() {
        let disabled = CacheConfig { enabled: false, ttl_secs: 3600, max_entries: 100 };
        assert!(ResponseCache::from_config(&disabled).is_none());

        let enabled = CacheConfig { enabled: true, ttl_secs: 60, max_entries: 5 };
        assert!(ResponseCache::from_config(&enabled).is_some());
    }
}
