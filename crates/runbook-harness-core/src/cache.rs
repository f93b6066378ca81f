//! Time-boxed memoization of match results.
//!
//! Entries are keyed by a SHA-256 digest of `(tenant, agent, query, k)` and
//! live for a fixed TTL. A stale entry is evicted when its key is looked up,
//! and every insert sweeps all stale entries, so the map never holds more
//! than one TTL's worth of distinct queries. There is no background sweep.
//! Empty result lists are cached like any other, so a confirmed miss is not
//! re-scanned.
//!
//! Concurrent writers to the same key race harmlessly: last write wins.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};

use crate::models::{CollectionKey, MatchResult};

/// Default entry lifetime.
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Monotonic time source, measured from an arbitrary origin.
pub trait Clock: Send + Sync {
    fn now(&self) -> Duration;
}

/// Wall-clock [`Clock`] backed by [`Instant`].
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Hand-driven [`Clock`] for tests.
#[derive(Default)]
pub struct ManualClock {
    millis: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        self.millis
            .fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_millis(self.millis.load(Ordering::SeqCst))
    }
}

struct CacheEntry {
    results: Vec<MatchResult>,
    created_at: Duration,
}

/// Process-wide result cache shared by every matcher.
pub struct ResultCache {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl ResultCache {
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock::new()))
    }

    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl,
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Deterministic cache key for one match request.
    pub fn key(collection: CollectionKey, query: &str, k: usize) -> String {
        let payload = serde_json::json!({
            "tenant_id": collection.tenant_id,
            "agent_id": collection.agent_id,
            "query": query,
            "k": k,
        });
        let mut hasher = Sha256::new();
        hasher.update(payload.to_string().as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Returns the cached results for `key` if the entry is still fresh.
    ///
    /// A stale entry is removed and reported as a miss.
    pub fn get(&self, key: &str) -> Option<Vec<MatchResult>> {
        let now = self.clock.now();
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        match entries.get(key) {
            Some(entry) if now.saturating_sub(entry.created_at) < self.ttl => {
                Some(entry.results.clone())
            }
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Stores `results` under `key`, first dropping every stale entry.
    pub fn insert(&self, key: String, results: Vec<MatchResult>) {
        let now = self.clock.now();
        let ttl = self.ttl;
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.retain(|_, entry| now.saturating_sub(entry.created_at) < ttl);
        entries.insert(
            key,
            CacheEntry {
                results,
                created_at: now,
            },
        );
    }

    /// Drops every entry. Returns how many were removed.
    pub fn clear(&self) -> usize {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let n = entries.len();
        entries.clear();
        n
    }

    /// Number of entries currently held, including not-yet-evicted stale ones.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
