//! Bounded in-memory cache with per-type TTL and LRU eviction.
//!
//! Keys are `"{type}:{key}"`. The cache holds at most [`MAX_ENTRIES`]
//! entries and [`MAX_BYTES`] of serialized payload; the least recently
//! used entry is evicted when either bound is reached. All bookkeeping
//! (order, size accounting, statistics) lives in one critical section so
//! every operation appears atomic and the bounds hold after each commit.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::Value;

pub const MAX_ENTRIES: usize = 1_000;
pub const MAX_BYTES: usize = 50 * 1024 * 1024;

/// Closed set of cacheable artifact types, each with its own TTL budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheType {
    Address,
    Building,
    Coordinate,
    Realtime,
    Static,
}

impl CacheType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Address => "address",
            Self::Building => "building",
            Self::Coordinate => "coordinate",
            Self::Realtime => "realtime",
            Self::Static => "static",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "address" => Some(Self::Address),
            "building" => Some(Self::Building),
            "coordinate" => Some(Self::Coordinate),
            "realtime" => Some(Self::Realtime),
            "static" => Some(Self::Static),
            _ => None,
        }
    }

    /// Per-type TTL policy.
    pub fn ttl(&self) -> Duration {
        match self {
            Self::Address => Duration::from_secs(86_400),
            Self::Building => Duration::from_secs(86_400),
            Self::Coordinate => Duration::from_secs(604_800),
            Self::Realtime => Duration::from_secs(300),
            Self::Static => Duration::from_secs(2_592_000),
        }
    }
}

struct CacheEntry {
    value: Value,
    created: Instant,
    expires: Instant,
    hits: u64,
    size: usize,
    /// Recency stamp; larger means more recently used.
    stamp: u64,
}

#[derive(Default)]
struct Counters {
    hits: u64,
    misses: u64,
    sets: u64,
    deletes: u64,
    evictions: u64,
}

struct CacheInner {
    entries: HashMap<String, CacheEntry>,
    total_bytes: usize,
    next_stamp: u64,
    counters: Counters,
}

/// Result of a cache lookup.
#[derive(Debug, Clone)]
pub struct CacheLookup {
    pub hit: bool,
    pub value: Option<Value>,
    pub age_ms: Option<u64>,
}

impl CacheLookup {
    fn miss() -> Self {
        Self { hit: false, value: None, age_ms: None }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub size: usize,
    pub max_size: usize,
    pub hit_rate: f64,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailedCacheStats {
    #[serde(flatten)]
    pub base: CacheStats,
    pub sets: u64,
    pub deletes: u64,
    pub calculated_size: usize,
    pub max_calculated_size: usize,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryUsage {
    pub current: usize,
    pub max: usize,
    pub percentage: f64,
}

pub struct LruCache {
    inner: Mutex<CacheInner>,
    max_entries: usize,
    max_bytes: usize,
}

impl Default for LruCache {
    fn default() -> Self {
        Self::new()
    }
}

impl LruCache {
    pub fn new() -> Self {
        Self::with_limits(MAX_ENTRIES, MAX_BYTES)
    }

    pub fn with_limits(max_entries: usize, max_bytes: usize) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                total_bytes: 0,
                next_stamp: 0,
                counters: Counters::default(),
            }),
            max_entries,
            max_bytes,
        }
    }

    fn full_key(kind: CacheType, key: &str) -> String {
        format!("{}:{}", kind.as_str(), key)
    }

    /// Insert a value. Effective TTL is `ttl` when given, else the type's
    /// policy TTL. Size is the serialized footprint of the value.
    pub fn set(&self, kind: CacheType, key: &str, value: Value, ttl: Option<Duration>) {
        let full = Self::full_key(kind, key);
        let size = serialized_size(&value);
        let now = Instant::now();
        let effective = ttl.unwrap_or_else(|| kind.ttl());

        let mut inner = self.lock();
        inner.counters.sets += 1;

        if let Some(old) = inner.entries.remove(&full) {
            inner.total_bytes -= old.size;
        }

        let stamp = inner.bump_stamp();
        inner.entries.insert(
            full,
            CacheEntry {
                value,
                created: now,
                expires: now + effective,
                hits: 0,
                size,
                stamp,
            },
        );
        inner.total_bytes += size;

        self.evict_over_bounds(&mut inner);
    }

    /// Look a value up. Expired entries are removed and reported as misses;
    /// a hit bumps the entry's hit counter and refreshes its recency.
    pub fn get(&self, kind: CacheType, key: &str) -> CacheLookup {
        let full = Self::full_key(kind, key);
        let now = Instant::now();
        let mut inner = self.lock();
        let stamp = inner.bump_stamp();

        let found = match inner.entries.get_mut(&full) {
            None => None,
            Some(entry) if entry.expires <= now => None,
            Some(entry) => {
                entry.hits += 1;
                entry.stamp = stamp;
                Some(CacheLookup {
                    hit: true,
                    value: Some(entry.value.clone()),
                    age_ms: Some(now.duration_since(entry.created).as_millis() as u64),
                })
            }
        };

        match found {
            Some(lookup) => {
                inner.counters.hits += 1;
                lookup
            }
            None => {
                // drop the entry if it was present but expired
                if let Some(entry) = inner.entries.remove(&full) {
                    inner.total_bytes -= entry.size;
                }
                inner.counters.misses += 1;
                CacheLookup::miss()
            }
        }
    }

    pub fn delete(&self, kind: CacheType, key: &str) -> bool {
        let full = Self::full_key(kind, key);
        let mut inner = self.lock();
        match inner.entries.remove(&full) {
            Some(entry) => {
                inner.total_bytes -= entry.size;
                inner.counters.deletes += 1;
                true
            }
            None => false,
        }
    }

    /// Drop every entry of one type. Returns how many were removed.
    pub fn delete_by_type(&self, kind: CacheType) -> usize {
        let prefix = format!("{}:", kind.as_str());
        let mut inner = self.lock();
        let doomed: Vec<String> = inner
            .entries
            .keys()
            .filter(|k| k.starts_with(&prefix))
            .cloned()
            .collect();
        for key in &doomed {
            if let Some(entry) = inner.entries.remove(key) {
                inner.total_bytes -= entry.size;
                inner.counters.deletes += 1;
            }
        }
        doomed.len()
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        let count = inner.entries.len() as u64;
        inner.entries.clear();
        inner.total_bytes = 0;
        inner.counters.deletes += count;
    }

    pub fn has(&self, kind: CacheType, key: &str) -> bool {
        let full = Self::full_key(kind, key);
        let now = Instant::now();
        let mut inner = self.lock();
        match inner.entries.get(&full) {
            Some(entry) if entry.expires > now => true,
            Some(_) => {
                if let Some(entry) = inner.entries.remove(&full) {
                    inner.total_bytes -= entry.size;
                }
                false
            }
            None => false,
        }
    }

    /// Milliseconds until the entry expires, `None` when absent or expired.
    pub fn remaining_ttl(&self, kind: CacheType, key: &str) -> Option<u64> {
        let full = Self::full_key(kind, key);
        let now = Instant::now();
        let inner = self.lock();
        inner.entries.get(&full).and_then(|entry| {
            if entry.expires > now {
                Some(entry.expires.duration_since(now).as_millis() as u64)
            } else {
                None
            }
        })
    }

    pub fn memory_usage(&self) -> MemoryUsage {
        let inner = self.lock();
        MemoryUsage {
            current: inner.total_bytes,
            max: self.max_bytes,
            percentage: if self.max_bytes == 0 {
                0.0
            } else {
                inner.total_bytes as f64 / self.max_bytes as f64 * 100.0
            },
        }
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.lock();
        self.stats_locked(&inner)
    }

    pub fn detailed_stats(&self) -> DetailedCacheStats {
        let inner = self.lock();
        DetailedCacheStats {
            base: self.stats_locked(&inner),
            sets: inner.counters.sets,
            deletes: inner.counters.deletes,
            calculated_size: inner.total_bytes,
            max_calculated_size: self.max_bytes,
        }
    }

    pub fn reset_stats(&self) {
        let mut inner = self.lock();
        inner.counters = Counters::default();
    }

    fn stats_locked(&self, inner: &CacheInner) -> CacheStats {
        let total = inner.counters.hits + inner.counters.misses;
        CacheStats {
            hits: inner.counters.hits,
            misses: inner.counters.misses,
            size: inner.entries.len(),
            max_size: self.max_entries,
            hit_rate: if total == 0 {
                0.0
            } else {
                inner.counters.hits as f64 / total as f64 * 100.0
            },
        }
    }

    fn evict_over_bounds(&self, inner: &mut CacheInner) {
        while inner.entries.len() > self.max_entries || inner.total_bytes > self.max_bytes {
            let victim = inner
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.stamp)
                .map(|(key, _)| key.clone());
            let Some(key) = victim else { break };
            if let Some(entry) = inner.entries.remove(&key) {
                inner.total_bytes -= entry.size;
                inner.counters.evictions += 1;
                tracing::debug!(
                    "cache evicted {} (size {} bytes, {} hit(s))",
                    key,
                    entry.size,
                    entry.hits
                );
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CacheInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl CacheInner {
    fn bump_stamp(&mut self) -> u64 {
        self.next_stamp += 1;
        self.next_stamp
    }
}

/// Serialized footprint of a value in bytes.
fn serialized_size(value: &Value) -> usize {
    serde_json::to_string(value).map(|s| s.len()).unwrap_or(0)
}
