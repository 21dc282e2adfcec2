//! Template cache.
//!
//! Memoizes [`NamedSql`] templates keyed by the exact SQL text handed in by the
//! caller. Entries expire after a time-to-live or an idle period and are removed
//! by a background sweeper; the store is bounded by a soft capacity.
//!
//! ```ignore
//! let cache = TemplateCache::new(CacheConfig::default());
//! let template = cache.get_or_build("SELECT * FROM users WHERE id = :id")?;
//! assert_eq!(template.parameterized_sql(), "SELECT * FROM users WHERE id = ?");
//! ```

use std::fmt;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use once_cell::sync::Lazy;

use crate::error::Result;
use crate::named_sql::{Attributes, NamedSql};
use crate::translator::ValidationMode;

pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);
pub const DEFAULT_MAX_IDLE: Duration = Duration::from_secs(24 * 60 * 60);
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Entries allowed per GiB of available memory.
const ENTRIES_PER_GIB: usize = 1000;
const MAX_GIB_MULTIPLIER: u64 = 8;

/// Soft capacity for a machine with `memory_mb` megabytes available:
/// `1000 * clamp(memory_mb / 1024, 1, 8)`.
pub fn capacity_for_memory_mb(memory_mb: u64) -> usize {
    ENTRIES_PER_GIB * (memory_mb / 1024).clamp(1, MAX_GIB_MULTIPLIER) as usize
}

/// Available memory in megabytes, read from `/proc/meminfo` where present.
pub fn available_memory_mb() -> Option<u64> {
    let meminfo = std::fs::read_to_string("/proc/meminfo").ok()?;
    meminfo
        .lines()
        .find_map(|line| line.strip_prefix("MemAvailable:"))
        .and_then(|rest| rest.trim().trim_end_matches("kB").trim().parse::<u64>().ok())
        .map(|kb| kb / 1024)
}

/// Cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Soft cap on the number of entries.
    pub capacity: usize,
    /// Maximum age of an entry.
    pub ttl: Duration,
    /// Maximum time an entry may go unread.
    pub max_idle: Duration,
    /// How often the background sweeper runs.
    pub sweep_interval: Duration,
    /// Validation applied to templates built by this cache.
    pub validation: ValidationMode,
}

impl CacheConfig {
    /// Default settings with the capacity derived from `memory_mb`.
    pub fn for_memory_mb(memory_mb: u64) -> Self {
        Self {
            capacity: capacity_for_memory_mb(memory_mb),
            ttl: DEFAULT_TTL,
            max_idle: DEFAULT_MAX_IDLE,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            validation: ValidationMode::Lenient,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::for_memory_mb(available_memory_mb().unwrap_or(0))
    }
}

/// Time source for expiry decisions.
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    offset_nanos: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset_nanos: AtomicU64::new(0),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.offset_nanos.fetch_add(duration_nanos(by), Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + Duration::from_nanos(self.offset_nanos.load(Ordering::SeqCst))
    }
}

fn duration_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

struct CacheEntry {
    template: Arc<NamedSql>,
    created_at: Instant,
    /// Nanoseconds since the cache epoch; refreshed on every hit without locking.
    last_accessed: AtomicU64,
}

/// Thread-safe template cache with TTL and idle expiry
pub struct TemplateCache {
    entries: DashMap<String, CacheEntry>,
    // Cache-wide critical section for the miss path. Construction runs under it
    // with no re-check of the map, so concurrent misses on one key each build a
    // template and the last insert is what later callers see. Keep it that way:
    // a single-flight variant changes throughput under contention.
    build_lock: Mutex<()>,
    config: CacheConfig,
    clock: Arc<dyn Clock>,
    epoch: Instant,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl TemplateCache {
    pub fn new(config: CacheConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        let epoch = clock.now();
        Self {
            entries: DashMap::with_capacity(config.capacity),
            build_lock: Mutex::new(()),
            config,
            clock,
            epoch,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Returns the cached template for `sql`, building and inserting it on a miss.
    pub fn get_or_build(&self, sql: &str) -> Result<Arc<NamedSql>> {
        self.get_or_build_with_attributes(sql, Attributes::new())
    }

    /// Like [`TemplateCache::get_or_build`]; `attributes` are only used when a new
    /// template is built. A hit returns the stored template with its own attributes.
    ///
    /// Build errors are returned as-is and leave nothing in the cache.
    pub fn get_or_build_with_attributes(&self, sql: &str, attributes: Attributes) -> Result<Arc<NamedSql>> {
        if let Some(template) = self.lookup(sql) {
            return Ok(template);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let _guard = self.build_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let template = match NamedSql::build_with_mode(sql, attributes, self.config.validation) {
            Ok(template) => Arc::new(template),
            Err(err) => {
                tracing::debug!(error = %err, "failed to build SQL template");
                return Err(err);
            }
        };

        let now = self.clock.now();
        self.make_room(sql, now);
        self.entries.insert(
            sql.to_string(),
            CacheEntry {
                template: Arc::clone(&template),
                created_at: now,
                last_accessed: AtomicU64::new(self.nanos_since_epoch(now)),
            },
        );

        tracing::debug!(
            sql = %template.sql(),
            parameters = template.parameter_count(),
            "cached SQL template"
        );

        Ok(template)
    }

    fn lookup(&self, sql: &str) -> Option<Arc<NamedSql>> {
        let now = self.clock.now();
        let entry = self.entries.get(sql)?;

        if self.is_expired(&entry, now) {
            drop(entry);
            if self.entries.remove_if(sql, |_, entry| self.is_expired(entry, now)).is_some() {
                self.evictions.fetch_add(1, Ordering::Relaxed);
            }
            return None;
        }

        entry
            .last_accessed
            .store(self.nanos_since_epoch(now), Ordering::Relaxed);
        self.hits.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(sql, "SQL template cache hit");

        Some(Arc::clone(&entry.template))
    }

    fn nanos_since_epoch(&self, now: Instant) -> u64 {
        duration_nanos(now.saturating_duration_since(self.epoch))
    }

    fn is_expired(&self, entry: &CacheEntry, now: Instant) -> bool {
        let age = now.saturating_duration_since(entry.created_at);
        let idle_nanos = self
            .nanos_since_epoch(now)
            .saturating_sub(entry.last_accessed.load(Ordering::Relaxed));

        age >= self.config.ttl || Duration::from_nanos(idle_nanos) >= self.config.max_idle
    }

    /// Frees a slot for `key` when the cache is full: expired entries first, then
    /// the least recently accessed one.
    fn make_room(&self, key: &str, now: Instant) {
        let capacity = self.config.capacity.max(1);
        if self.entries.len() < capacity || self.entries.contains_key(key) {
            return;
        }

        self.evict_expired_at(now);
        if self.entries.len() < capacity {
            return;
        }

        let oldest = self
            .entries
            .iter()
            .min_by_key(|entry| entry.last_accessed.load(Ordering::Relaxed))
            .map(|entry| entry.key().clone());

        if let Some(oldest) = oldest {
            if self.entries.remove(&oldest).is_some() {
                self.evictions.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(sql = %oldest, "evicted least recently used SQL template");
            }
        }
    }

    /// Removes expired entries and returns how many were dropped.
    pub fn evict_expired(&self) -> usize {
        self.evict_expired_at(self.clock.now())
    }

    fn evict_expired_at(&self, now: Instant) -> usize {
        let mut removed = 0;
        self.entries.retain(|_, entry| {
            let keep = !self.is_expired(entry, now);
            if !keep {
                removed += 1;
            }
            keep
        });

        if removed > 0 {
            self.evictions.fetch_add(removed as u64, Ordering::Relaxed);
            tracing::debug!(removed, remaining = self.entries.len(), "swept expired SQL templates");
        }

        removed
    }

    /// Whether a live entry exists for `sql`. Does not refresh its access time.
    pub fn contains(&self, sql: &str) -> bool {
        let now = self.clock.now();
        self.entries
            .get(sql)
            .map_or(false, |entry| !self.is_expired(&entry, now))
    }

    /// Drops the entry for `sql`, returning whether one was present.
    pub fn invalidate(&self, sql: &str) -> bool {
        self.entries.remove(sql).is_some()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    /// Spawns the background sweeper. The thread only holds a weak reference and
    /// exits after the cache is dropped.
    pub fn start_sweeper(cache: &Arc<Self>) -> io::Result<JoinHandle<()>> {
        let weak = Arc::downgrade(cache);
        let interval = cache.config.sweep_interval;

        thread::Builder::new()
            .name("sql-template-sweeper".to_string())
            .spawn(move || loop {
                thread::sleep(interval);
                match weak.upgrade() {
                    Some(cache) => {
                        cache.evict_expired();
                    }
                    None => break,
                }
            })
    }
}

impl fmt::Debug for TemplateCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemplateCache")
            .field("entries", &self.entries.len())
            .field("config", &self.config)
            .field("clock", &self.clock)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl CacheStats {
    /// Hit rate as a percentage
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

static GLOBAL_CACHE: Lazy<Arc<TemplateCache>> = Lazy::new(|| {
    let cache = Arc::new(TemplateCache::new(CacheConfig::default()));
    if let Err(err) = TemplateCache::start_sweeper(&cache) {
        tracing::warn!(error = %err, "failed to start SQL template sweeper");
    }
    tracing::debug!(capacity = cache.config.capacity, "initialized SQL template cache");
    cache
});

/// The process-wide cache, created on first use.
pub fn global() -> &'static Arc<TemplateCache> {
    &GLOBAL_CACHE
}
