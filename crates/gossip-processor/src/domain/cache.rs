//! Keyed cache of live work units.
//!
//! Guarantees a single [`WorkUnit`] instance per distinct payload while any
//! handle is retained, and time-based eviction of idle entries afterwards.
//! The key is the full payload byte-string, not a hash of it: hashing is the
//! very work the cache exists to deduplicate.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::domain::config::CacheConfig;
use crate::domain::work_unit::WorkUnit;

struct CacheEntry {
    unit: Arc<WorkUnit>,
    consumers: u32,
    /// Set when the last handle is released; cleared on re-acquisition.
    released_at: Option<Instant>,
}

struct CacheInner {
    config: CacheConfig,
    entries: Mutex<HashMap<Arc<[u8]>, CacheEntry>>,
}

impl CacheInner {
    /// Sweeps idle entries whose cache time has elapsed. Caller holds the
    /// entries lock.
    fn evict_expired_locked(&self, entries: &mut HashMap<Arc<[u8]>, CacheEntry>) {
        let cache_time = self.config.cache_time();
        let before = entries.len();
        entries.retain(|_, entry| {
            entry.consumers > 0
                || entry
                    .released_at
                    .map_or(true, |released| released.elapsed() < cache_time)
        });
        let evicted = before - entries.len();
        if evicted > 0 {
            debug!(evicted, remaining = entries.len(), "evicted idle work units");
        }
    }
}

/// Cache of live work units keyed by payload bytes.
pub struct WorkUnitCache {
    inner: Arc<CacheInner>,
}

impl WorkUnitCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                config,
                entries: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Returns a retained handle to the unit for `bytes`, constructing it
    /// via `factory` if absent.
    ///
    /// Atomic per key: two concurrent callers for the same payload never
    /// both construct; one of them always receives a handle to the other's
    /// unit.
    pub fn compute_if_absent(
        &self,
        bytes: &[u8],
        factory: impl FnOnce(Arc<[u8]>) -> WorkUnit,
    ) -> CachedWorkUnit {
        let leak = &self.inner.config.leak_detection;
        let mut entries = self.inner.entries.lock();
        self.inner.evict_expired_locked(&mut entries);

        let unit = match entries.get_mut(bytes) {
            Some(entry) => {
                entry.consumers += 1;
                entry.released_at = None;
                if leak.enabled && entry.consumers > leak.max_consumers_per_object {
                    warn!(
                        consumers = entry.consumers,
                        max = leak.max_consumers_per_object,
                        "work unit retained by more handles than expected"
                    );
                }
                Arc::clone(&entry.unit)
            }
            None => {
                let key: Arc<[u8]> = Arc::from(bytes);
                let unit = Arc::new(factory(Arc::clone(&key)));
                entries.insert(
                    key,
                    CacheEntry {
                        unit: Arc::clone(&unit),
                        consumers: 1,
                        released_at: None,
                    },
                );
                unit
            }
        };
        drop(entries);

        CachedWorkUnit {
            cache: Arc::clone(&self.inner),
            unit,
            acquired_at: Instant::now(),
        }
    }

    /// Number of entries currently held, idle ones included.
    pub fn size(&self) -> usize {
        self.inner.entries.lock().len()
    }

    /// Sweeps idle entries whose cache time has elapsed.
    ///
    /// Also runs opportunistically on every [`Self::compute_if_absent`].
    pub fn evict_expired(&self) {
        let mut entries = self.inner.entries.lock();
        self.inner.evict_expired_locked(&mut entries);
    }
}

/// Retained handle to a cached [`WorkUnit`].
///
/// Move-only; dropping it releases the retain count, and the last release
/// starts the entry's eviction clock.
pub struct CachedWorkUnit {
    cache: Arc<CacheInner>,
    unit: Arc<WorkUnit>,
    acquired_at: Instant,
}

impl CachedWorkUnit {
    /// The underlying work unit.
    pub fn work_unit(&self) -> &WorkUnit {
        &self.unit
    }
}

impl Drop for CachedWorkUnit {
    fn drop(&mut self) {
        let leak = &self.cache.config.leak_detection;
        if leak.enabled {
            let held = self.acquired_at.elapsed();
            if held > leak.max_consumer_hold_time() {
                warn!(
                    held_ms = held.as_millis() as u64,
                    "work unit handle released after exceeding the hold-time limit"
                );
            }
        }

        let mut entries = self.cache.entries.lock();
        if let Some(entry) = entries.get_mut(self.unit.received_bytes()) {
            entry.consumers = entry.consumers.saturating_sub(1);
            if entry.consumers == 0 {
                entry.released_at = Some(Instant::now());
            }
        }
    }
}
