//! Bounded lookup cache.

use std::collections::{HashMap, VecDeque};

use crate::clinvar::ClinVarEntry;

/// High-water mark before eviction kicks in.
pub const CACHE_CAPACITY: usize = 10_000;

/// Fraction of the cache dropped per eviction pass, oldest first.
const EVICT_FRACTION: usize = 10;

/// Cache statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cache hits
    pub hits: u64,
    /// Number of cache misses
    pub misses: u64,
    /// Entries dropped by eviction
    pub evictions: u64,
    /// Current entry count
    pub len: usize,
}

impl CacheStats {
    /// Hit rate as a percentage (0.0 if no lookups yet).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

/// Insertion-ordered cache of lookup results, keyed by `chrom:pos` (or by
/// marker ID when the position is unknown).
///
/// Negative results are cached too (`None` means the reference has no
/// entry for that key), so repeated misses stay cheap. When the cache
/// exceeds its capacity the oldest tenth of entries is dropped in one
/// pass rather than evicting on every insert.
pub struct QueryCache {
    entries: HashMap<String, Option<ClinVarEntry>>,
    order: VecDeque<String>,
    capacity: usize,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl QueryCache {
    pub fn new() -> Self {
        Self::with_capacity(CACHE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
            hits: 0,
            misses: 0,
            evictions: 0,
        }
    }

    /// Look up a cached result. The outer `Option` distinguishes "never
    /// looked up" from a cached negative.
    pub fn get(&mut self, key: &str) -> Option<Option<ClinVarEntry>> {
        match self.entries.get(key) {
            Some(cached) => {
                self.hits += 1;
                Some(cached.clone())
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Record a lookup result.
    pub fn insert(&mut self, key: String, result: Option<ClinVarEntry>) {
        if self.entries.insert(key.clone(), result).is_none() {
            self.order.push_back(key);
        }
        if self.entries.len() > self.capacity {
            self.evict();
        }
    }

    fn evict(&mut self) {
        let to_drop = (self.capacity / EVICT_FRACTION).max(1);
        for _ in 0..to_drop {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            self.entries.remove(&oldest);
            self.evictions += 1;
        }
        log::debug!("evicted {} cache entries", to_drop);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
            len: self.entries.len(),
        }
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new()
    }
}
