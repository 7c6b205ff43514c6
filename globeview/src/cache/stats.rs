//! Cache counters

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free counters updated by the cache and its load tasks.
#[derive(Debug, Default)]
pub(crate) struct CacheCounters {
    fetches_started: AtomicU64,
    fetch_failures: AtomicU64,
    ready_hits: AtomicU64,
    pending_joins: AtomicU64,
    fallback_hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheCounters {
    pub fn record_fetch_started(&self) {
        self.fetches_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fetch_failure(&self) {
        self.fetch_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ready_hit(&self) {
        self.ready_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_pending_join(&self) {
        self.pending_joins.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fallback_hit(&self) {
        self.fallback_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, entry_count: usize, pending_count: usize) -> CacheStats {
        CacheStats {
            fetches_started: self.fetches_started.load(Ordering::Relaxed),
            fetch_failures: self.fetch_failures.load(Ordering::Relaxed),
            ready_hits: self.ready_hits.load(Ordering::Relaxed),
            pending_joins: self.pending_joins.load(Ordering::Relaxed),
            fallback_hits: self.fallback_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entry_count,
            pending_count,
        }
    }
}

/// Point-in-time cache statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Network fetches started (one per pending entry created)
    pub fetches_started: u64,
    /// Fetches that failed and had their entry removed
    pub fetch_failures: u64,
    /// Requests or lookups answered by a ready entry
    pub ready_hits: u64,
    /// Requests that joined an in-flight load
    pub pending_joins: u64,
    /// Best-available lookups answered by an ancestor or children
    pub fallback_hits: u64,
    /// Best-available lookups with nothing to show
    pub misses: u64,
    /// Entries currently in the cache, pending or ready
    pub entry_count: usize,
    /// Entries currently pending
    pub pending_count: usize,
}

impl CacheStats {
    /// Fraction of requests that did not start a new fetch.
    pub fn dedup_ratio(&self) -> f64 {
        let total = self.fetches_started + self.ready_hits + self.pending_joins;
        if total == 0 {
            0.0
        } else {
            (self.ready_hits + self.pending_joins) as f64 / total as f64
        }
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "entries={} pending={} fetches={} failures={} ready_hits={} joins={} fallbacks={} misses={}",
            self.entry_count,
            self.pending_count,
            self.fetches_started,
            self.fetch_failures,
            self.ready_hits,
            self.pending_joins,
            self.fallback_hits,
            self.misses
        )
    }
}
