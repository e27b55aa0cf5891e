//! Cache Statistics Module
//!
//! Tracks serving and regeneration counters shared by the resolver, the
//! HTTP handlers and the regeneration worker.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

// == Cache Stats ==
/// Lock-free counters; cloned into a [`StatsSnapshot`] for reporting.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    stale_hits: AtomicU64,
    misses: AtomicU64,
    fallbacks: AtomicU64,
    claims_won: AtomicU64,
    claims_lost: AtomicU64,
    regenerations: AtomicU64,
    failures: AtomicU64,
}

/// Point-in-time copy of [`CacheStats`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Fresh records served
    pub hits: u64,
    /// Stale records served while awaiting regeneration
    pub stale_hits: u64,
    /// Lookups with no record at or below the requested version
    pub misses: u64,
    /// Renders answered with default copy
    pub fallbacks: u64,
    pub claims_won: u64,
    pub claims_lost: u64,
    /// Successful regenerations committed with `put`
    pub regenerations: u64,
    /// Failed or timed-out regenerations
    pub failures: u64,
}

impl CacheStats {
    // == Constructor ==
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stale_hit(&self) {
        self.stale_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fallback(&self) {
        self.fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_claim(&self, won: bool) {
        let counter = if won { &self.claims_won } else { &self.claims_lost };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_regeneration(&self) {
        self.regenerations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    // == Snapshot ==
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            stale_hits: self.stale_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            fallbacks: self.fallbacks.load(Ordering::Relaxed),
            claims_won: self.claims_won.load(Ordering::Relaxed),
            claims_lost: self.claims_lost.load(Ordering::Relaxed),
            regenerations: self.regenerations.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

impl StatsSnapshot {
    // == Hit Rate ==
    /// Share of lookups answered from the cache, stale or not.
    ///
    /// Returns 0.0 if no lookups have been made.
    pub fn hit_rate(&self) -> f64 {
        let served = self.hits + self.stale_hits;
        let total = served + self.misses;
        if total == 0 {
            0.0
        } else {
            served as f64 / total as f64
        }
    }
}
