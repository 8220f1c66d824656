//! Render cache metrics
//!
//! Counters for tracking how effective the single-flight cache is.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for one cache
#[derive(Debug)]
pub struct CacheMetrics {
    /// Name of the cache
    pub name: &'static str,

    /// Lookups served by an existing future
    pub hit_count: AtomicU64,

    /// Lookups that created a new future
    pub miss_count: AtomicU64,

    /// Futures that settled with a value
    pub resolved_count: AtomicU64,

    /// Futures that settled with an error
    pub rejected_count: AtomicU64,

    /// Generation boundaries crossed
    pub generation_count: AtomicU64,
}

impl CacheMetrics {
    pub fn new(name: &'static str) -> Self {
        CacheMetrics {
            name,
            hit_count: AtomicU64::new(0),
            miss_count: AtomicU64::new(0),
            resolved_count: AtomicU64::new(0),
            rejected_count: AtomicU64::new(0),
            generation_count: AtomicU64::new(0),
        }
    }

    pub fn record_hit(&self) {
        self.hit_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.miss_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_resolved(&self) {
        self.resolved_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.rejected_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_generation(&self) {
        self.generation_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Get cache hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        self.snapshot().hit_rate()
    }

    pub fn reset(&self) {
        self.hit_count.store(0, Ordering::Relaxed);
        self.miss_count.store(0, Ordering::Relaxed);
        self.resolved_count.store(0, Ordering::Relaxed);
        self.rejected_count.store(0, Ordering::Relaxed);
        self.generation_count.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            name: self.name,
            hits: self.hit_count.load(Ordering::Relaxed),
            misses: self.miss_count.load(Ordering::Relaxed),
            resolved: self.resolved_count.load(Ordering::Relaxed),
            rejected: self.rejected_count.load(Ordering::Relaxed),
            generations: self.generation_count.load(Ordering::Relaxed),
        }
    }
}

impl Default for CacheMetrics {
    fn default() -> Self {
        Self::new("unknown")
    }
}

/// A point-in-time snapshot of cache metrics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub name: &'static str,
    pub hits: u64,
    pub misses: u64,
    pub resolved: u64,
    pub rejected: u64,
    pub generations: u64,
}

impl MetricsSnapshot {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

impl std::fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Cache: {}", self.name)?;
        writeln!(
            f,
            "  Hits: {} | Misses: {} | Hit Rate: {:.1}%",
            self.hits,
            self.misses,
            self.hit_rate() * 100.0
        )?;
        writeln!(
            f,
            "  Resolved: {} | Rejected: {} | Generations: {}",
            self.resolved, self.rejected, self.generations
        )?;
        Ok(())
    }
}
