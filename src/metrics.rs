// Engine metrics
//
// Lock-free counters for the assignment engine, logged on demand.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Counters shared by one project session.
#[derive(Debug)]
pub struct EngineMetrics {
    /// Pools minted from site inventories
    pub pools_built: AtomicU64,

    /// Reconciliations run against a fresh pool
    pub reconciles: AtomicU64,

    /// Inventory loads restored from the cache
    pub cache_hits: AtomicU64,

    /// Inventory loads that found no cache entry
    pub cache_misses: AtomicU64,

    pub partial_reservations: AtomicU64,
    pub unresolved_slots: AtomicU64,

    /// Successful persistence writes, fallback writes included
    pub persistence_writes: AtomicU64,

    /// Writes that landed in the backup area
    pub persistence_fallbacks: AtomicU64,

    /// Writes where both attempts failed
    pub persistence_failures: AtomicU64,

    /// Total time spent reconciling, in microseconds
    pub reconcile_time_us: AtomicU64,

    start_time: Instant,
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self {
            pools_built: AtomicU64::new(0),
            reconciles: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            partial_reservations: AtomicU64::new(0),
            unresolved_slots: AtomicU64::new(0),
            persistence_writes: AtomicU64::new(0),
            persistence_fallbacks: AtomicU64::new(0),
            persistence_failures: AtomicU64::new(0),
            reconcile_time_us: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_pool_built(&self) {
        self.pools_built.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reconcile(&self, duration: Duration, partial: usize, unresolved: usize) {
        self.reconciles.fetch_add(1, Ordering::Relaxed);
        self.reconcile_time_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
        self.partial_reservations
            .fetch_add(partial as u64, Ordering::Relaxed);
        self.unresolved_slots
            .fetch_add(unresolved as u64, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_persistence_write(&self, fallback: bool) {
        self.persistence_writes.fetch_add(1, Ordering::Relaxed);
        if fallback {
            self.persistence_fallbacks.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_persistence_failure(&self) {
        self.persistence_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Average reconcile time in microseconds
    pub fn avg_reconcile_time_us(&self) -> f64 {
        let total = self.reconcile_time_us.load(Ordering::Relaxed);
        let count = self.reconciles.load(Ordering::Relaxed);
        if count > 0 {
            total as f64 / count as f64
        } else {
            0.0
        }
    }

    /// Share of inventory loads served from the cache, 0.0 when none ran
    pub fn cache_hit_ratio(&self) -> f64 {
        let hits = self.cache_hits.load(Ordering::Relaxed);
        let total = hits + self.cache_misses.load(Ordering::Relaxed);
        if total > 0 {
            hits as f64 / total as f64
        } else {
            0.0
        }
    }

    pub fn log_summary(&self) {
        tracing::info!("=== Engine Metrics Summary ===");
        tracing::info!("Uptime: {:.2}s", self.uptime().as_secs_f64());
        tracing::info!(
            "Pools built: {}, reconciles: {} (avg {:.1}us)",
            self.pools_built.load(Ordering::Relaxed),
            self.reconciles.load(Ordering::Relaxed),
            self.avg_reconcile_time_us()
        );
        tracing::info!(
            "Cache: {} hits, {} misses ({:.0}% hit ratio)",
            self.cache_hits.load(Ordering::Relaxed),
            self.cache_misses.load(Ordering::Relaxed),
            self.cache_hit_ratio() * 100.0
        );
        tracing::info!(
            "Reconcile warnings: {} partial reservations, {} unresolved slots",
            self.partial_reservations.load(Ordering::Relaxed),
            self.unresolved_slots.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Persistence: {} writes ({} fallback), {} failures",
            self.persistence_writes.load(Ordering::Relaxed),
            self.persistence_fallbacks.load(Ordering::Relaxed),
            self.persistence_failures.load(Ordering::Relaxed)
        );
    }
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}
