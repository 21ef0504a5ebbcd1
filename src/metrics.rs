// src/metrics.rs - In-process adjudication counters

use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Instant;

/// Counter snapshot for operator introspection.
#[derive(Clone, Debug, Default)]
pub struct AdjudicationStats {
    pub uptime_secs: u64,
    pub requests_total: u64,
    pub granted_total: u64,
    pub denied_total: u64,
    pub ledger_hits: u64,
    pub oracle_errors: u64,
}

/// Shared counter registry. Cheap to clone; all clones observe the same
/// counters.
#[derive(Clone)]
pub struct AdjudicationMetrics {
    stats: Arc<RwLock<AdjudicationStats>>,
    start_time: Instant,
}

impl AdjudicationMetrics {
    pub fn new() -> Self {
        Self {
            stats: Arc::new(RwLock::new(AdjudicationStats::default())),
            start_time: Instant::now(),
        }
    }

    pub fn record_request(&self) {
        self.stats.write().requests_total += 1;
    }

    pub fn record_grant(&self) {
        self.stats.write().granted_total += 1;
    }

    pub fn record_denial(&self) {
        self.stats.write().denied_total += 1;
    }

    pub fn record_ledger_hit(&self) {
        self.stats.write().ledger_hits += 1;
    }

    pub fn record_oracle_error(&self) {
        self.stats.write().oracle_errors += 1;
    }

    pub fn snapshot(&self) -> AdjudicationStats {
        let mut stats = self.stats.read().clone();
        stats.uptime_secs = self.start_time.elapsed().as_secs();
        stats
    }
}

impl Default for AdjudicationMetrics {
    fn default() -> Self {
        Self::new()
    }
}
