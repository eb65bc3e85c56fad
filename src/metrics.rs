// ═══════════════════════════════════════════════════════════════
// METRICS - how many emails went in, how many loads came out
// ═══════════════════════════════════════════════════════════════
//
// Plain atomic counters, bumped by the pipeline and read as a JSON-able
// snapshot by whoever hosts the engine. The backfill binary logs the
// snapshot when it finishes.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct MetricsSnapshot {
    pub messages_received: u64,
    pub duplicates_skipped: u64,
    pub brokers_identified: u64,
    pub loads_extracted: u64,
    pub non_offers: u64,
    pub loads_persisted: u64,
    pub store_failures: u64,
    pub stats_refreshed: u64,
    pub stats_refresh_failures: u64,
    pub uptime_seconds: u64,
    pub messages_per_minute: f64,
}

pub struct PipelineMetrics {
    messages_received: AtomicU64,
    duplicates_skipped: AtomicU64,
    brokers_identified: AtomicU64,
    loads_extracted: AtomicU64,
    non_offers: AtomicU64,
    loads_persisted: AtomicU64,
    store_failures: AtomicU64,
    stats_refreshed: AtomicU64,
    stats_refresh_failures: AtomicU64,
    start_time: Instant,
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            messages_received: AtomicU64::new(0),
            duplicates_skipped: AtomicU64::new(0),
            brokers_identified: AtomicU64::new(0),
            loads_extracted: AtomicU64::new(0),
            non_offers: AtomicU64::new(0),
            loads_persisted: AtomicU64::new(0),
            store_failures: AtomicU64::new(0),
            stats_refreshed: AtomicU64::new(0),
            stats_refresh_failures: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn increment_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_duplicates(&self) {
        self.duplicates_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_brokers(&self) {
        self.brokers_identified.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_extracted(&self) {
        self.loads_extracted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_non_offers(&self) {
        self.non_offers.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_persisted(&self) {
        self.loads_persisted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_store_failures(&self) {
        self.store_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_refresh(&self, ok: bool) {
        if ok {
            self.stats_refreshed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.stats_refresh_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let uptime = self.start_time.elapsed();
        let received = self.messages_received.load(Ordering::Relaxed);
        let minutes = uptime.as_secs_f64() / 60.0;
        let messages_per_minute = if minutes > 0.0 {
            received as f64 / minutes
        } else {
            0.0
        };

        MetricsSnapshot {
            messages_received: received,
            duplicates_skipped: self.duplicates_skipped.load(Ordering::Relaxed),
            brokers_identified: self.brokers_identified.load(Ordering::Relaxed),
            loads_extracted: self.loads_extracted.load(Ordering::Relaxed),
            non_offers: self.non_offers.load(Ordering::Relaxed),
            loads_persisted: self.loads_persisted.load(Ordering::Relaxed),
            store_failures: self.store_failures.load(Ordering::Relaxed),
            stats_refreshed: self.stats_refreshed.load(Ordering::Relaxed),
            stats_refresh_failures: self.stats_refresh_failures.load(Ordering::Relaxed),
            uptime_seconds: uptime.as_secs(),
            messages_per_minute,
        }
    }
}
