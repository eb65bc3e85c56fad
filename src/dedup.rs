// =============================================================================
// dedup.rs — HAVE WE ALREADY READ THIS EMAIL?
// =============================================================================
//
// Mail sync is at-least-once. A mailbox re-sync, a label change, a provider
// hiccup, and the same load email shows up again. Counting it twice would
// inflate the broker's load count and bend their relationship score.
//
// Two layers, keyed by provider message id:
//
// 1. A Bloom filter answers "definitely new" in constant time. Bloom filters
//    never give false negatives.
// 2. When the Bloom filter says "maybe seen", the LRU cache gives the
//    definitive answer. A Bloom hit with no LRU entry is a false positive
//    and the message goes through.
//
// The Bloom filter is swapped for a fresh one every rotation interval so it
// never saturates. The fresh filter is seeded with every id still in the LRU,
// so a rotation never re-admits a message the LRU remembers. The LRU evicts
// on its own.
// =============================================================================

use bloomfilter::Bloom;
use lru::LruCache;
use parking_lot::RwLock;
use portable_atomic::{AtomicU64, Ordering};
use serde::Serialize;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};
use tracing::{debug, info};

pub struct MessageDedup {
    bloom: RwLock<Bloom<String>>,
    recent: RwLock<LruCache<String, ()>>,
    last_rotation: RwLock<Instant>,
    rotation_interval: Duration,
    bloom_expected_items: usize,
    bloom_fp_rate: f64,
    stats: DedupStats,
}

#[derive(Default)]
struct DedupStats {
    checks: AtomicU64,
    unique: AtomicU64,
    duplicates: AtomicU64,
    rotations: AtomicU64,
    bloom_maybe_hits: AtomicU64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DedupSnapshot {
    pub total_checks: u64,
    pub unique_messages: u64,
    pub duplicates_caught: u64,
    pub bloom_rotations: u64,
    pub bloom_false_positive_rescues: u64,
    pub lru_size: usize,
}

impl MessageDedup {
    pub fn new(
        expected_items: usize,
        fp_rate: f64,
        lru_capacity: usize,
        rotation_interval: Duration,
    ) -> Self {
        info!(
            expected_items,
            fp_rate,
            lru_capacity,
            rotation_secs = rotation_interval.as_secs(),
            "Message dedup initialized"
        );

        let capacity = NonZeroUsize::new(lru_capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            bloom: RwLock::new(Bloom::new_for_fp_rate(expected_items.max(1), fp_rate)),
            recent: RwLock::new(LruCache::new(capacity)),
            last_rotation: RwLock::new(Instant::now()),
            rotation_interval,
            bloom_expected_items: expected_items.max(1),
            bloom_fp_rate: fp_rate,
            stats: DedupStats::default(),
        }
    }

    /// True the first time a message id is offered, false on every repeat
    /// still remembered by the LRU.
    pub fn first_sighting(&self, message_id: &str) -> bool {
        self.stats.checks.fetch_add(1, Ordering::Relaxed);
        self.maybe_rotate();

        let key = message_id.to_string();
        let maybe_seen = self.bloom.read().check(&key);

        if maybe_seen {
            self.stats.bloom_maybe_hits.fetch_add(1, Ordering::Relaxed);
            if self.recent.write().get(&key).is_some() {
                self.stats.duplicates.fetch_add(1, Ordering::Relaxed);
                debug!(message_id, "Duplicate message skipped");
                return false;
            }
            debug!(message_id, "Bloom false positive, message is new");
        }

        self.bloom.write().set(&key);
        self.recent.write().put(key, ());
        self.stats.unique.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Drop a message id from the LRU so it is admitted again. Used when the
    /// message could not be persisted and the caller will retry it. The Bloom
    /// bit stays set; the LRU miss is what lets the retry through.
    pub fn forget(&self, message_id: &str) {
        self.recent.write().pop(message_id);
    }

    fn maybe_rotate(&self) {
        if self.last_rotation.read().elapsed() < self.rotation_interval {
            return;
        }

        let mut bloom = self.bloom.write();
        let mut last = self.last_rotation.write();
        // Another thread may have rotated while we waited for the locks.
        if last.elapsed() >= self.rotation_interval {
            let mut fresh = Bloom::new_for_fp_rate(self.bloom_expected_items, self.bloom_fp_rate);
            let recent = self.recent.read();
            for (id, _) in recent.iter() {
                fresh.set(id);
            }
            *bloom = fresh;
            *last = Instant::now();
            self.stats.rotations.fetch_add(1, Ordering::Relaxed);
            info!(carried_over = recent.len(), "Dedup bloom filter rotated");
        }
    }

    pub fn snapshot(&self) -> DedupSnapshot {
        DedupSnapshot {
            total_checks: self.stats.checks.load(Ordering::Relaxed),
            unique_messages: self.stats.unique.load(Ordering::Relaxed),
            duplicates_caught: self.stats.duplicates.load(Ordering::Relaxed),
            bloom_rotations: self.stats.rotations.load(Ordering::Relaxed),
            bloom_false_positive_rescues: self.stats.bloom_maybe_hits.load(Ordering::Relaxed),
            lru_size: self.recent.read().len(),
        }
    }
}

impl Default for MessageDedup {
    fn default() -> Self {
        Self::new(100_000, 0.01, 10_000, Duration::from_secs(3_600))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_messages_are_accepted() {
        let dedup = MessageDedup::default();
        assert!(dedup.first_sighting("msg-18c2f"));
        assert!(dedup.first_sighting("msg-18c30"));
    }

    #[test]
    fn test_repeat_message_is_rejected() {
        let dedup = MessageDedup::default();
        assert!(dedup.first_sighting("msg-18c2f"));
        assert!(!dedup.first_sighting("msg-18c2f"));

        let snap = dedup.snapshot();
        assert_eq!(snap.total_checks, 2);
        assert_eq!(snap.unique_messages, 1);
        assert_eq!(snap.duplicates_caught, 1);
    }

    #[test]
    fn test_forgotten_message_is_admitted_again() {
        let dedup = MessageDedup::default();
        assert!(dedup.first_sighting("msg-7"));
        dedup.forget("msg-7");
        assert!(dedup.first_sighting("msg-7"));
        assert!(!dedup.first_sighting("msg-7"));
        assert_eq!(dedup.snapshot().bloom_false_positive_rescues, 2);
    }

    #[test]
    fn test_rotation_keeps_recent_ids() {
        let dedup = MessageDedup::new(1_000, 0.01, 100, Duration::ZERO);
        assert!(dedup.first_sighting("msg-1"));
        assert!(!dedup.first_sighting("msg-1"));

        let snap = dedup.snapshot();
        assert!(snap.bloom_rotations >= 2);
        assert_eq!(snap.duplicates_caught, 1);
        assert_eq!(snap.lru_size, 1);
    }

    #[test]
    fn test_rotation_forgets_ids_evicted_from_lru() {
        let dedup = MessageDedup::new(1_000, 0.01, 1, Duration::ZERO);
        assert!(dedup.first_sighting("msg-1"));
        assert!(dedup.first_sighting("msg-2"));
        // msg-1 fell out of the single-slot LRU before the last rotation.
        assert!(dedup.first_sighting("msg-1"));
    }
}
