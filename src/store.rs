// =============================================================================
// store.rs — WHERE LOADS AND BROKER STATS END UP
// =============================================================================
//
// The engine does not own a database. It talks to whatever persistence the
// host application has through `SignalStore`, and ships an in-memory
// implementation for the backfill binary and for tests.
//
// Contract for implementors:
//   - `insert_load` appends one load under a broker key.
//   - `load_history` returns every load ever stored for that key.
//   - `replace_stats` swaps the broker's aggregate wholesale. Either the new
//     value is stored or the old one is untouched; never half of each.
// =============================================================================

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};

use crate::error::StoreError;
use crate::models::{BrokerStats, LoadHistoryEntry, LoadRecord};

#[async_trait]
pub trait SignalStore: Send + Sync {
    async fn insert_load(&self, broker_key: &str, load: &LoadRecord) -> Result<(), StoreError>;

    async fn load_history(&self, broker_key: &str) -> Result<Vec<LoadHistoryEntry>, StoreError>;

    async fn replace_stats(&self, stats: BrokerStats) -> Result<(), StoreError>;

    async fn get_stats(&self, broker_key: &str) -> Result<Option<BrokerStats>, StoreError>;
}

#[derive(Default)]
struct Tables {
    loads: HashMap<String, Vec<LoadRecord>>,
    message_ids: HashSet<String>,
    stats: HashMap<String, BrokerStats>,
}

/// Process-local store. Every call takes the lock once, so each operation is
/// atomic on its own.
#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load_count(&self) -> usize {
        self.tables.read().message_ids.len()
    }

    pub fn broker_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.tables.read().loads.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// All stored aggregates, highest relationship score first.
    pub fn all_stats(&self) -> Vec<BrokerStats> {
        let mut stats: Vec<BrokerStats> = self.tables.read().stats.values().cloned().collect();
        stats.sort_by(|a, b| {
            b.relationship_score
                .total_cmp(&a.relationship_score)
                .then_with(|| a.broker_key.cmp(&b.broker_key))
        });
        stats
    }
}

#[async_trait]
impl SignalStore for InMemoryStore {
    async fn insert_load(&self, broker_key: &str, load: &LoadRecord) -> Result<(), StoreError> {
        let mut tables = self.tables.write();
        if !tables.message_ids.insert(load.message_id.clone()) {
            return Err(StoreError::Rejected {
                key: broker_key.to_string(),
                reason: format!("message {} already stored", load.message_id),
            });
        }
        tables
            .loads
            .entry(broker_key.to_string())
            .or_default()
            .push(load.clone());
        Ok(())
    }

    async fn load_history(&self, broker_key: &str) -> Result<Vec<LoadHistoryEntry>, StoreError> {
        Ok(self
            .tables
            .read()
            .loads
            .get(broker_key)
            .map(|loads| loads.iter().map(LoadRecord::history_entry).collect())
            .unwrap_or_default())
    }

    async fn replace_stats(&self, stats: BrokerStats) -> Result<(), StoreError> {
        self.tables.write().stats.insert(stats.broker_key.clone(), stats);
        Ok(())
    }

    async fn get_stats(&self, broker_key: &str) -> Result<Option<BrokerStats>, StoreError> {
        Ok(self.tables.read().stats.get(broker_key).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ExtractedLoadSignal, LoadFitScore, RawMessage};
    use chrono::Utc;

    fn record(id: &str) -> LoadRecord {
        let message = RawMessage {
            id: id.to_string(),
            from_address: "ops@tql.com".into(),
            from_display_name: None,
            subject: "Load".into(),
            body_text: None,
            body_html: None,
            snippet: None,
            received_at: Utc::now(),
        };
        let signal = ExtractedLoadSignal {
            origin_state: Some("TX".into()),
            dest_state: Some("GA".into()),
            ..Default::default()
        };
        let fit = LoadFitScore { score: 50.0, reasons: vec![] };
        LoadRecord::new(&message, Some("TQL".into()), signal, &fit)
    }

    #[tokio::test]
    async fn test_history_is_per_broker() {
        let store = InMemoryStore::new();
        store.insert_load("TQL", &record("m1")).await.unwrap();
        store.insert_load("TQL", &record("m2")).await.unwrap();
        store.insert_load("RXO", &record("m3")).await.unwrap();

        assert_eq!(store.load_history("TQL").await.unwrap().len(), 2);
        assert_eq!(store.load_history("Convoy").await.unwrap().len(), 0);
        assert_eq!(store.load_count(), 3);
        assert_eq!(store.broker_keys(), vec!["RXO".to_string(), "TQL".to_string()]);
    }

    #[tokio::test]
    async fn test_duplicate_message_is_rejected() {
        let store = InMemoryStore::new();
        store.insert_load("TQL", &record("m1")).await.unwrap();
        let err = store.insert_load("TQL", &record("m1")).await.unwrap_err();
        assert!(matches!(err, StoreError::Rejected { .. }));
        assert!(!err.is_retryable());
        assert_eq!(store.load_count(), 1);
    }
}
