// =============================================================================
// aggregator.rs — ONE WRITER PER BROKER
// =============================================================================
//
// Refreshing a broker's stats is read-history, recompute, replace. Two of
// those racing on the same broker lose an update: both read N loads, both
// write stats for N, and load N+1 vanishes from the aggregate. During a
// backfill that happens constantly, because brokers send in bursts.
//
// So every broker key gets its own async mutex. Refreshes for the same key
// queue behind each other; refreshes for different keys run side by side.
//
// The store is somebody else's database. Every refresh is bounded by a
// timeout and a cancellation watch, and failures come back as errors the
// caller can classify. We never retry here.
// =============================================================================

use chrono::{DateTime, Utc};
use futures::future::join_all;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex as AsyncMutex};
use tracing::{debug, info, warn};

use crate::error::AggregateError;
use crate::models::BrokerStats;
use crate::relationship;
use crate::store::SignalStore;

pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_millis(5_000);

pub struct RelationshipAggregator {
    store: Arc<dyn SignalStore>,
    /// broker key -> that broker's writer lock. Entries are never removed;
    /// the table is as large as the set of brokers we have ever heard from.
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
    min_rate_per_mile: f64,
    timeout: Duration,
}

/// Resolves once the watch flips to `true`. A dropped sender never cancels.
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow_and_update() {
            return;
        }
        if cancel.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

impl RelationshipAggregator {
    pub fn new(store: Arc<dyn SignalStore>, min_rate_per_mile: f64, timeout: Duration) -> Self {
        Self {
            store,
            locks: Mutex::new(HashMap::new()),
            min_rate_per_mile,
            timeout,
        }
    }

    pub fn store(&self) -> &Arc<dyn SignalStore> {
        &self.store
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn key_lock(&self, broker_key: &str) -> Arc<AsyncMutex<()>> {
        self.locks
            .lock()
            .entry(broker_key.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    async fn refresh_locked(
        &self,
        broker_key: &str,
        as_of: DateTime<Utc>,
    ) -> Result<BrokerStats, AggregateError> {
        let lock = self.key_lock(broker_key);
        let _writer = lock.lock().await;

        let history = self.store.load_history(broker_key).await?;
        let stats = relationship::recompute(broker_key, &history, as_of, self.min_rate_per_mile)
            .ok_or_else(|| AggregateError::EmptyHistory(broker_key.to_string()))?;
        self.store.replace_stats(stats.clone()).await?;

        Ok(stats)
    }

    /// Rebuild and store one broker's stats from its full history.
    pub async fn refresh(
        &self,
        broker_key: &str,
        as_of: DateTime<Utc>,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<BrokerStats, AggregateError> {
        let outcome = tokio::select! {
            biased;
            _ = cancelled(cancel) => Err(AggregateError::Cancelled),
            result = tokio::time::timeout(self.timeout, self.refresh_locked(broker_key, as_of)) => {
                result.unwrap_or(Err(AggregateError::TimedOut(self.timeout)))
            }
        };

        match &outcome {
            Ok(stats) => debug!(
                broker = broker_key,
                total_loads = stats.total_loads,
                score = stats.relationship_score,
                "Broker stats refreshed"
            ),
            Err(err) => warn!(
                broker = broker_key,
                error = %err,
                retryable = err.is_retryable(),
                "Broker stats refresh failed"
            ),
        }

        outcome
    }

    /// Refresh several brokers concurrently. Duplicate keys are refreshed once.
    pub async fn refresh_many(
        &self,
        broker_keys: &[String],
        as_of: DateTime<Utc>,
        cancel: &watch::Receiver<bool>,
    ) -> Vec<(String, Result<BrokerStats, AggregateError>)> {
        let mut keys: Vec<&String> = broker_keys.iter().collect();
        keys.sort();
        keys.dedup();

        let results = join_all(keys.iter().map(|key| {
            let mut cancel = cancel.clone();
            async move { ((*key).clone(), self.refresh(key, as_of, &mut cancel).await) }
        }))
        .await;

        let failed = results.iter().filter(|(_, r)| r.is_err()).count();
        info!(
            brokers = results.len(),
            failed = failed,
            "Broker stats refresh round complete"
        );
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::models::{ExtractedLoadSignal, LoadFitScore, LoadHistoryEntry, LoadRecord, RawMessage};
    use crate::store::InMemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Wraps the in-memory store with a delay, an in-flight gauge and an
    /// outage switch.
    #[derive(Default)]
    struct ProbeStore {
        inner: InMemoryStore,
        delay: Duration,
        down: AtomicBool,
        in_flight: AtomicUsize,
        peak_in_flight: AtomicUsize,
    }

    impl ProbeStore {
        fn with_delay(delay: Duration) -> Self {
            Self {
                delay,
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl SignalStore for ProbeStore {
        async fn insert_load(&self, broker_key: &str, load: &LoadRecord) -> Result<(), StoreError> {
            self.inner.insert_load(broker_key, load).await
        }

        async fn load_history(&self, broker_key: &str) -> Result<Vec<LoadHistoryEntry>, StoreError> {
            if self.down.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable("connection refused".into()));
            }
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            let history = self.inner.load_history(broker_key).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            history
        }

        async fn replace_stats(&self, stats: BrokerStats) -> Result<(), StoreError> {
            self.inner.replace_stats(stats).await
        }

        async fn get_stats(&self, broker_key: &str) -> Result<Option<BrokerStats>, StoreError> {
            self.inner.get_stats(broker_key).await
        }
    }

    fn record(id: &str) -> LoadRecord {
        let message = RawMessage {
            id: id.to_string(),
            from_address: "ops@tql.com".into(),
            from_display_name: None,
            subject: String::new(),
            body_text: None,
            body_html: None,
            snippet: None,
            received_at: Utc::now(),
        };
        let signal = ExtractedLoadSignal {
            origin_state: Some("TX".into()),
            dest_state: Some("GA".into()),
            rate_per_mile: Some(2.5),
            ..Default::default()
        };
        let fit = LoadFitScore { score: 70.0, reasons: vec![] };
        LoadRecord::new(&message, Some("TQL".into()), signal, &fit)
    }

    fn no_cancel() -> (watch::Sender<bool>, watch::Receiver<bool>) {
        watch::channel(false)
    }

    #[tokio::test]
    async fn test_refresh_replaces_stats() {
        let store = Arc::new(InMemoryStore::new());
        store.insert_load("TQL", &record("m1")).await.unwrap();
        store.insert_load("TQL", &record("m2")).await.unwrap();
        let aggregator = RelationshipAggregator::new(store.clone(), 2.0, DEFAULT_STORE_TIMEOUT);
        let (_tx, mut rx) = no_cancel();

        let stats = aggregator.refresh("TQL", Utc::now(), &mut rx).await.unwrap();
        assert_eq!(stats.total_loads, 2);
        assert_eq!(store.get_stats("TQL").await.unwrap(), Some(stats));
    }

    #[tokio::test]
    async fn test_empty_history_is_not_retryable() {
        let aggregator =
            RelationshipAggregator::new(Arc::new(InMemoryStore::new()), 2.0, DEFAULT_STORE_TIMEOUT);
        let (_tx, mut rx) = no_cancel();
        let err = aggregator.refresh("Nobody", Utc::now(), &mut rx).await.unwrap_err();
        assert!(matches!(err, AggregateError::EmptyHistory(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_store_outage_is_retryable_and_writes_nothing() {
        let store = Arc::new(ProbeStore::default());
        store.insert_load("TQL", &record("m1")).await.unwrap();
        store.down.store(true, Ordering::SeqCst);
        let aggregator = RelationshipAggregator::new(store.clone(), 2.0, DEFAULT_STORE_TIMEOUT);
        let (_tx, mut rx) = no_cancel();

        let err = aggregator.refresh("TQL", Utc::now(), &mut rx).await.unwrap_err();
        assert!(matches!(err, AggregateError::Store(StoreError::Unavailable(_))));
        assert!(err.is_retryable());
        assert_eq!(store.get_stats("TQL").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_slow_store_times_out() {
        let store = Arc::new(ProbeStore::with_delay(Duration::from_millis(500)));
        store.insert_load("TQL", &record("m1")).await.unwrap();
        let aggregator = RelationshipAggregator::new(store, 2.0, Duration::from_millis(20));
        let (_tx, mut rx) = no_cancel();

        let err = aggregator.refresh("TQL", Utc::now(), &mut rx).await.unwrap_err();
        assert!(matches!(err, AggregateError::TimedOut(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_cancelled_refresh_stops() {
        let store = Arc::new(ProbeStore::with_delay(Duration::from_millis(500)));
        store.insert_load("TQL", &record("m1")).await.unwrap();
        let aggregator = RelationshipAggregator::new(store, 2.0, DEFAULT_STORE_TIMEOUT);
        let (tx, mut rx) = watch::channel(false);
        tx.send(true).unwrap();

        let err = aggregator.refresh("TQL", Utc::now(), &mut rx).await.unwrap_err();
        assert!(matches!(err, AggregateError::Cancelled));
    }

    #[tokio::test]
    async fn test_same_broker_is_serialized_different_brokers_overlap() {
        let store = Arc::new(ProbeStore::with_delay(Duration::from_millis(30)));
        store.insert_load("TQL", &record("m1")).await.unwrap();
        store.insert_load("RXO", &record("m2")).await.unwrap();
        let aggregator = RelationshipAggregator::new(store.clone(), 2.0, DEFAULT_STORE_TIMEOUT);
        let (_tx, rx) = no_cancel();

        let same = vec!["TQL", "TQL", "TQL"];
        join_all(same.into_iter().map(|key| {
            let mut rx = rx.clone();
            let aggregator = &aggregator;
            async move { aggregator.refresh(key, Utc::now(), &mut rx).await }
        }))
        .await;
        assert_eq!(store.peak_in_flight.load(Ordering::SeqCst), 1);

        let keys = vec!["TQL".to_string(), "RXO".to_string()];
        let results = aggregator.refresh_many(&keys, Utc::now(), &rx).await;
        assert!(results.iter().all(|(_, r)| r.is_ok()));
        assert_eq!(store.peak_in_flight.load(Ordering::SeqCst), 2);
    }
}
