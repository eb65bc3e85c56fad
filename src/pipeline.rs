// =============================================================================
// pipeline.rs — ONE EMAIL IN, ONE SCORED LOAD OUT
// =============================================================================
//
//   RawMessage
//       │
//       ├── dedup (message id) ──────────────────────── duplicate? stop.
//       │
//       ├── normalize ──┬── identify broker
//       │               └── extract load ── fit score
//       │
//       ├── no load? stop.
//       │
//       ├── store.insert_load(broker key, load record)
//       │
//       └── broker? aggregator.refresh(broker key)
//
// Everything above the store is pure and runs on the rayon pool for
// batches. Everything from the store down is async and goes through the
// aggregator's one-writer-per-broker discipline.
// =============================================================================

use chrono::Utc;
use rayon::prelude::*;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::aggregator::RelationshipAggregator;
use crate::broker_directory::BrokerDirectory;
use crate::broker_identifier::BrokerIdentifier;
use crate::config::Config;
use crate::dedup::MessageDedup;
use crate::error::AggregateError;
use crate::extractor::LoadExtractor;
use crate::fit_scorer;
use crate::metrics::PipelineMetrics;
use crate::models::{
    BrokerIdentification, BrokerStats, CompanyPreferences, ExtractedLoadSignal, LoadFitScore,
    LoadRecord, RawMessage,
};
use crate::normalizer;
use crate::store::SignalStore;

/// Everything the pure half of the pipeline learns about one message.
#[derive(Debug, Clone)]
pub struct MessageAnalysis {
    pub message_id: String,
    pub broker: BrokerIdentification,
    pub signal: Option<ExtractedLoadSignal>,
    pub fit: Option<LoadFitScore>,
}

impl MessageAnalysis {
    /// Stats are keyed by broker name; senders we could not name fall back
    /// to their display name, then their address.
    pub fn broker_key(&self, message: &RawMessage) -> String {
        self.broker
            .broker_name
            .clone()
            .filter(|_| self.broker.is_broker)
            .or_else(|| {
                message
                    .from_display_name
                    .as_deref()
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| message.from_address.trim().to_ascii_lowercase())
    }
}

#[derive(Debug)]
pub enum IngestOutcome {
    /// Message id already processed.
    Duplicate,
    /// Not a load offer, or nothing confident enough to keep.
    NoLoad,
    /// Load stored. `stats` is present when the sender is a broker.
    Persisted {
        broker_key: String,
        record: LoadRecord,
        stats: Option<BrokerStats>,
    },
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub received: usize,
    pub duplicates: usize,
    pub non_offers: usize,
    pub persisted: Vec<LoadRecord>,
    pub store_failures: Vec<(String, AggregateError)>,
    pub refreshed: Vec<BrokerStats>,
    pub refresh_failures: Vec<(String, AggregateError)>,
}

pub struct SignalPipeline {
    identifier: BrokerIdentifier,
    extractor: LoadExtractor,
    preferences: CompanyPreferences,
    aggregator: RelationshipAggregator,
    dedup: MessageDedup,
    metrics: Arc<PipelineMetrics>,
}

impl SignalPipeline {
    pub fn new(config: &Config, directory: Arc<BrokerDirectory>, store: Arc<dyn SignalStore>) -> Self {
        Self {
            identifier: BrokerIdentifier::new(directory),
            extractor: LoadExtractor::new(config.extractor),
            preferences: config.preferences.clone(),
            aggregator: RelationshipAggregator::new(
                store,
                config.preferences.min_rate_per_mile,
                config.store_timeout,
            ),
            dedup: MessageDedup::new(
                config.dedup_bloom_items,
                config.dedup_bloom_fp_rate,
                config.dedup_lru_size,
                config.dedup_rotation_interval,
            ),
            metrics: Arc::new(PipelineMetrics::new()),
        }
    }

    pub fn metrics(&self) -> &Arc<PipelineMetrics> {
        &self.metrics
    }

    pub fn dedup(&self) -> &MessageDedup {
        &self.dedup
    }

    pub fn aggregator(&self) -> &RelationshipAggregator {
        &self.aggregator
    }

    /// Normalize, identify, extract and score. Pure; safe on any thread.
    pub fn analyze(&self, message: &RawMessage) -> MessageAnalysis {
        let body = normalizer::message_text(
            "",
            message.body_text.as_deref(),
            message.body_html.as_deref(),
            message.snippet.as_deref(),
        );
        let subject = normalizer::collapse_whitespace(&message.subject);
        let text = match (subject.is_empty(), body.is_empty()) {
            (true, _) => body.clone(),
            (false, true) => subject.clone(),
            (false, false) => format!("{subject}\n{body}"),
        };

        let broker = self.identifier.identify(&message.from_address, &subject, &body);
        let signal = self
            .extractor
            .extract_at(&text, message.received_at.date_naive());
        let fit = signal
            .as_ref()
            .map(|signal| fit_scorer::score(signal, &self.preferences));

        if broker.is_broker {
            self.metrics.increment_brokers();
        }
        match &signal {
            Some(signal) => {
                self.metrics.increment_extracted();
                debug!(
                    message_id = %message.id,
                    lane = signal.lane().as_deref().unwrap_or("-"),
                    confidence = signal.confidence,
                    fit = fit.as_ref().map(|f| f.score),
                    "Load extracted"
                );
            }
            None => self.metrics.increment_non_offers(),
        }

        MessageAnalysis {
            message_id: message.id.clone(),
            broker,
            signal,
            fit,
        }
    }

    /// `analyze` across the rayon pool. Output order matches input order.
    pub fn analyze_batch(&self, messages: &[RawMessage]) -> Vec<MessageAnalysis> {
        messages.par_iter().map(|message| self.analyze(message)).collect()
    }

    /// Store the load for an analyzed message. Returns the broker key, the
    /// record and whether the sender is a broker, or None when there is no
    /// load to store.
    async fn persist(
        &self,
        message: &RawMessage,
        analysis: MessageAnalysis,
        cancel: &watch::Receiver<bool>,
    ) -> Result<Option<(String, LoadRecord, bool)>, AggregateError> {
        let broker_key = analysis.broker_key(message);
        let MessageAnalysis {
            broker,
            signal,
            fit,
            ..
        } = analysis;
        let (Some(signal), Some(fit)) = (signal, fit) else {
            return Ok(None);
        };

        let broker_name = broker.broker_name.filter(|_| broker.is_broker);
        let record = LoadRecord::new(message, broker_name, signal, &fit);

        if *cancel.borrow() {
            self.dedup.forget(&message.id);
            return Err(AggregateError::Cancelled);
        }

        let timeout = self.aggregator.timeout();
        let inserted = tokio::time::timeout(
            timeout,
            self.aggregator.store().insert_load(&broker_key, &record),
        )
        .await
        .map_err(|_| AggregateError::TimedOut(timeout))
        .and_then(|result| result.map_err(AggregateError::from));

        if let Err(err) = inserted {
            self.metrics.increment_store_failures();
            self.dedup.forget(&message.id);
            warn!(
                message_id = %message.id,
                broker = %broker_key,
                error = %err,
                retryable = err.is_retryable(),
                "Failed to store load"
            );
            return Err(err);
        }

        self.metrics.increment_persisted();
        Ok(Some((broker_key, record, broker.is_broker)))
    }

    /// Full path for one message: dedup, analyze, store, refresh the broker.
    pub async fn ingest(
        &self,
        message: &RawMessage,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<IngestOutcome, AggregateError> {
        self.metrics.increment_received();
        if !self.dedup.first_sighting(&message.id) {
            self.metrics.increment_duplicates();
            return Ok(IngestOutcome::Duplicate);
        }

        let analysis = self.analyze(message);
        let Some((broker_key, record, is_broker)) = self.persist(message, analysis, cancel).await?
        else {
            return Ok(IngestOutcome::NoLoad);
        };

        let stats = if is_broker {
            let refreshed = self.aggregator.refresh(&broker_key, Utc::now(), cancel).await;
            self.metrics.record_refresh(refreshed.is_ok());
            Some(refreshed?)
        } else {
            None
        };

        Ok(IngestOutcome::Persisted {
            broker_key,
            record,
            stats,
        })
    }

    /// Backfill path. Analysis runs in parallel; loads are stored in input
    /// order; each touched broker is refreshed once, brokers in parallel.
    pub async fn ingest_batch(
        &self,
        messages: &[RawMessage],
        cancel: &watch::Receiver<bool>,
    ) -> BatchReport {
        let mut report = BatchReport {
            received: messages.len(),
            ..Default::default()
        };

        let fresh: Vec<RawMessage> = messages
            .iter()
            .filter(|message| {
                self.metrics.increment_received();
                let first = self.dedup.first_sighting(&message.id);
                if !first {
                    self.metrics.increment_duplicates();
                }
                first
            })
            .cloned()
            .collect();
        report.duplicates = messages.len() - fresh.len();

        let analyses = self.analyze_batch(&fresh);

        let mut touched_brokers = BTreeSet::new();
        for (message, analysis) in fresh.iter().zip(analyses) {
            match self.persist(message, analysis, cancel).await {
                Ok(Some((broker_key, record, is_broker))) => {
                    if is_broker {
                        touched_brokers.insert(broker_key);
                    }
                    report.persisted.push(record);
                }
                Ok(None) => report.non_offers += 1,
                Err(err) => report.store_failures.push((message.id.clone(), err)),
            }
        }

        let keys: Vec<String> = touched_brokers.into_iter().collect();
        for (key, result) in self.aggregator.refresh_many(&keys, Utc::now(), cancel).await {
            self.metrics.record_refresh(result.is_ok());
            match result {
                Ok(stats) => report.refreshed.push(stats),
                Err(err) => report.refresh_failures.push((key, err)),
            }
        }

        info!(
            received = report.received,
            duplicates = report.duplicates,
            non_offers = report.non_offers,
            persisted = report.persisted.len(),
            store_failures = report.store_failures.len(),
            brokers_refreshed = report.refreshed.len(),
            refresh_failures = report.refresh_failures.len(),
            "Batch ingested"
        );
        report
    }
}
