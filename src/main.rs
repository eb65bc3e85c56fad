// ██████╗ ██████╗  ██████╗ ██╗  ██╗███████╗██████╗
// ██╔══██╗██╔══██╗██╔═══██╗██║ ██╔╝██╔════╝██╔══██╗
// ██████╔╝██████╔╝██║   ██║█████╔╝ █████╗  ██████╔╝
// ██╔══██╗██╔══██╗██║   ██║██╔═██╗ ██╔══╝  ██╔══██╗
// ██████╔╝██║  ██║╚██████╔╝██║  ██╗███████╗██║  ██║
// ╚═════╝ ╚═╝  ╚═╝ ╚═════╝ ╚═╝  ╚═╝╚══════╝╚═╝  ╚═╝
//
// S I G N A L   B A C K F I L L
//
// Reads a mailbox export (one JSON message per line), runs every message
// through the signal pipeline, and prints the resulting broker stats.
//
//   broker_signal_backfill messages.jsonl
//   cat messages.jsonl | broker_signal_backfill -

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use broker_signal_engine::broker_directory::BrokerDirectory;
use broker_signal_engine::config::Config;
use broker_signal_engine::models::RawMessage;
use broker_signal_engine::pipeline::SignalPipeline;
use broker_signal_engine::store::InMemoryStore;

/// Messages handed to the ingest loop per batch.
const BATCH_SIZE: usize = 250;
/// Reader can run this many batches ahead of ingest.
const CHANNEL_CAPACITY: usize = 8;

fn open_input(path: &str) -> Result<Box<dyn BufRead + Send>> {
    if path == "-" {
        return Ok(Box::new(BufReader::new(io::stdin())));
    }
    let file = File::open(path).with_context(|| format!("opening message export {path}"))?;
    Ok(Box::new(BufReader::new(file)))
}

/// Parse JSONL on a plain thread and ship batches over the channel. A bad
/// line is logged and skipped.
fn spawn_reader(
    input: Box<dyn BufRead + Send>,
    tx: crossbeam_channel::Sender<Vec<RawMessage>>,
) -> thread::JoinHandle<usize> {
    thread::spawn(move || {
        let mut skipped = 0;
        let mut batch = Vec::with_capacity(BATCH_SIZE);

        for (line_no, line) in input.lines().enumerate() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    error!(line = line_no + 1, error = %e, "Read failed, stopping reader");
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<RawMessage>(&line) {
                Ok(message) => batch.push(message),
                Err(e) => {
                    skipped += 1;
                    warn!(line = line_no + 1, error = %e, "Skipping malformed message");
                }
            }
            if batch.len() == BATCH_SIZE {
                let full = std::mem::replace(&mut batch, Vec::with_capacity(BATCH_SIZE));
                if tx.send(full).is_err() {
                    return skipped;
                }
            }
        }

        if !batch.is_empty() {
            let _ = tx.send(batch);
        }
        skipped
    })
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .with_thread_names(true)
        .with_ansi(true)
        .init();

    let path = std::env::args()
        .nth(1)
        .context("usage: broker_signal_backfill <messages.jsonl | ->")?;

    let config = Config::from_env().context("loading configuration")?;
    info!(
        min_rate_per_mile = config.preferences.min_rate_per_mile,
        preferred_states = config.preferences.preferred_states.len(),
        max_distance_miles = config.preferences.max_distance_miles,
        weight_mode = ?config.extractor.weight_mode,
        "Configuration loaded"
    );

    let directory = Arc::new(BrokerDirectory::seeded());
    for entry in &config.custom_brokers {
        if let Err(e) = directory.add_custom_broker(entry.clone()) {
            warn!(broker = %entry.name, error = %e, "Custom broker not added");
        }
    }
    info!(brokers = directory.len(), "Broker directory ready");

    let store = Arc::new(InMemoryStore::new());
    let pipeline = SignalPipeline::new(&config, directory, store.clone());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing the current batch");
        }
        let _ = shutdown_tx.send(true);
    });

    let (batch_tx, batch_rx) = crossbeam_channel::bounded::<Vec<RawMessage>>(CHANNEL_CAPACITY);
    let reader = spawn_reader(open_input(&path)?, batch_tx);

    let mut batches = 0usize;
    loop {
        if *shutdown_rx.borrow() {
            info!("Shutdown requested, stopping before the next batch");
            break;
        }

        match batch_rx.try_recv() {
            Ok(batch) => {
                batches += 1;
                let report = pipeline.ingest_batch(&batch, &shutdown_rx).await;
                for (message_id, err) in &report.store_failures {
                    warn!(message_id = %message_id, error = %err, "Load not stored");
                }
                for (broker, err) in &report.refresh_failures {
                    warn!(broker = %broker, error = %err, "Broker stats not refreshed");
                }
            }
            Err(crossbeam_channel::TryRecvError::Empty) => {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
            Err(crossbeam_channel::TryRecvError::Disconnected) => break,
        }
    }

    drop(batch_rx);
    let skipped = reader
        .join()
        .map_err(|_| anyhow::anyhow!("message reader thread panicked"))?;

    let metrics = pipeline.metrics().snapshot();
    let dedup = pipeline.dedup().snapshot();
    info!(
        batches,
        skipped_lines = skipped,
        received = metrics.messages_received,
        duplicates = dedup.duplicates_caught,
        loads = metrics.loads_persisted,
        brokers = store.broker_keys().len(),
        store_failures = metrics.store_failures,
        refresh_failures = metrics.stats_refresh_failures,
        "Backfill complete"
    );

    let stats = store.all_stats();
    println!(
        "{}",
        serde_json::to_string_pretty(&stats).context("serializing broker stats")?
    );

    Ok(())
}
