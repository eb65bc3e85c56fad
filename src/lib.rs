//! Freight-broker email in, scored business signals out.
//!
//! For every message: is the sender a broker, what load are they offering,
//! how well does it fit the carrier, and (for brokers) how is the
//! relationship trending. See [`pipeline::SignalPipeline`] for the full path.

pub mod aggregator;
pub mod broker_directory;
pub mod broker_identifier;
pub mod config;
pub mod dedup;
pub mod error;
pub mod extractor;
pub mod fit_scorer;
pub mod metrics;
pub mod models;
pub mod normalizer;
pub mod pipeline;
pub mod relationship;
pub mod store;
pub mod vocab;
