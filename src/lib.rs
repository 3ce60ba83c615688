// Library root module for openwhisk-stats-exporter
// This file defines the public API and module structure of the exporter:
// Kafka event collection, activation stats aggregation and metric export
//
// openwhisk-stats-exporter 2026 Oct

pub mod aggregator;
pub mod config;
pub mod errors;
pub mod event;
pub mod exporter;
pub mod metrics;
pub mod push;
pub mod scrape;
pub mod source;
pub mod transport;
