// Error types and error handling module
// This file defines the error taxonomy shared by the event pipeline,
// the stats aggregation layer and the process wiring
//
// openwhisk-stats-exporter 2026 Oct

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExporterError {
    /// Missing or invalid required setting; fatal at startup.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// Broker or push gateway unreachable.
    #[error("transport error: {0}")]
    Transport(String),
    /// Payload failed to parse or lacks required fields; the event is dropped.
    #[error("malformed event: {0}")]
    MalformedEvent(String),
    #[error("scrape listener error: {0}")]
    ScrapeListener(String),
    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}

impl From<config::ConfigError> for ExporterError {
    fn from(err: config::ConfigError) -> Self {
        ExporterError::Configuration(err.to_string())
    }
}
