// Metrics registry module
// This file owns the prometheus registry and the two activation counters
// shared by the aggregator, the push client and the scrape endpoint
//
// openwhisk-stats-exporter 2026 Oct

use crate::errors::ExporterError;
use prometheus::proto::MetricFamily;
use prometheus::{CounterVec, Encoder, Opts, Registry, TextEncoder};

pub const ACTIVATIONS_TOTAL: &str = "activations_total_counter";
pub const ACTIVATION_DURATION: &str = "activation_duration_counter";

/// Label schema shared by both counters. Order matters: values are positional.
pub const LABEL_NAMES: [&str; 6] = [
    "namespace",
    "source",
    "userId",
    "action",
    "statusCode",
    "kind",
];

/// Label tuple of one activation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ActivationLabels {
    pub namespace: String,
    pub source: String,
    pub user_id: String,
    pub action: String,
    pub status_code: String,
    pub kind: String,
}

impl ActivationLabels {
    /// Values in `LABEL_NAMES` order.
    pub fn values(&self) -> [&str; 6] {
        [
            &self.namespace,
            &self.source,
            &self.user_id,
            &self.action,
            &self.status_code,
            &self.kind,
        ]
    }
}

/// Process-wide counter set. Cloning shares the underlying counters.
#[derive(Clone)]
pub struct StatsRegistry {
    registry: Registry,
    activations: CounterVec,
    duration: CounterVec,
}

impl StatsRegistry {
    pub fn new() -> Result<Self, ExporterError> {
        let registry = Registry::new();
        let activations = CounterVec::new(
            Opts::new(ACTIVATIONS_TOTAL, "Total Activations Counter"),
            &LABEL_NAMES,
        )?;
        let duration = CounterVec::new(
            Opts::new(ACTIVATION_DURATION, "Activation Duration Counter"),
            &LABEL_NAMES,
        )?;
        registry.register(Box::new(activations.clone()))?;
        registry.register(Box::new(duration.clone()))?;
        Ok(Self {
            registry,
            activations,
            duration,
        })
    }

    /// Count one activation and add its duration (milliseconds) for the same labels.
    pub fn record_activation(&self, labels: &ActivationLabels, duration_ms: f64) {
        let values = labels.values();
        self.activations.with_label_values(&values).inc();
        self.duration.with_label_values(&values).inc_by(duration_ms);
    }

    pub fn gather(&self) -> Vec<MetricFamily> {
        self.registry.gather()
    }

    /// Current value of the invocation counter for `labels`, without creating the series.
    pub fn activations(&self, labels: &ActivationLabels) -> f64 {
        self.lookup(ACTIVATIONS_TOTAL, labels)
    }

    /// Current value of the duration counter for `labels`, without creating the series.
    pub fn duration(&self, labels: &ActivationLabels) -> f64 {
        self.lookup(ACTIVATION_DURATION, labels)
    }

    /// Sum of the invocation counter across every label tuple.
    pub fn total_activations(&self) -> f64 {
        self.sum(ACTIVATIONS_TOTAL)
    }

    /// Sum of the duration counter across every label tuple.
    pub fn total_duration(&self) -> f64 {
        self.sum(ACTIVATION_DURATION)
    }

    /// Text exposition of both counters and its content type.
    pub fn encode_text(&self) -> Result<(String, Vec<u8>), ExporterError> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.gather(), &mut buffer)?;
        Ok((encoder.format_type().to_string(), buffer))
    }

    fn sum(&self, name: &str) -> f64 {
        self.gather()
            .iter()
            .filter(|family| family.get_name() == name)
            .flat_map(|family| family.get_metric())
            .map(|metric| metric.get_counter().get_value())
            .sum()
    }

    fn lookup(&self, name: &str, labels: &ActivationLabels) -> f64 {
        let wanted = labels.values();
        self.gather()
            .iter()
            .filter(|family| family.get_name() == name)
            .flat_map(|family| family.get_metric())
            .find(|metric| {
                let pairs = metric.get_label();
                LABEL_NAMES.iter().zip(wanted.iter()).all(|(label, value)| {
                    pairs
                        .iter()
                        .any(|pair| pair.get_name() == *label && pair.get_value() == *value)
                })
            })
            .map(|metric| metric.get_counter().get_value())
            .unwrap_or(0.0)
    }
}
