// Stats aggregator
// Observer that turns OpenWhisk activation events into the invocation and
// duration counters and pushes the counter state after every activation
//
// openwhisk-stats-exporter 2026 Oct

use crate::errors::ExporterError;
use crate::event::{EventEnvelope, EventKind};
use crate::metrics::{ActivationLabels, StatsRegistry};
use crate::push::PushGateway;
use crate::source::EventObserver;
use async_trait::async_trait;
use tracing::{debug, error, warn};

/// What `record` did with an event.
#[derive(Debug, Clone, PartialEq)]
pub enum Recorded {
    /// Both counters were incremented for these labels
    Activation {
        labels: ActivationLabels,
        duration_ms: u64,
    },
    /// Event kind without metrics; counters untouched
    Skipped(EventKind),
}

pub struct StatsAggregator {
    stats: StatsRegistry,
    push: Option<PushGateway>,
}

impl StatsAggregator {
    /// `push` of `None` leaves the counters to the scrape endpoint only.
    pub fn new(stats: StatsRegistry, push: Option<PushGateway>) -> Self {
        Self { stats, push }
    }

    pub fn stats(&self) -> &StatsRegistry {
        &self.stats
    }

    /// Classify the event and update the counters. Does not push.
    pub fn record(&self, envelope: &EventEnvelope) -> Result<Recorded, ExporterError> {
        let origin = envelope.origin()?;
        debug!(
            source = origin.source,
            namespace = origin.namespace,
            event_type = %envelope.kind(),
            "received event"
        );

        match envelope.kind() {
            EventKind::Activation => {
                let body = envelope.activation_body()?;
                let labels = ActivationLabels {
                    namespace: origin.namespace.to_string(),
                    source: origin.source.to_string(),
                    user_id: origin.user_id.to_string(),
                    action: body.name.to_string(),
                    status_code: body.status_code.to_string(),
                    kind: body.kind.to_string(),
                };
                self.stats.record_activation(&labels, body.duration as f64);
                Ok(Recorded::Activation {
                    labels,
                    duration_ms: body.duration,
                })
            }
            EventKind::Metric | EventKind::Unrecognized(_) => {
                Ok(Recorded::Skipped(envelope.kind().clone()))
            }
            EventKind::Untyped => Err(ExporterError::MalformedEvent(
                "missing or non-string field `eventType`".into(),
            )),
        }
    }

    async fn push(&self) {
        let Some(push) = &self.push else {
            return;
        };
        if let Err(err) = push.push_add(&self.stats).await {
            error!(error = %err, url = %push.endpoint(), "error occurred when pushing");
        }
    }
}

#[async_trait]
impl EventObserver for StatsAggregator {
    async fn on_event(&self, envelope: &EventEnvelope) {
        match self.record(envelope) {
            Ok(Recorded::Activation { .. }) => self.push().await,
            Ok(Recorded::Skipped(kind)) => debug!(event_type = %kind, "event skipped"),
            Err(err) => warn!(error = %err, "discarding malformed event"),
        }
    }
}
