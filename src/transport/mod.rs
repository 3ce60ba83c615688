// Transport layer
// Broker-facing side of the event pipeline: a subscription yields raw
// messages as a stream, independent of which broker produced them
//
// openwhisk-stats-exporter 2026 Oct

pub mod channel;
#[cfg(feature = "kafka")]
pub mod kafka;

use crate::errors::ExporterError;
use async_trait::async_trait;
use futures::stream::BoxStream;

pub type MessageStream = BoxStream<'static, Result<InboundMessage, ExporterError>>;

/// What to subscribe to, and as whom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub application_id: String,
    pub topic: String,
    pub brokers: String,
}

/// One raw record as delivered by the broker.
#[derive(Debug, Clone, Default)]
pub struct InboundMessage {
    pub key: Option<Vec<u8>>,
    pub payload: Option<Vec<u8>>,
}

impl InboundMessage {
    pub fn with_payload(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            key: None,
            payload: Some(payload.into()),
        }
    }
}

/// Opens subscriptions. Dropping the returned stream closes the subscription.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn subscribe(&self, subscription: &Subscription) -> Result<MessageStream, ExporterError>;
}
