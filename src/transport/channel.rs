// In-process transport
// Feeds the pipeline from a tokio channel instead of a broker; used for
// local runs and by the test suites
//
// openwhisk-stats-exporter 2026 Oct

use super::{InboundMessage, MessageStream, Subscription, Transport};
use crate::errors::ExporterError;
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::debug;

/// Hands out exactly one subscription backed by an unbounded channel.
pub struct ChannelTransport {
    rx: Mutex<Option<mpsc::UnboundedReceiver<InboundMessage>>>,
}

impl ChannelTransport {
    pub fn new() -> (Self, mpsc::UnboundedSender<InboundMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                rx: Mutex::new(Some(rx)),
            },
            tx,
        )
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn subscribe(&self, subscription: &Subscription) -> Result<MessageStream, ExporterError> {
        let rx = self
            .rx
            .lock()
            .map_err(|_| ExporterError::Transport("channel transport lock poisoned".into()))?
            .take()
            .ok_or_else(|| {
                ExporterError::Transport("channel transport is already subscribed".into())
            })?;
        debug!(topic = %subscription.topic, "channel subscription opened");
        Ok(UnboundedReceiverStream::new(rx).map(Ok).boxed())
    }
}
