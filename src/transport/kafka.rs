// Kafka transport implementation
// This file subscribes a librdkafka stream consumer to the OpenWhisk events
// topic and exposes the received records as a message stream
//
// openwhisk-stats-exporter 2026 Oct

use super::{InboundMessage, MessageStream, Subscription, Transport};
use crate::errors::ExporterError;
use async_trait::async_trait;
use futures::StreamExt;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::Message;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// How long `subscribe` waits for topic metadata before declaring the broker unreachable.
const METADATA_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Default)]
pub struct KafkaTransport {
    /// Extra librdkafka properties applied after the defaults
    overrides: Vec<(String, String)>,
}

impl KafkaTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.overrides.push((key.into(), value.into()));
        self
    }

    fn client_config(&self, subscription: &Subscription) -> ClientConfig {
        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", &subscription.brokers)
            .set("group.id", &subscription.application_id)
            .set("client.id", &subscription.application_id)
            .set("enable.auto.commit", "true")
            .set("auto.offset.reset", "earliest")
            .set("enable.partition.eof", "false");
        for (key, value) in &self.overrides {
            config.set(key, value);
        }
        config
    }
}

#[async_trait]
impl Transport for KafkaTransport {
    async fn subscribe(&self, subscription: &Subscription) -> Result<MessageStream, ExporterError> {
        let consumer: StreamConsumer = self
            .client_config(subscription)
            .create()
            .map_err(|e| ExporterError::Transport(format!("create kafka consumer: {e}")))?;
        let consumer = Arc::new(consumer);

        // librdkafka connects lazily; fetch metadata so an unreachable broker fails here.
        let probe = Arc::clone(&consumer);
        let topic = subscription.topic.clone();
        let probe_result = tokio::task::spawn_blocking(move || {
            probe
                .fetch_metadata(Some(topic.as_str()), METADATA_TIMEOUT)
                .map(|_| ())
        })
        .await
        .map_err(|e| ExporterError::Transport(format!("kafka metadata task: {e}")))?;
        probe_result.map_err(|e| {
            ExporterError::Transport(format!(
                "kafka brokers {} unreachable: {e}",
                subscription.brokers
            ))
        })?;

        consumer
            .subscribe(&[subscription.topic.as_str()])
            .map_err(|e| {
                ExporterError::Transport(format!("subscribe to {}: {e}", subscription.topic))
            })?;
        info!(
            topic = %subscription.topic,
            group = %subscription.application_id,
            brokers = %subscription.brokers,
            "kafka consumer subscribed"
        );

        let stream = futures::stream::unfold(consumer, |consumer| async move {
            let item = match consumer.recv().await {
                Ok(message) => Ok(InboundMessage {
                    key: message.key().map(<[u8]>::to_vec),
                    payload: message.payload().map(<[u8]>::to_vec),
                }),
                Err(e) => Err(ExporterError::Transport(format!("kafka consumer: {e}"))),
            };
            Some((item, consumer))
        });
        Ok(stream.boxed())
    }
}
