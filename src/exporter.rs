// Stats exporter
// Wires the aggregator into the event source and owns the start/stop
// ordering of the pipeline
//
// openwhisk-stats-exporter 2026 Oct

use crate::aggregator::StatsAggregator;
use crate::config::ServiceConfig;
use crate::errors::ExporterError;
use crate::metrics::StatsRegistry;
use crate::push::{PushGateway, PUSH_JOB};
use crate::scrape::ScrapeServer;
use crate::source::{EventObserver, EventSource};
use crate::transport::Transport;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

pub struct StatsExporter {
    stats: StatsRegistry,
    aggregator: Arc<dyn EventObserver>,
    source: EventSource,
}

impl StatsExporter {
    pub fn new(
        config: &ServiceConfig,
        stats: StatsRegistry,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, ExporterError> {
        let push = if config.push_on_event {
            Some(PushGateway::new(
                &config.push_gateway,
                PUSH_JOB,
                config.push_timeout,
            )?)
        } else {
            info!("push on event disabled; counters are served by the scrape endpoint only");
            None
        };
        let aggregator: Arc<dyn EventObserver> =
            Arc::new(StatsAggregator::new(stats.clone(), push));
        let source = EventSource::new(
            config.application_id.as_str(),
            config.topic.as_str(),
            config.kafka_brokers.as_str(),
            transport,
        )?;
        Ok(Self {
            stats,
            aggregator,
            source,
        })
    }

    pub fn stats(&self) -> &StatsRegistry {
        &self.stats
    }

    pub fn source(&self) -> &EventSource {
        &self.source
    }

    /// Register the aggregator and open the subscription.
    pub async fn start(&self) -> Result<(), ExporterError> {
        self.source.add_observer(Arc::clone(&self.aggregator)).await;
        if let Err(err) = self.source.start().await {
            self.source.remove_observer(&self.aggregator).await;
            return Err(err);
        }
        Ok(())
    }

    /// Start the pipeline, then bind the scrape endpoint on `addr`.
    ///
    /// If the listener cannot be bound the already-started pipeline is
    /// stopped before the error is returned.
    pub async fn serve(&self, addr: SocketAddr) -> Result<ScrapeServer, ExporterError> {
        self.start().await?;
        match ScrapeServer::bind(addr, self.stats.clone()).await {
            Ok(server) => Ok(server),
            Err(err) => {
                warn!(error = %err, "scrape listener unavailable, stopping pipeline");
                self.stop().await;
                Err(err)
            }
        }
    }

    /// Unregister the aggregator and close the subscription.
    pub async fn stop(&self) {
        self.source.remove_observer(&self.aggregator).await;
        self.source.stop().await;
    }
}
