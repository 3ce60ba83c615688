// Event source
// Subscribes to the OpenWhisk events topic, decodes every record into an
// EventEnvelope and fans it out to the registered observers. Dispatch runs
// on the receive loop itself, so slow observers throttle consumption.
//
// openwhisk-stats-exporter 2026 Oct

use crate::errors::ExporterError;
use crate::event::EventEnvelope;
use crate::transport::{InboundMessage, MessageStream, Subscription, Transport};
use async_trait::async_trait;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Pause after a transport error before polling the subscription again.
const TRANSPORT_ERROR_PAUSE: Duration = Duration::from_secs(1);

/// Receives every envelope the source dispatches.
///
/// Implementations handle their own errors: a failing observer must not
/// stop the receive loop.
#[async_trait]
pub trait EventObserver: Send + Sync {
    async fn on_event(&self, envelope: &EventEnvelope);
}

type ObserverSet = Arc<RwLock<HashMap<usize, Arc<dyn EventObserver>>>>;

/// Observer identity is the allocation behind the `Arc`.
fn observer_key(observer: &Arc<dyn EventObserver>) -> usize {
    Arc::as_ptr(observer) as *const () as usize
}

pub struct EventSource {
    subscription: Subscription,
    transport: Arc<dyn Transport>,
    observers: ObserverSet,
    shutdown: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl EventSource {
    pub fn new(
        application_id: impl Into<String>,
        topic: impl Into<String>,
        brokers: impl Into<String>,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, ExporterError> {
        let subscription = Subscription {
            application_id: non_empty(application_id.into(), "application id")?,
            topic: non_empty(topic.into(), "kafka topic")?,
            brokers: non_empty(brokers.into(), "kafka broker address")?,
        };
        let (shutdown, _) = watch::channel(false);
        Ok(Self {
            subscription,
            transport,
            observers: Arc::new(RwLock::new(HashMap::new())),
            shutdown,
            task: Mutex::new(None),
        })
    }

    /// Returns `false` if the observer was already registered.
    pub async fn add_observer(&self, observer: Arc<dyn EventObserver>) -> bool {
        let key = observer_key(&observer);
        let mut observers = self.observers.write().await;
        if observers.contains_key(&key) {
            return false;
        }
        observers.insert(key, observer);
        true
    }

    /// Returns `false` if the observer was not registered.
    pub async fn remove_observer(&self, observer: &Arc<dyn EventObserver>) -> bool {
        self.observers
            .write()
            .await
            .remove(&observer_key(observer))
            .is_some()
    }

    pub async fn observer_count(&self) -> usize {
        self.observers.read().await.len()
    }

    /// Open the subscription and spawn the receive loop.
    ///
    /// Broker connectivity failures are returned to the caller; nothing is
    /// spawned in that case.
    pub async fn start(&self) -> Result<(), ExporterError> {
        let mut task = self.task.lock().await;
        if task.is_some() {
            return Err(ExporterError::Transport(format!(
                "event source for topic {} already started",
                self.subscription.topic
            )));
        }
        if *self.shutdown.borrow() {
            return Err(ExporterError::Transport(format!(
                "event source for topic {} was stopped",
                self.subscription.topic
            )));
        }

        let stream = self.transport.subscribe(&self.subscription).await?;
        info!(
            topic = %self.subscription.topic,
            application_id = %self.subscription.application_id,
            brokers = %self.subscription.brokers,
            "event source started"
        );

        let observers = Arc::clone(&self.observers);
        let shutdown_rx = self.shutdown.subscribe();
        *task = Some(tokio::spawn(receive_loop(stream, observers, shutdown_rx)));
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        matches!(&*self.task.lock().await, Some(handle) if !handle.is_finished())
    }

    /// Close the subscription. A dispatch already in progress runs to
    /// completion; no message is received afterwards.
    pub async fn stop(&self) {
        self.shutdown.send_replace(true);
        let handle = self.task.lock().await.take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                error!(error = %err, "event source receive loop panicked");
            }
            info!(topic = %self.subscription.topic, "event source stopped");
        }
    }
}

impl Drop for EventSource {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}

fn non_empty(value: String, what: &str) -> Result<String, ExporterError> {
    if value.trim().is_empty() {
        return Err(ExporterError::Configuration(format!("{what} is required")));
    }
    Ok(value)
}

async fn receive_loop(
    mut stream: MessageStream,
    observers: ObserverSet,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            biased;
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
            next = stream.next() => match next {
                Some(Ok(message)) => dispatch(&observers, message).await,
                Some(Err(err)) => {
                    error!(error = %err, "event source transport error");
                    tokio::select! {
                        _ = tokio::time::sleep(TRANSPORT_ERROR_PAUSE) => {}
                        changed = shutdown_rx.changed() => {
                            if changed.is_err() || *shutdown_rx.borrow() {
                                break;
                            }
                        }
                    }
                }
                None => {
                    warn!("event subscription closed by transport");
                    break;
                }
            },
        }
    }
    // Dropping the stream closes the subscription.
    drop(stream);
}

async fn dispatch(observers: &ObserverSet, message: InboundMessage) {
    let Some(payload) = message.payload else {
        warn!("dropping message without payload");
        return;
    };
    debug!(
        key = ?message.key.as_deref().map(String::from_utf8_lossy),
        payload = %String::from_utf8_lossy(&payload),
        "received message"
    );

    let envelope = match EventEnvelope::decode(&payload) {
        Ok(envelope) => envelope,
        Err(err) => {
            warn!(error = %err, "dropping undecodable message");
            return;
        }
    };

    // Snapshot so registration changes never race with iteration.
    let snapshot: Vec<Arc<dyn EventObserver>> =
        observers.read().await.values().cloned().collect();
    for observer in snapshot {
        observer.on_event(&envelope).await;
    }
}
