// Scrape endpoint
// HTTP listener exposing the activation counters in the Prometheus text
// exposition format for pull-based scraping
//
// openwhisk-stats-exporter 2026 Oct

use crate::errors::ExporterError;
use crate::metrics::StatsRegistry;
use axum::{
    extract::State,
    http::{header::CONTENT_TYPE, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::net::SocketAddr;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Create the HTTP router serving `/metrics` and `/health`
pub fn create_scrape_router(stats: StatsRegistry) -> Router {
    Router::new()
        .route("/metrics", get(metrics))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(stats)
}

async fn metrics(State(stats): State<StatsRegistry>) -> Response {
    match stats.encode_text() {
        Ok((content_type, body)) => ([(CONTENT_TYPE, content_type)], body).into_response(),
        Err(err) => {
            error!(error = %err, "failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
        }
    }
}

async fn health_check() -> StatusCode {
    StatusCode::OK
}

/// Running scrape listener. Stop it explicitly; dropping it also shuts it down.
#[derive(Debug)]
pub struct ScrapeServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl ScrapeServer {
    pub async fn bind(addr: SocketAddr, stats: StatsRegistry) -> Result<Self, ExporterError> {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| ExporterError::ScrapeListener(format!("bind {addr}: {e}")))?;
        let addr = listener
            .local_addr()
            .map_err(|e| ExporterError::ScrapeListener(format!("local address: {e}")))?;

        let (shutdown, shutdown_rx) = oneshot::channel::<()>();
        let app = create_scrape_router(stats);
        let handle = tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(err) = served {
                error!(error = %err, "scrape listener failed");
            }
        });
        info!(address = %addr, "metrics HTTP server started");

        Ok(Self {
            addr,
            shutdown: Some(shutdown),
            handle: Some(handle),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub async fn stop(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(handle) = self.handle.take() {
            if let Err(err) = handle.await {
                error!(error = %err, "scrape listener task panicked");
            }
        }
        info!(address = %self.addr, "metrics HTTP server stopped");
    }
}

impl Drop for ScrapeServer {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}
