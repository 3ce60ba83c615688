// Pushgateway client
// Pushes the current state of the activation counters to a Prometheus
// Pushgateway using push-add semantics (POST replaces only the pushed metrics)
//
// openwhisk-stats-exporter 2026 Oct

use crate::errors::ExporterError;
use crate::metrics::StatsRegistry;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Grouping key the counters are pushed under.
pub const PUSH_JOB: &str = "openwhisk";

#[derive(Debug, Clone)]
pub struct PushGateway {
    http: Client,
    url: Url,
}

impl PushGateway {
    /// `timeout` of `None` lets a push wait as long as the gateway takes.
    pub fn new(base: &Url, job: &str, timeout: Option<Duration>) -> Result<Self, ExporterError> {
        let mut url = base.clone();
        url.path_segments_mut()
            .map_err(|_| {
                ExporterError::Configuration(format!("push gateway {base} cannot be a base url"))
            })?
            .pop_if_empty()
            .extend(["metrics", "job", job]);

        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|e| ExporterError::Configuration(format!("push client: {e}")))?;
        Ok(Self { http, url })
    }

    pub fn endpoint(&self) -> &Url {
        &self.url
    }

    /// Push both counters in one request.
    pub async fn push_add(&self, stats: &StatsRegistry) -> Result<(), ExporterError> {
        let (content_type, body) = stats.encode_text()?;
        debug!(url = %self.url, bytes = body.len(), "pushing to pushgateway");
        let resp = self
            .http
            .post(self.url.clone())
            .header(CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await
            .map_err(|e| ExporterError::Transport(format!("pushgateway send: {e}")))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let detail = resp.text().await.unwrap_or_default();
            return Err(ExporterError::Transport(format!(
                "pushgateway http {status}: {}",
                detail.trim()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::post, Router};

    /// Gateway that rejects every push.
    async fn failing_gateway() -> Url {
        let app = Router::new().route(
            "/metrics/job/:job",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "storage full") }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Url::parse(&format!("http://{addr}")).unwrap()
    }

    #[test]
    fn endpoint_includes_job_grouping_key() {
        let base = Url::parse("http://pushgateway:9091").unwrap();
        let push = PushGateway::new(&base, PUSH_JOB, None).unwrap();
        assert_eq!(
            push.endpoint().as_str(),
            "http://pushgateway:9091/metrics/job/openwhisk"
        );
    }

    #[test]
    fn endpoint_keeps_base_path_prefix() {
        let base = Url::parse("https://gw.example.com/prom/").unwrap();
        let push = PushGateway::new(&base, "whisk jobs", None).unwrap();
        assert_eq!(
            push.endpoint().as_str(),
            "https://gw.example.com/prom/metrics/job/whisk%20jobs"
        );
    }

    #[tokio::test]
    async fn unreachable_gateway_is_a_transport_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let base = Url::parse(&format!("http://{addr}")).unwrap();
        let push = PushGateway::new(&base, PUSH_JOB, Some(Duration::from_secs(2))).unwrap();
        let stats = StatsRegistry::new().unwrap();
        assert!(matches!(
            push.push_add(&stats).await,
            Err(ExporterError::Transport(_))
        ));
    }

    #[tokio::test]
    async fn rejected_push_is_a_transport_error() {
        let push = PushGateway::new(&failing_gateway().await, PUSH_JOB, None).unwrap();
        let stats = StatsRegistry::new().unwrap();
        match push.push_add(&stats).await {
            Err(ExporterError::Transport(msg)) => {
                assert!(msg.contains("500"));
                assert!(msg.contains("storage full"));
            }
            other => panic!("unexpected push outcome: {other:?}"),
        }
    }
}
