use axum::{body::Bytes, extract::State, http::Uri, routing::post, Router};
use openwhisk_stats_exporter::config::ServiceConfig;
use openwhisk_stats_exporter::errors::ExporterError;
use openwhisk_stats_exporter::exporter::StatsExporter;
use openwhisk_stats_exporter::metrics::{ActivationLabels, StatsRegistry};
use openwhisk_stats_exporter::scrape::ScrapeServer;
use openwhisk_stats_exporter::transport::channel::ChannelTransport;
use openwhisk_stats_exporter::transport::InboundMessage;
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use url::Url;

type Pushes = Arc<Mutex<Vec<String>>>;

async fn record_push(State(pushes): State<Pushes>, uri: Uri, _body: Bytes) {
    pushes.lock().unwrap().push(uri.path().to_string());
}

async fn fake_gateway() -> (Url, Pushes) {
    let pushes: Pushes = Arc::default();
    let app = Router::new()
        .route("/metrics/job/:job", post(record_push))
        .with_state(Arc::clone(&pushes));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (Url::parse(&format!("http://{addr}")).unwrap(), pushes)
}

fn config(push_gateway: Url) -> ServiceConfig {
    ServiceConfig {
        kafka_brokers: "in-process".into(),
        topic: "events".into(),
        application_id: "openwhisk-stats-collector".into(),
        push_gateway,
        metrics_port: 0,
        push_timeout: Some(Duration::from_secs(5)),
        push_on_event: true,
    }
}

fn activation(action: &str, duration: u64) -> InboundMessage {
    let event = json!({
        "eventType": "Activation",
        "source": "s1",
        "namespace": "ns1",
        "userId": "u1",
        "body": {"statusCode": 200, "name": action, "kind": "nodejs:10", "duration": duration}
    });
    InboundMessage::with_payload(event.to_string())
}

fn labels(action: &str) -> ActivationLabels {
    ActivationLabels {
        namespace: "ns1".into(),
        source: "s1".into(),
        user_id: "u1".into(),
        action: action.into(),
        status_code: "200".into(),
        kind: "nodejs:10".into(),
    }
}

async fn wait_for_activations(stats: &StatsRegistry, expected: f64) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while stats.total_activations() < expected {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("activations were not counted in time");
}

async fn scrape(addr: std::net::SocketAddr) -> String {
    let mut conn = tokio::net::TcpStream::connect(addr).await.unwrap();
    conn.write_all(b"GET /metrics HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut raw = String::new();
    conn.read_to_string(&mut raw).await.unwrap();
    raw
}

#[tokio::test]
async fn activations_flow_from_topic_to_push_and_scrape() {
    let (gateway, pushes) = fake_gateway().await;
    let (transport, tx) = ChannelTransport::new();
    let stats = StatsRegistry::new().unwrap();
    let exporter =
        StatsExporter::new(&config(gateway), stats.clone(), Arc::new(transport)).unwrap();
    exporter.start().await.unwrap();
    let scrape_server = ScrapeServer::bind("127.0.0.1:0".parse().unwrap(), stats.clone())
        .await
        .unwrap();

    tx.send(activation("act1", 42)).unwrap();
    tx.send(InboundMessage::with_payload("{\"eventType\":\"Metric\"}")).unwrap();
    tx.send(InboundMessage::with_payload("garbage")).unwrap();
    tx.send(activation("act1", 58)).unwrap();
    tx.send(activation("act2", 5)).unwrap();
    wait_for_activations(&stats, 3.0).await;

    assert_eq!(stats.activations(&labels("act1")), 2.0);
    assert_eq!(stats.duration(&labels("act1")), 100.0);
    assert_eq!(stats.activations(&labels("act2")), 1.0);
    assert_eq!(stats.duration(&labels("act2")), 5.0);

    // The push for an activation follows its counter update.
    tokio::time::timeout(Duration::from_secs(5), async {
        while pushes.lock().unwrap().len() < 3 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("pushes did not arrive in time");
    let pushes = pushes.lock().unwrap().clone();
    assert_eq!(pushes.len(), 3);
    assert!(pushes.iter().all(|path| path == "/metrics/job/openwhisk"));

    let raw = scrape(scrape_server.local_addr()).await;
    assert!(raw.starts_with("HTTP/1.1 200"));
    assert!(raw.contains(
        r#"activations_total_counter{action="act1",kind="nodejs:10",namespace="ns1",source="s1",statusCode="200",userId="u1"} 2"#
    ));
    assert!(raw.contains(
        r#"activation_duration_counter{action="act1",kind="nodejs:10",namespace="ns1",source="s1",statusCode="200",userId="u1"} 100"#
    ));

    scrape_server.stop().await;
    exporter.stop().await;
    assert_eq!(exporter.source().observer_count().await, 0);
    assert!(tx.send(activation("act1", 1)).is_err());
}

#[tokio::test]
async fn unreachable_push_gateway_does_not_stall_counting() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let dead = Url::parse(&format!("http://{}", listener.local_addr().unwrap())).unwrap();
    drop(listener);

    let (transport, tx) = ChannelTransport::new();
    let stats = StatsRegistry::new().unwrap();
    let exporter = StatsExporter::new(&config(dead), stats.clone(), Arc::new(transport)).unwrap();
    exporter.start().await.unwrap();

    tx.send(activation("act1", 42)).unwrap();
    tx.send(activation("act1", 58)).unwrap();
    wait_for_activations(&stats, 2.0).await;
    assert_eq!(stats.duration(&labels("act1")), 100.0);

    exporter.stop().await;
}

#[tokio::test]
async fn push_can_be_disabled() {
    let (gateway, pushes) = fake_gateway().await;
    let (transport, tx) = ChannelTransport::new();
    let stats = StatsRegistry::new().unwrap();
    let mut cfg = config(gateway);
    cfg.push_on_event = false;
    let exporter = StatsExporter::new(&cfg, stats.clone(), Arc::new(transport)).unwrap();
    exporter.start().await.unwrap();

    tx.send(activation("act1", 42)).unwrap();
    wait_for_activations(&stats, 1.0).await;
    assert!(pushes.lock().unwrap().is_empty());

    exporter.stop().await;
}

#[tokio::test]
async fn failed_subscription_leaves_no_observer_registered() {
    let (transport, _tx) = ChannelTransport::new();
    let transport = Arc::new(transport);
    let stats = StatsRegistry::new().unwrap();
    let (gateway, _pushes) = fake_gateway().await;

    let first =
        StatsExporter::new(&config(gateway.clone()), stats.clone(), transport.clone()).unwrap();
    first.start().await.unwrap();

    // The channel transport only hands out one subscription.
    let second = StatsExporter::new(&config(gateway), stats, transport).unwrap();
    assert!(second.start().await.is_err());
    assert_eq!(second.source().observer_count().await, 0);

    first.stop().await;
}

#[tokio::test]
async fn scrape_bind_failure_stops_the_started_pipeline() {
    let (gateway, _pushes) = fake_gateway().await;
    let (transport, tx) = ChannelTransport::new();
    let stats = StatsRegistry::new().unwrap();
    let exporter = StatsExporter::new(&config(gateway), stats, Arc::new(transport)).unwrap();

    let occupied = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let taken = occupied.local_addr().unwrap();

    let err = exporter.serve(taken).await.unwrap_err();
    assert!(matches!(err, ExporterError::ScrapeListener(_)));
    assert_eq!(exporter.source().observer_count().await, 0);
    assert!(!exporter.source().is_running().await);
    assert!(tx.send(activation("act1", 42)).is_err());
}

#[tokio::test]
async fn serve_starts_pipeline_and_scrape_endpoint() {
    let (gateway, _pushes) = fake_gateway().await;
    let (transport, tx) = ChannelTransport::new();
    let stats = StatsRegistry::new().unwrap();
    let exporter =
        StatsExporter::new(&config(gateway), stats.clone(), Arc::new(transport)).unwrap();

    let scrape_server = exporter.serve("127.0.0.1:0".parse().unwrap()).await.unwrap();
    assert!(exporter.source().is_running().await);

    tx.send(activation("act1", 42)).unwrap();
    wait_for_activations(&stats, 1.0).await;
    let raw = scrape(scrape_server.local_addr()).await;
    assert!(raw.contains("activations_total_counter{"));

    scrape_server.stop().await;
    exporter.stop().await;
}
