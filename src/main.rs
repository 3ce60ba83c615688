use anyhow::{anyhow, Context, Result};
use clap::{error::ErrorKind, CommandFactory, Parser};
use openwhisk_stats_exporter::config::{ConfigOverrides, ServiceConfig};
use openwhisk_stats_exporter::exporter::StatsExporter;
use openwhisk_stats_exporter::metrics::StatsRegistry;
use openwhisk_stats_exporter::transport::Transport;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Exports OpenWhisk activation statistics from Kafka to Prometheus.
///
/// Every flag can also be set through an `EXPORTER_*` environment variable.
#[derive(Debug, Parser)]
#[command(name = "openwhisk-stats-exporter", version, about)]
struct Cli {
    /// Address (host:port) of the Kafka brokers
    #[arg(long = "kafka", value_name = "HOST:PORT")]
    kafka: Option<String>,
    /// Kafka topic to listen for events [default: events]
    #[arg(long)]
    topic: Option<String>,
    /// Kafka consumer group / application id [default: openwhisk-stats-collector]
    #[arg(long = "app")]
    app: Option<String>,
    /// Address (host:port or URL) of the Prometheus Pushgateway
    #[arg(long = "push-gateway", value_name = "HOST:PORT")]
    push_gateway: Option<String>,
    /// Port of the /metrics scrape endpoint [default: 8080]
    #[arg(long)]
    metrics_port: Option<u16>,
    /// Timeout for each push in seconds; unset waits indefinitely
    #[arg(long)]
    push_timeout_secs: Option<u64>,
}

impl From<Cli> for ConfigOverrides {
    fn from(cli: Cli) -> Self {
        ConfigOverrides {
            kafka_brokers: cli.kafka,
            topic: cli.topic,
            application_id: cli.app,
            push_gateway: cli.push_gateway,
            metrics_port: cli.metrics_port,
            push_timeout_secs: cli.push_timeout_secs,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing().context("initialize tracing subscriber")?;

    let cli = Cli::parse();
    let config = match ServiceConfig::resolve(cli.into()) {
        Ok(config) => config,
        Err(err) => Cli::command()
            .error(ErrorKind::MissingRequiredArgument, err)
            .exit(),
    };

    if let Err(err) = run(config).await {
        error!(error = ?err, "fatal exporter error");
        std::process::exit(1);
    }
    Ok(())
}

async fn run(config: ServiceConfig) -> Result<()> {
    info!(
        kafka = %config.kafka_brokers,
        topic = %config.topic,
        application_id = %config.application_id,
        push_gateway = %config.push_gateway,
        metrics_port = config.metrics_port,
        "configuration loaded"
    );

    let stats = StatsRegistry::new().context("register activation counters")?;
    let exporter = StatsExporter::new(&config, stats, kafka_transport()?)
        .context("initialize stats exporter")?;
    let scrape_addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.metrics_port));
    let scrape = exporter
        .serve(scrape_addr)
        .await
        .with_context(|| format!("start exporter for kafka topic {}", config.topic))?;

    shutdown_signal().await;
    info!("shutdown signal received, stopping");

    scrape.stop().await;
    exporter.stop().await;
    Ok(())
}

#[cfg(feature = "kafka")]
fn kafka_transport() -> Result<Arc<dyn Transport>> {
    use openwhisk_stats_exporter::transport::kafka::KafkaTransport;
    Ok(Arc::new(KafkaTransport::new()))
}

#[cfg(not(feature = "kafka"))]
fn kafka_transport() -> Result<Arc<dyn Transport>> {
    Err(anyhow!(
        "this build has no kafka transport; rebuild with `--features kafka`"
    ))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "ctrl_c listener error");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "SIGTERM listener error");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

fn init_tracing() -> Result<()> {
    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "info,hyper=warn,rdkafka=warn".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(env_filter))
        .with_target(false)
        .try_init()
        .map_err(|err| anyhow!("tracing subscriber init: {err}"))
}
