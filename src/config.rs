// Configuration management module
// This file resolves the service settings once at startup from defaults,
// environment variables and command-line overrides, and validates them
// before any pipeline component is constructed
//
// openwhisk-stats-exporter 2026 Oct

use crate::errors::ExporterError;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

pub const DEFAULT_TOPIC: &str = "events";
pub const DEFAULT_APPLICATION_ID: &str = "openwhisk-stats-collector";
pub const DEFAULT_METRICS_PORT: u16 = 8080;
/// Environment variables are read as `EXPORTER_<FIELD>`, e.g. `EXPORTER_KAFKA_BROKERS`.
pub const ENV_PREFIX: &str = "EXPORTER";

/// Values supplied on the command line. They win over the environment.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub kafka_brokers: Option<String>,
    pub topic: Option<String>,
    pub application_id: Option<String>,
    pub push_gateway: Option<String>,
    pub metrics_port: Option<u16>,
    pub push_timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    kafka_brokers: Option<String>,
    push_gateway: Option<String>,
    topic: String,
    application_id: String,
    metrics_port: u16,
    push_timeout_secs: Option<u64>,
    push_on_event: bool,
}

/// Resolved, validated and immutable service configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Kafka bootstrap servers, e.g. `kafka:9092`
    pub kafka_brokers: String,
    /// Topic carrying OpenWhisk events
    pub topic: String,
    /// Consumer group / application id
    pub application_id: String,
    /// Prometheus Pushgateway base URL
    pub push_gateway: Url,
    /// Port of the `/metrics` scrape listener
    pub metrics_port: u16,
    /// Request timeout for pushes; `None` waits indefinitely
    pub push_timeout: Option<Duration>,
    /// Push counter state after every activation event
    pub push_on_event: bool,
}

impl ServiceConfig {
    pub fn resolve(overrides: ConfigOverrides) -> Result<Self, ExporterError> {
        let env = config::Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__");
        Self::resolve_from(env, overrides)
    }

    pub fn resolve_from(
        env: config::Environment,
        overrides: ConfigOverrides,
    ) -> Result<Self, ExporterError> {
        let cfg = config::Config::builder()
            .set_default("topic", DEFAULT_TOPIC)?
            .set_default("application_id", DEFAULT_APPLICATION_ID)?
            .set_default("metrics_port", i64::from(DEFAULT_METRICS_PORT))?
            .set_default("push_on_event", true)?
            .add_source(env)
            .set_override_option("kafka_brokers", overrides.kafka_brokers)?
            .set_override_option("topic", overrides.topic)?
            .set_override_option("application_id", overrides.application_id)?
            .set_override_option("push_gateway", overrides.push_gateway)?
            .set_override_option("metrics_port", overrides.metrics_port.map(i64::from))?
            .set_override_option(
                "push_timeout_secs",
                overrides
                    .push_timeout_secs
                    .and_then(|secs| i64::try_from(secs).ok()),
            )?
            .build()?;
        let raw: RawConfig = cfg.try_deserialize()?;
        raw.validate()
    }
}

impl RawConfig {
    fn validate(self) -> Result<ServiceConfig, ExporterError> {
        let kafka_brokers = required(self.kafka_brokers, "kafka broker address")?;
        let push_gateway = required(self.push_gateway, "push gateway address")?;
        let push_gateway = parse_push_gateway(&push_gateway)?;

        let topic = self.topic.trim().to_string();
        if topic.is_empty() {
            return Err(ExporterError::Configuration(
                "kafka topic must not be empty".into(),
            ));
        }
        let application_id = self.application_id.trim().to_string();
        if application_id.is_empty() {
            return Err(ExporterError::Configuration(
                "application id must not be empty".into(),
            ));
        }

        Ok(ServiceConfig {
            kafka_brokers,
            topic,
            application_id,
            push_gateway,
            metrics_port: self.metrics_port,
            push_timeout: self
                .push_timeout_secs
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            push_on_event: self.push_on_event,
        })
    }
}

fn required(value: Option<String>, what: &str) -> Result<String, ExporterError> {
    match value.map(|v| v.trim().to_string()) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ExporterError::Configuration(format!("{what} is required"))),
    }
}

/// Accepts `host:port` as well as a full URL; plain addresses get `http://`.
pub fn parse_push_gateway(raw: &str) -> Result<Url, ExporterError> {
    let trimmed = raw.trim();
    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    };
    let url = Url::parse(&candidate).map_err(|e| {
        ExporterError::Configuration(format!("invalid push gateway address {trimmed}: {e}"))
    })?;
    if url.cannot_be_a_base() || url.host_str().is_none() {
        return Err(ExporterError::Configuration(format!(
            "invalid push gateway address {trimmed}: missing host"
        )));
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(vars: &[(&str, &str)]) -> config::Environment {
        let mut source = config::Map::new();
        for (k, v) in vars {
            source.insert(k.to_string(), v.to_string());
        }
        config::Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .source(Some(source))
    }

    fn required_overrides() -> ConfigOverrides {
        ConfigOverrides {
            kafka_brokers: Some("kafka:9092".into()),
            push_gateway: Some("pushgateway:9091".into()),
            ..Default::default()
        }
    }

    #[test]
    fn defaults_apply_when_optional_values_absent() {
        let cfg = ServiceConfig::resolve_from(env(&[]), required_overrides()).unwrap();
        assert_eq!(cfg.kafka_brokers, "kafka:9092");
        assert_eq!(cfg.topic, DEFAULT_TOPIC);
        assert_eq!(cfg.application_id, DEFAULT_APPLICATION_ID);
        assert_eq!(cfg.metrics_port, DEFAULT_METRICS_PORT);
        assert_eq!(cfg.push_gateway.as_str(), "http://pushgateway:9091/");
        assert!(cfg.push_timeout.is_none());
        assert!(cfg.push_on_event);
    }

    #[test]
    fn missing_broker_address_is_a_configuration_error() {
        let overrides = ConfigOverrides {
            push_gateway: Some("pushgateway:9091".into()),
            ..Default::default()
        };
        let err = ServiceConfig::resolve_from(env(&[]), overrides).unwrap_err();
        assert!(matches!(err, ExporterError::Configuration(ref m) if m.contains("kafka")));
    }

    #[test]
    fn missing_push_gateway_is_a_configuration_error() {
        let overrides = ConfigOverrides {
            kafka_brokers: Some("kafka:9092".into()),
            ..Default::default()
        };
        let err = ServiceConfig::resolve_from(env(&[]), overrides).unwrap_err();
        assert!(matches!(err, ExporterError::Configuration(ref m) if m.contains("push gateway")));
    }

    #[test]
    fn blank_required_value_is_rejected() {
        let overrides = ConfigOverrides {
            kafka_brokers: Some("   ".into()),
            push_gateway: Some("pushgateway:9091".into()),
            ..Default::default()
        };
        assert!(matches!(
            ServiceConfig::resolve_from(env(&[]), overrides),
            Err(ExporterError::Configuration(_))
        ));
    }

    #[test]
    fn environment_supplies_values() {
        let cfg = ServiceConfig::resolve_from(
            env(&[
                ("EXPORTER_KAFKA_BROKERS", "broker-a:9092,broker-b:9092"),
                ("EXPORTER_PUSH_GATEWAY", "https://push.example.com"),
                ("EXPORTER_TOPIC", "whisk-events"),
                ("EXPORTER_METRICS_PORT", "9100"),
                ("EXPORTER_PUSH_TIMEOUT_SECS", "5"),
                ("EXPORTER_PUSH_ON_EVENT", "false"),
            ]),
            ConfigOverrides::default(),
        )
        .unwrap();
        assert_eq!(cfg.kafka_brokers, "broker-a:9092,broker-b:9092");
        assert_eq!(cfg.push_gateway.as_str(), "https://push.example.com/");
        assert_eq!(cfg.topic, "whisk-events");
        assert_eq!(cfg.metrics_port, 9100);
        assert_eq!(cfg.push_timeout, Some(Duration::from_secs(5)));
        assert!(!cfg.push_on_event);
    }

    #[test]
    fn overrides_win_over_environment() {
        let overrides = ConfigOverrides {
            topic: Some("cli-topic".into()),
            application_id: Some("cli-app".into()),
            ..required_overrides()
        };
        let cfg = ServiceConfig::resolve_from(
            env(&[("EXPORTER_TOPIC", "env-topic"), ("EXPORTER_APPLICATION_ID", "env-app")]),
            overrides,
        )
        .unwrap();
        assert_eq!(cfg.topic, "cli-topic");
        assert_eq!(cfg.application_id, "cli-app");
    }

    #[test]
    fn push_gateway_without_host_is_rejected() {
        assert!(parse_push_gateway("http://").is_err());
        assert!(parse_push_gateway("   ").is_err());
        assert_eq!(
            parse_push_gateway("10.0.0.7:9091").unwrap().as_str(),
            "http://10.0.0.7:9091/"
        );
    }
}
