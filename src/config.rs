use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::integration::ResilienceConfig;
use crate::utils::{CircuitBreakerConfig, RetryConfig};

// ============================================================================
// Configuration
// ============================================================================
//
// Everything is read from the environment with defaults suitable for running
// the whole system in one process (`SERVICE_ROLE=standalone`).
//
// ============================================================================

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("{key} has invalid value {value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Which part of the system this process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceRole {
    /// Composite service and both backends in one process
    Standalone,
    Composite,
    Organization,
    Member,
}

impl FromStr for ServiceRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "standalone" => Ok(ServiceRole::Standalone),
            "composite" => Ok(ServiceRole::Composite),
            "organization" => Ok(ServiceRole::Organization),
            "member" => Ok(ServiceRole::Member),
            _ => Err("expected standalone, composite, organization or member".to_string()),
        }
    }
}

/// Transport for create/delete events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusType {
    /// Queued in-process channels, drained by forwarder tasks
    InMemory,
    /// In-process hand-off that waits for the backend to apply the event
    Direct,
    Kafka,
}

impl FromStr for BusType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "inmemory" => Ok(BusType::InMemory),
            "direct" => Ok(BusType::Direct),
            "kafka" => Ok(BusType::Kafka),
            _ => Err("expected inmemory, direct or kafka".to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct KafkaConfig {
    pub brokers: String,
    pub organization_topic: String,
    pub member_topic: String,
    pub consumer_group: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub role: ServiceRole,
    pub bus: BusType,
    pub kafka: KafkaConfig,

    pub host: String,
    /// Host name stamped into `originAddress` / `serviceAddresses`
    pub advertised_host: String,
    pub composite_port: u16,
    pub organization_port: u16,
    pub member_port: u16,
    pub metrics_port: u16,
    pub http_workers: usize,

    pub organization_url: String,
    pub member_url: String,
    pub organization_timeout: Duration,
    pub member_timeout: Duration,

    pub resilience: ResilienceConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &'static str, default: &str| -> String {
            lookup(key).unwrap_or_else(|| default.to_string())
        };

        let role = parse(&lookup, "SERVICE_ROLE", ServiceRole::Standalone)?;
        let bus = parse(&lookup, "BUS_TYPE", BusType::InMemory)?;

        if role != ServiceRole::Standalone && bus != BusType::Kafka {
            return Err(ConfigError::Invalid {
                key: "BUS_TYPE",
                value: get("BUS_TYPE", "inmemory"),
                reason: "only kafka can carry events between separate processes".to_string(),
            });
        }

        let organization_port = parse(&lookup, "ORGANIZATION_PORT", 7002)?;
        let member_port = parse(&lookup, "MEMBER_PORT", 7003)?;

        let retry = RetryConfig {
            max_attempts: parse(&lookup, "RETRY_MAX_ATTEMPTS", 3)?,
            initial_delay: Duration::from_millis(parse(&lookup, "RETRY_INITIAL_BACKOFF_MS", 500)?),
            max_delay: Duration::from_millis(parse(&lookup, "RETRY_MAX_BACKOFF_MS", 2000)?),
            multiplier: parse(&lookup, "RETRY_MULTIPLIER", 2.0)?,
        };

        let breaker = CircuitBreakerConfig {
            failure_threshold: parse(&lookup, "BREAKER_FAILURE_THRESHOLD", 5)?,
            rolling_window: Duration::from_secs(parse(&lookup, "BREAKER_WINDOW_SECS", 30)?),
            open_duration: Duration::from_secs(parse(&lookup, "BREAKER_OPEN_SECS", 10)?),
            success_threshold: parse(&lookup, "BREAKER_SUCCESS_THRESHOLD", 1)?,
        };

        if retry.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                key: "RETRY_MAX_ATTEMPTS",
                value: "0".to_string(),
                reason: "at least one attempt is required".to_string(),
            });
        }

        Ok(Self {
            role,
            bus,
            kafka: KafkaConfig {
                brokers: get("KAFKA_BROKERS", "localhost:9092"),
                organization_topic: get("ORGANIZATION_TOPIC", "organizations"),
                member_topic: get("MEMBER_TOPIC", "members"),
                consumer_group: get("KAFKA_CONSUMER_GROUP", "university-composite"),
            },
            host: get("HOST", "0.0.0.0"),
            advertised_host: get("ADVERTISED_HOST", "localhost"),
            composite_port: parse(&lookup, "COMPOSITE_PORT", 7000)?,
            organization_port,
            member_port,
            metrics_port: parse(&lookup, "METRICS_PORT", 9090)?,
            http_workers: parse(&lookup, "HTTP_WORKERS", 2)?,
            organization_url: get(
                "ORGANIZATION_URL",
                &format!("http://localhost:{}", organization_port),
            ),
            member_url: get("MEMBER_URL", &format!("http://localhost:{}", member_port)),
            organization_timeout: Duration::from_secs(parse(
                &lookup,
                "ORGANIZATION_TIMEOUT_SECS",
                2,
            )?),
            member_timeout: Duration::from_secs(parse(&lookup, "MEMBER_TIMEOUT_SECS", 2)?),
            resilience: ResilienceConfig {
                retry,
                breaker,
                deadline: Duration::from_secs(parse(&lookup, "READ_DEADLINE_SECS", 5)?),
            },
        })
    }

    pub fn address(&self, port: u16) -> String {
        format!("{}:{}", self.advertised_host, port)
    }
}

fn parse<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(value) => match value.trim().parse::<T>() {
            Ok(parsed) => Ok(parsed),
            Err(e) => Err(ConfigError::Invalid {
                key,
                reason: e.to_string(),
                value,
            }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]).unwrap();

        assert_eq!(config.role, ServiceRole::Standalone);
        assert_eq!(config.bus, BusType::InMemory);
        assert_eq!(config.composite_port, 7000);
        assert_eq!(config.organization_url, "http://localhost:7002");
        assert_eq!(config.organization_timeout, Duration::from_secs(2));
        assert_eq!(config.resilience.retry.max_attempts, 3);
        assert_eq!(config.resilience.breaker.success_threshold, 1);
        assert_eq!(config.address(7000), "localhost:7000");
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("SERVICE_ROLE", "Composite"),
            ("BUS_TYPE", "kafka"),
            ("KAFKA_BROKERS", "redpanda:9092"),
            ("MEMBER_PORT", "8003"),
            ("BREAKER_OPEN_SECS", "3"),
        ])
        .unwrap();

        assert_eq!(config.role, ServiceRole::Composite);
        assert_eq!(config.bus, BusType::Kafka);
        assert_eq!(config.kafka.brokers, "redpanda:9092");
        assert_eq!(config.member_url, "http://localhost:8003");
        assert_eq!(config.resilience.breaker.open_duration, Duration::from_secs(3));
    }

    #[test]
    fn test_invalid_values_are_reported() {
        let err = config(&[("COMPOSITE_PORT", "seventy")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "COMPOSITE_PORT", .. }));

        let err = config(&[("BUS_TYPE", "carrier-pigeon")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "BUS_TYPE", .. }));

        let err = config(&[("RETRY_MAX_ATTEMPTS", "0")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "RETRY_MAX_ATTEMPTS", .. }));
    }

    #[test]
    fn test_split_roles_need_kafka() {
        let err = config(&[("SERVICE_ROLE", "member")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "BUS_TYPE", .. }));

        assert!(config(&[("SERVICE_ROLE", "member"), ("BUS_TYPE", "kafka")]).is_ok());
    }
}
