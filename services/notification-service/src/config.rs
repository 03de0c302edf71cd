use serde::Deserialize;

/// Environment configuration, loaded once at startup via `envy::from_env`.
/// Environment variables mirror the REST/event surface each service exposes.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_host")]
    pub server_host: String,
    #[serde(default = "default_port")]
    pub server_port: u16,
    pub database_url: String,
    #[serde(default = "default_kafka_brokers")]
    pub kafka_bootstrap_servers: String,

    #[serde(default = "default_true")]
    pub email_enabled: bool,
    #[serde(default = "default_true")]
    pub sms_enabled: bool,
    #[serde(default = "default_true")]
    pub push_enabled: bool,
    #[serde(default)]
    pub webhook_enabled: bool,
    #[serde(default = "default_webhook_url")]
    pub webhook_url: String,

    /// Idempotent-consumer retention for `processed_events`, days.
    #[serde(default = "default_idempotency_retention_days")]
    pub idempotency_retention_days: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, envy::Error> {
        envy::from_env()
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8004
}

fn default_kafka_brokers() -> String {
    "localhost:9092".to_string()
}

fn default_true() -> bool {
    true
}

fn default_webhook_url() -> String {
    "http://localhost:9099/webhook".to_string()
}

fn default_idempotency_retention_days() -> u64 {
    7
}
