use serde::Deserialize;

/// Environment configuration, loaded once at startup via `envy::from_env`.
/// Environment variables mirror the REST/event surface this service exposes.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_host")]
    pub server_host: String,
    #[serde(default = "default_port")]
    pub server_port: u16,
    pub database_url: String,
    #[serde(default = "default_kafka_brokers")]
    pub kafka_bootstrap_servers: String,
    #[serde(default = "default_catalog_url")]
    pub catalog_service_url: String,

    /// Outbox relay poll interval, seconds.
    #[serde(default = "default_processing_interval")]
    pub processing_interval: u64,
    /// Outbox relay batch size.
    #[serde(default = "default_batch_size")]
    pub batch_size: i64,
    /// Outbox relay publish retries per row before leaving it unprocessed.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Outbox GC retention for processed rows, hours.
    #[serde(default = "default_outbox_retention_hours")]
    pub outbox_retention_hours: u64,
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
    8001
}

fn default_kafka_brokers() -> String {
    "localhost:9092".to_string()
}

fn default_catalog_url() -> String {
    "http://localhost:8003".to_string()
}

fn default_processing_interval() -> u64 {
    5
}

fn default_batch_size() -> i64 {
    10
}

fn default_max_retries() -> u32 {
    3
}

fn default_outbox_retention_hours() -> u64 {
    24
}
