use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_host")]
    pub server_host: String,
    #[serde(default = "default_port")]
    pub server_port: u16,
    pub database_url: String,
    #[serde(default = "default_kafka_brokers")]
    pub kafka_bootstrap_servers: String,

    #[serde(default = "default_payment_mock_url")]
    pub payment_mock_url: String,
    #[serde(default = "default_payment_max_retries")]
    pub payment_max_retries: u32,
    #[serde(default = "default_payment_retry_delay")]
    pub payment_retry_delay: u64,
    #[serde(default = "default_payment_timeout")]
    pub payment_timeout: u64,

    #[serde(default = "default_cb_failure_threshold")]
    pub cb_failure_threshold: u32,
    #[serde(default = "default_cb_success_threshold")]
    pub cb_success_threshold: u32,
    #[serde(default = "default_cb_timeout")]
    pub cb_timeout: u64,

    #[serde(default = "default_processing_interval")]
    pub processing_interval: u64,
    #[serde(default = "default_batch_size")]
    pub batch_size: i64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
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
    8002
}

fn default_kafka_brokers() -> String {
    "localhost:9092".to_string()
}

fn default_payment_mock_url() -> String {
    "http://payment-mock:5003".to_string()
}

fn default_payment_max_retries() -> u32 {
    3
}

fn default_payment_retry_delay() -> u64 {
    2
}

fn default_payment_timeout() -> u64 {
    30
}

fn default_cb_failure_threshold() -> u32 {
    5
}

fn default_cb_success_threshold() -> u32 {
    3
}

fn default_cb_timeout() -> u64 {
    60
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
