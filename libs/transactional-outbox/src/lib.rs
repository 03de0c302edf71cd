//! # Transactional Outbox Pattern Implementation
//!
//! Guarantees that an aggregate mutation and its domain event are committed
//! atomically: the caller writes both the aggregate row and an
//! `outbox_events` row inside one transaction, and a background
//! `OutboxProcessor` later publishes the row to Kafka and marks it
//! `processed`.
//!
//! ## Usage
//!
//! ```ignore
//! let mut tx = pool.begin().await?;
//! sqlx::query("UPDATE orders SET status = 'PAID' WHERE id = $1")
//!     .bind(order_id)
//!     .execute(&mut *tx)
//!     .await?;
//! repository.insert_in_tx(&mut tx, &event).await?;
//! tx.commit().await?;
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use event_schema::{DomainEvent, EventEnvelope};
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use sqlx::{PgPool, Postgres, Transaction};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub mod metrics;
pub use metrics::OutboxMetrics;

/// A row of `outbox_events`, matching the source schema's column names
/// (`event_data`, `processed`, `processed_at`) rather than a generic
/// "payload published_at" naming.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OutboxEvent {
    pub id: i64,
    pub aggregate_id: Uuid,
    pub event_type: String,
    pub event_data: serde_json::Value,
    pub processed: bool,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, thiserror::Error)]
pub enum OutboxError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("publish error: {0}")]
    Publish(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Persistence side of the pattern: insert rows inside the caller's
/// transaction, and let the processor read/mark them independently.
#[async_trait]
pub trait OutboxRepository: Send + Sync {
    async fn insert_in_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        event: &DomainEvent,
    ) -> Result<i64, OutboxError>;

    async fn get_unprocessed(&self, limit: i64) -> Result<Vec<OutboxEvent>, OutboxError>;

    async fn mark_processed(&self, id: i64) -> Result<(), OutboxError>;

    async fn pending_count(&self) -> Result<i64, OutboxError>;

    async fn oldest_pending_age_seconds(&self) -> Result<Option<i64>, OutboxError>;

    async fn cleanup_processed(&self, retention: Duration) -> Result<u64, OutboxError>;
}

/// `OutboxRepository` backed by a Postgres schema-qualified `outbox_events` table.
pub struct SqlxOutboxRepository {
    pool: PgPool,
    /// Schema the `outbox_events` table lives in, e.g. `"orders"` or `"payments"`.
    schema: String,
    /// Stamped into every envelope's `service_name` field.
    service_name: String,
    /// Stamped into every envelope's `service_version` field.
    service_version: String,
}

impl SqlxOutboxRepository {
    pub fn new(
        pool: PgPool,
        schema: impl Into<String>,
        service_name: impl Into<String>,
        service_version: impl Into<String>,
    ) -> Self {
        Self {
            pool,
            schema: schema.into(),
            service_name: service_name.into(),
            service_version: service_version.into(),
        }
    }

    fn table(&self) -> String {
        format!("{}.outbox_events", self.schema)
    }
}

#[async_trait]
impl OutboxRepository for SqlxOutboxRepository {
    async fn insert_in_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        event: &DomainEvent,
    ) -> Result<i64, OutboxError> {
        let envelope = EventEnvelope::new(self.service_name.clone(), self.service_version.clone(), event.clone());
        let event_data = serde_json::to_value(&envelope)?;
        let query = format!(
            "INSERT INTO {} (aggregate_id, event_type, event_data) VALUES ($1, $2, $3) RETURNING id",
            self.table()
        );
        let row: (i64,) = sqlx::query_as(&query)
            .bind(event.aggregate_id())
            .bind(event.event_type())
            .bind(event_data)
            .fetch_one(&mut **tx)
            .await?;
        Ok(row.0)
    }

    async fn get_unprocessed(&self, limit: i64) -> Result<Vec<OutboxEvent>, OutboxError> {
        let query = format!(
            "SELECT id, aggregate_id, event_type, event_data, processed, created_at, processed_at \
             FROM {} WHERE processed = false ORDER BY created_at ASC LIMIT $1",
            self.table()
        );
        let rows = sqlx::query_as(&query)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn mark_processed(&self, id: i64) -> Result<(), OutboxError> {
        let query = format!(
            "UPDATE {} SET processed = true, processed_at = now() WHERE id = $1",
            self.table()
        );
        sqlx::query(&query).bind(id).execute(&self.pool).await?;
        Ok(())
    }

    async fn pending_count(&self) -> Result<i64, OutboxError> {
        let query = format!("SELECT count(*) FROM {} WHERE processed = false", self.table());
        let (count,): (i64,) = sqlx::query_as(&query).fetch_one(&self.pool).await?;
        Ok(count)
    }

    async fn oldest_pending_age_seconds(&self) -> Result<Option<i64>, OutboxError> {
        let query = format!(
            "SELECT EXTRACT(EPOCH FROM (now() - min(created_at)))::bigint FROM {} WHERE processed = false",
            self.table()
        );
        let (age,): (Option<i64>,) = sqlx::query_as(&query).fetch_one(&self.pool).await?;
        Ok(age)
    }

    async fn cleanup_processed(&self, retention: Duration) -> Result<u64, OutboxError> {
        let query = format!(
            "DELETE FROM {} WHERE processed = true AND processed_at < now() - ($1 || ' seconds')::interval",
            self.table()
        );
        let result = sqlx::query(&query)
            .bind(retention.as_secs() as i64)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

/// Publishing side of the pattern.
#[async_trait]
pub trait OutboxPublisher: Send + Sync {
    async fn publish(&self, event: &OutboxEvent) -> Result<(), OutboxError>;
}

/// `OutboxPublisher` backed by `rdkafka`'s `FutureProducer`, configured for
/// durable writes (`acks=all`, idempotent producer) per the relay contract.
pub struct KafkaOutboxPublisher {
    producer: FutureProducer,
}

impl KafkaOutboxPublisher {
    pub fn new(brokers: &str) -> Result<Self, OutboxError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "10000")
            .set("acks", "all")
            .set("enable.idempotence", "true")
            .create()
            .map_err(|e| OutboxError::Publish(e.to_string()))?;
        Ok(Self { producer })
    }

    /// Fixed mapping table from spec §4.1: `Order*` → order-events,
    /// payment events → payment-events, anything unmapped defaults to
    /// order-events and is flagged.
    fn topic_for(event_type: &str) -> &'static str {
        match event_type {
            "OrderCreated" | "OrderStatusChanged" => "order-events",
            "OrderPaid" | "PaymentFailed" => "payment-events",
            other => {
                warn!(event_type = other, "unmapped event_type, defaulting to order-events");
                "order-events"
            }
        }
    }
}

#[async_trait]
impl OutboxPublisher for KafkaOutboxPublisher {
    async fn publish(&self, event: &OutboxEvent) -> Result<(), OutboxError> {
        let topic = Self::topic_for(&event.event_type);
        let payload = serde_json::to_vec(&event.event_data)?;
        let key = event.aggregate_id.to_string();
        // `event.id` is the outbox row's own Postgres sequence id, not the
        // envelope's UUID v4 `event_id`; pull the real one out of the body
        // the relay is about to publish.
        let event_id = event
            .event_data
            .get("event_id")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        let record = FutureRecord::to(topic)
            .key(&key)
            .payload(&payload)
            .headers(
                rdkafka::message::OwnedHeaders::new()
                    .insert(rdkafka::message::Header {
                        key: "event_type",
                        value: Some(event.event_type.as_str()),
                    })
                    .insert(rdkafka::message::Header {
                        key: "event_id",
                        value: Some(event_id.as_str()),
                    }),
            );

        self.producer
            .send(record, Duration::from_secs(10))
            .await
            .map_err(|(err, _)| OutboxError::Publish(err.to_string()))?;

        Ok(())
    }
}

/// Exponential backoff used between relay retries within a single poll:
/// `base=1s, x2, cap=30s`.
pub fn calculate_backoff(retry_count: u32) -> Duration {
    let secs = 2u64.saturating_pow(retry_count).min(30);
    Duration::from_secs(secs)
}

/// Background relay: polls `outbox_events`, publishes unprocessed rows, and
/// marks them processed. Owned and spawned by the producing service itself
/// (order-service, payment-service), not run as a separate binary.
pub struct OutboxProcessor<R: OutboxRepository, P: OutboxPublisher> {
    repository: R,
    publisher: P,
    batch_size: i64,
    poll_interval: Duration,
    max_retries: u32,
    metrics: Option<OutboxMetrics>,
}

impl<R: OutboxRepository, P: OutboxPublisher> OutboxProcessor<R, P> {
    pub fn new(repository: R, publisher: P) -> Self {
        Self {
            repository,
            publisher,
            batch_size: 10,
            poll_interval: Duration::from_secs(5),
            max_retries: 3,
            metrics: None,
        }
    }

    pub fn with_batch_size(mut self, batch_size: i64) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_metrics(mut self, metrics: OutboxMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Runs until `shutdown` is triggered, finishing the in-flight batch first.
    pub async fn run(&self, shutdown: tokio_util::sync::CancellationToken) {
        info!(poll_interval = ?self.poll_interval, batch_size = self.batch_size, "outbox processor starting");
        loop {
            if let Err(err) = self.process_batch().await {
                error!(error = %err, "outbox batch processing failed");
            }
            if let Some(metrics) = &self.metrics {
                metrics.refresh(&self.repository).await;
            }
            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                _ = shutdown.cancelled() => {
                    info!("outbox processor shutting down");
                    break;
                }
            }
        }
    }

    async fn process_batch(&self) -> Result<(), OutboxError> {
        let rows = self.repository.get_unprocessed(self.batch_size).await?;
        for row in rows {
            self.process_row(row).await;
        }
        Ok(())
    }

    async fn process_row(&self, row: OutboxEvent) {
        let mut attempt = 0u32;
        loop {
            match self.publisher.publish(&row).await {
                Ok(()) => {
                    if let Err(err) = self.repository.mark_processed(row.id).await {
                        error!(id = row.id, error = %err, "failed to mark outbox row processed");
                    } else {
                        debug!(id = row.id, event_type = %row.event_type, "outbox row published");
                        if let Some(metrics) = &self.metrics {
                            metrics.published.inc();
                        }
                    }
                    return;
                }
                Err(err) => {
                    attempt += 1;
                    if attempt > self.max_retries {
                        warn!(id = row.id, attempts = attempt, error = %err, "outbox row exhausted retries, leaving unprocessed for next poll");
                        return;
                    }
                    let backoff = calculate_backoff(attempt - 1);
                    warn!(id = row.id, attempt, ?backoff, error = %err, "outbox publish failed, retrying");
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        assert_eq!(calculate_backoff(0), Duration::from_secs(1));
        assert_eq!(calculate_backoff(1), Duration::from_secs(2));
        assert_eq!(calculate_backoff(2), Duration::from_secs(4));
        assert_eq!(calculate_backoff(5), Duration::from_secs(30)); // capped
        assert_eq!(calculate_backoff(20), Duration::from_secs(30));
    }

    #[test]
    fn test_topic_mapping() {
        assert_eq!(KafkaOutboxPublisher::topic_for("OrderCreated"), "order-events");
        assert_eq!(KafkaOutboxPublisher::topic_for("OrderStatusChanged"), "order-events");
        assert_eq!(KafkaOutboxPublisher::topic_for("OrderPaid"), "payment-events");
        assert_eq!(KafkaOutboxPublisher::topic_for("PaymentFailed"), "payment-events");
        assert_eq!(KafkaOutboxPublisher::topic_for("SomethingElse"), "order-events");
    }
}
