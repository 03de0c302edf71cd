//! Consumes `payment-events` to drive the order's saga state forward:
//! `OrderPaid` -> `PAID`, `PaymentFailed` -> `FAILED`. At-least-once; the
//! guarded status transition in `OrderService::update_status` makes
//! redelivery a no-op once the order has already moved past `PENDING`.

use std::time::Duration;

use event_schema::DomainEvent;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::message::Message;
use tracing::{debug, error, info, warn};

use crate::models::OrderStatus;
use crate::service::OrderService;

pub struct PaymentEventsConsumer {
    service: std::sync::Arc<OrderService>,
    brokers: String,
    group_id: String,
}

impl PaymentEventsConsumer {
    pub fn new(service: std::sync::Arc<OrderService>, brokers: String) -> Self {
        Self {
            service,
            brokers,
            group_id: "order-service-group".to_string(),
        }
    }

    pub async fn run(self, shutdown: tokio_util::sync::CancellationToken) {
        if let Err(err) = self.run_inner(shutdown).await {
            error!(error = %err, "payment-events consumer terminated");
        }
    }

    async fn run_inner(&self, shutdown: tokio_util::sync::CancellationToken) -> Result<(), KafkaError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &self.brokers)
            .set("group.id", &self.group_id)
            .set("enable.auto.commit", "true")
            .set("auto.offset.reset", "earliest")
            .set("enable.partition.eof", "false")
            .set("session.timeout.ms", "45000")
            .set("max.poll.interval.ms", "300000")
            .create()?;

        consumer.subscribe(&["payment-events"])?;
        info!(group = %self.group_id, "payment-events consumer subscribed");

        loop {
            tokio::select! {
                message = consumer.recv() => {
                    match message {
                        Ok(record) => {
                            let Some(payload) = record.payload() else {
                                debug!("received payment-events message with empty payload");
                                continue;
                            };

                            if let Err(e) = self.handle_payload(payload).await {
                                warn!(error = %e, "failed to handle payment event");
                            }

                            if let Err(commit_err) = consumer.commit_message(&record, CommitMode::Async) {
                                warn!(error = %commit_err, "failed to commit payment-events offset");
                            }
                        }
                        Err(err) => {
                            error!(error = %err, "kafka error on payment-events");
                            tokio::time::sleep(Duration::from_secs(1)).await;
                        }
                    }
                }
                _ = shutdown.cancelled() => {
                    info!("payment-events consumer shutting down");
                    return Ok(());
                }
            }
        }
    }

    async fn handle_payload(&self, payload: &[u8]) -> anyhow::Result<()> {
        let event: DomainEvent = serde_json::from_slice(payload)?;
        match event {
            DomainEvent::OrderPaid(e) => {
                let applied = self
                    .service
                    .update_status(e.order_id, OrderStatus::Paid, "payment succeeded")
                    .await?;
                if applied {
                    self.service.record_saga_step(e.order_id, "paid", false).await;
                }
            }
            DomainEvent::PaymentFailed(e) => {
                let applied = self
                    .service
                    .update_status(e.order_id, OrderStatus::Failed, &e.failure_reason)
                    .await?;
                if applied {
                    self.service.record_saga_step(e.order_id, "failed", true).await;
                }
            }
            other => {
                debug!(event_type = other.event_type(), "ignoring event not relevant to order-service");
            }
        }
        Ok(())
    }
}
