//! Consumes `order-events`, starting payment processing on `OrderCreated`.
//! The idempotency gate in `PaymentExecutor::create_payment_if_new` makes
//! redelivery of the same `OrderCreated` a no-op past the first delivery.

use std::sync::Arc;
use std::time::Duration;

use event_schema::DomainEvent;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::message::Message;
use tracing::{debug, error, info, warn};

use crate::service::PaymentExecutor;

pub struct OrderEventsConsumer {
    executor: Arc<PaymentExecutor>,
    brokers: String,
    group_id: String,
}

impl OrderEventsConsumer {
    pub fn new(executor: Arc<PaymentExecutor>, brokers: String) -> Self {
        Self {
            executor,
            brokers,
            group_id: "payment-service-group".to_string(),
        }
    }

    pub async fn run(self, shutdown: tokio_util::sync::CancellationToken) {
        if let Err(err) = self.run_inner(shutdown).await {
            error!(error = %err, "order-events consumer terminated");
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

        consumer.subscribe(&["order-events"])?;
        info!(group = %self.group_id, "order-events consumer subscribed");

        loop {
            tokio::select! {
                message = consumer.recv() => {
                    match message {
                        Ok(record) => {
                            let Some(payload) = record.payload() else {
                                debug!("received order-events message with empty payload");
                                continue;
                            };

                            if let Err(e) = self.handle_payload(payload).await {
                                warn!(error = %e, "failed to handle order event");
                            }

                            if let Err(commit_err) = consumer.commit_message(&record, CommitMode::Async) {
                                warn!(error = %commit_err, "failed to commit order-events offset");
                            }
                        }
                        Err(err) => {
                            error!(error = %err, "kafka error on order-events");
                            tokio::time::sleep(Duration::from_secs(1)).await;
                        }
                    }
                }
                _ = shutdown.cancelled() => {
                    info!("order-events consumer shutting down");
                    return Ok(());
                }
            }
        }
    }

    async fn handle_payload(&self, payload: &[u8]) -> anyhow::Result<()> {
        let event: DomainEvent = serde_json::from_slice(payload)?;
        match event {
            DomainEvent::OrderCreated(e) => {
                let payment = self
                    .executor
                    .create_payment_if_new(e.order_id, e.total_amount, &e.payment_method)
                    .await?;

                if payment.status == "PENDING" {
                    let executor = self.executor.clone();
                    let payment_id = payment.id;
                    tokio::spawn(async move {
                        executor.run_to_completion(payment_id).await;
                    });
                } else {
                    debug!(order_id = %e.order_id, status = %payment.status, "payment already initiated for order");
                }
            }
            other => {
                debug!(event_type = other.event_type(), "ignoring event not relevant to payment-service");
            }
        }
        Ok(())
    }
}
