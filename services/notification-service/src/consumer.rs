//! Consumes both `order-events` and `payment-events` under a single group
//! so every saga milestone (`OrderCreated`, `OrderPaid`, `PaymentFailed`)
//! reaches the template dispatcher. `OrderStatusChanged` has no registered
//! template and is ignored here rather than in `NotificationService`.
//!
//! Unlike order-service/payment-service, redelivery here is not naturally
//! absorbed by a guarded UPDATE, so each event is additionally wrapped in
//! `IdempotencyGuard::process_if_new` keyed on `event_type:aggregate_id` -
//! a replayed `OrderPaid` for an order must not create a second notification.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use event_schema::DomainEvent;
use idempotent_consumer::{IdempotencyGuard, ProcessingResult};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::message::Message;
use tracing::{debug, error, info, warn};

use crate::service::NotificationService;

pub struct NotificationEventsConsumer {
    service: Arc<NotificationService>,
    idempotency: Arc<IdempotencyGuard>,
    brokers: String,
    group_id: String,
}

impl NotificationEventsConsumer {
    pub fn new(service: Arc<NotificationService>, idempotency: Arc<IdempotencyGuard>, brokers: String) -> Self {
        Self {
            service,
            idempotency,
            brokers,
            group_id: "notification-service-group".to_string(),
        }
    }

    pub async fn run(self, shutdown: tokio_util::sync::CancellationToken) {
        if let Err(err) = self.run_inner(shutdown).await {
            error!(error = %err, "notification events consumer terminated");
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

        consumer.subscribe(&["order-events", "payment-events"])?;
        info!(group = %self.group_id, "order-events/payment-events consumer subscribed");

        loop {
            tokio::select! {
                message = consumer.recv() => {
                    match message {
                        Ok(record) => {
                            let Some(payload) = record.payload() else {
                                debug!("received event with empty payload");
                                continue;
                            };

                            if let Err(e) = self.handle_payload(payload).await {
                                warn!(error = %e, "failed to handle event for notification dispatch");
                            }

                            if let Err(commit_err) = consumer.commit_message(&record, CommitMode::Async) {
                                warn!(error = %commit_err, "failed to commit notification consumer offset");
                            }
                        }
                        Err(err) => {
                            error!(error = %err, "kafka error on notification consumer");
                            tokio::time::sleep(Duration::from_secs(1)).await;
                        }
                    }
                }
                _ = shutdown.cancelled() => {
                    info!("notification events consumer shutting down");
                    return Ok(());
                }
            }
        }
    }

    async fn handle_payload(&self, payload: &[u8]) -> anyhow::Result<()> {
        let event: DomainEvent = serde_json::from_slice(payload)?;

        let event_type = event.event_type();
        if !matches!(
            event,
            DomainEvent::OrderCreated(_) | DomainEvent::OrderPaid(_) | DomainEvent::PaymentFailed(_)
        ) {
            debug!(event_type, "no notification template for this event, skipping");
            return Ok(());
        }

        let idempotency_key = format!("{event_type}:{}", event.aggregate_id());
        let service = self.service.clone();

        let result = self
            .idempotency
            .process_if_new(&idempotency_key, move || async move {
                dispatch_for_event(&service, event).await
            })
            .await?;

        match result {
            ProcessingResult::Success => {}
            ProcessingResult::AlreadyProcessed => {
                debug!(idempotency_key, "event already processed, no duplicate notification created");
            }
            ProcessingResult::Failed(reason) => {
                warn!(idempotency_key, reason, "notification dispatch failed");
            }
        }
        Ok(())
    }
}

async fn dispatch_for_event(service: &NotificationService, event: DomainEvent) -> Result<(), anyhow::Error> {
    let (event_type, user_id, order_id, context) = match &event {
        DomainEvent::OrderCreated(e) => {
            let mut ctx = HashMap::new();
            ctx.insert("order_id", e.order_id.to_string());
            ctx.insert("total_formatted", e.total_formatted.clone());
            ("OrderCreated", Some(e.user_id), Some(e.order_id), ctx)
        }
        DomainEvent::OrderPaid(e) => {
            let mut ctx = HashMap::new();
            ctx.insert("order_id", e.order_id.to_string());
            ctx.insert("amount_formatted", e.amount_formatted.clone());
            ("OrderPaid", None, Some(e.order_id), ctx)
        }
        DomainEvent::PaymentFailed(e) => {
            let mut ctx = HashMap::new();
            ctx.insert("order_id", e.order_id.to_string());
            ctx.insert("failure_reason", e.failure_reason.clone());
            ("PaymentFailed", None, Some(e.order_id), ctx)
        }
        _ => unreachable!("caller filters to templated event types"),
    };

    let notification = service
        .create_from_event(event_type, user_id, order_id, &context, None, "normal")
        .await?;

    if let Some(notification) = notification {
        service.dispatch(&notification).await;
    }
    Ok(())
}
