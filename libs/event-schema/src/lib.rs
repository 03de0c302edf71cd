use chrono::{DateTime, Utc};
/// Event schema registry for the order-events and payment-events topics.
///
/// Each event carries a `schema_version` so consumers can detect
/// incompatible payloads as the schema evolves.
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current schema version for all events.
pub const SCHEMA_VERSION: u32 = 1;

/// Base envelope for every Kafka message published by this system, matching
/// the wire contract `{event_type, event_id (UUID v4), service_name,
/// service_version, timestamp, …payload}`: `event_type` and `timestamp` come
/// from the flattened `data` (a `DomainEvent` is already tagged by
/// `event_type` and carries its own `timestamp`), so the envelope itself
/// only adds the fields a consumer can't get from the payload alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope<T> {
    /// Unique event ID, used as the idempotency key by consumers.
    pub event_id: Uuid,
    /// Name of the service that produced the event.
    pub service_name: String,
    pub service_version: String,
    pub schema_version: u32,
    pub correlation_id: Option<Uuid>,
    #[serde(flatten)]
    pub data: T,
}

impl<T> EventEnvelope<T> {
    pub fn new(service_name: impl Into<String>, service_version: impl Into<String>, data: T) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            service_name: service_name.into(),
            service_version: service_version.into(),
            schema_version: SCHEMA_VERSION,
            correlation_id: None,
            data,
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }
}

/// A single line item as carried on `OrderCreated` (pizza id + quantity only;
/// the order service already resolved pricing before publishing).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItemSummary {
    #[serde(alias = "pizzaId")]
    pub pizza_id: Uuid,
    pub quantity: i32,
}

/// Published by order-service to `order-events` when an order is accepted.
///
/// Field names are snake_case going forward; `alias` keeps this service
/// tolerant of camelCase producers/consumers still running the original
/// naming during a rolling migration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderCreatedEvent {
    #[serde(alias = "orderId")]
    pub order_id: Uuid,
    #[serde(alias = "userId")]
    pub user_id: Uuid,
    #[serde(alias = "totalAmount")]
    pub total_amount: i64,
    /// Pre-formatted for direct substitution into notification templates
    /// (avoids embedding a Python-style `{total/100:.2f}` expression evaluator).
    pub total_formatted: String,
    #[serde(alias = "itemsCount")]
    pub items_count: i32,
    pub items: Vec<OrderItemSummary>,
    #[serde(alias = "paymentMethod")]
    pub payment_method: String,
    #[serde(alias = "deliveryAddress")]
    pub delivery_address: String,
    pub timestamp: DateTime<Utc>,
}

/// Published by order-service to `order-events` on any saga status transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderStatusChangedEvent {
    #[serde(alias = "orderId")]
    pub order_id: Uuid,
    #[serde(alias = "newStatus")]
    pub new_status: String,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

/// Published by payment-service to `payment-events` on successful payment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderPaidEvent {
    pub payment_id: Uuid,
    pub order_id: Uuid,
    pub amount: i64,
    pub amount_formatted: String,
    pub payment_method: String,
    pub timestamp: DateTime<Utc>,
}

/// Published by payment-service to `payment-events` when all retries are exhausted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentFailedEvent {
    pub payment_id: Uuid,
    pub order_id: Uuid,
    pub amount: i64,
    pub amount_formatted: String,
    pub payment_method: String,
    pub failure_reason: String,
    pub timestamp: DateTime<Utc>,
}

/// All domain events, internally tagged by `event_type` so the wire shape
/// matches `{"event_type": "OrderCreated", "order_id": ..., ...}` rather than
/// a nested `{"event_type": ..., "data": {...}}` representation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum DomainEvent {
    OrderCreated(OrderCreatedEvent),
    OrderStatusChanged(OrderStatusChangedEvent),
    OrderPaid(OrderPaidEvent),
    PaymentFailed(PaymentFailedEvent),
}

impl DomainEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            DomainEvent::OrderCreated(_) => "OrderCreated",
            DomainEvent::OrderStatusChanged(_) => "OrderStatusChanged",
            DomainEvent::OrderPaid(_) => "OrderPaid",
            DomainEvent::PaymentFailed(_) => "PaymentFailed",
        }
    }

    /// Topic an event of this type is routed to, per the fixed mapping.
    /// Anything not in the mapping defaults to `order-events` with a warning
    /// logged by the caller (the relay never invents a new topic name).
    pub fn topic(&self) -> &'static str {
        match self {
            DomainEvent::OrderCreated(_) | DomainEvent::OrderStatusChanged(_) => "order-events",
            DomainEvent::OrderPaid(_) | DomainEvent::PaymentFailed(_) => "payment-events",
        }
    }

    pub fn aggregate_id(&self) -> Uuid {
        match self {
            DomainEvent::OrderCreated(e) => e.order_id,
            DomainEvent::OrderStatusChanged(e) => e.order_id,
            DomainEvent::OrderPaid(e) => e.order_id,
            DomainEvent::PaymentFailed(e) => e.order_id,
        }
    }
}

pub fn is_compatible(current_version: u32, message_version: u32) -> bool {
    current_version == message_version
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_envelope_creation() {
        let event = OrderStatusChangedEvent {
            order_id: Uuid::new_v4(),
            new_status: "PAID".to_string(),
            reason: "Payment successful".to_string(),
            timestamp: Utc::now(),
        };

        let envelope = EventEnvelope::new("order-service", "0.1.0", event);
        assert_eq!(envelope.schema_version, SCHEMA_VERSION);
        assert_eq!(envelope.service_name, "order-service");
        assert_eq!(envelope.service_version, "0.1.0");
        assert!(envelope.correlation_id.is_none());
    }

    #[test]
    fn test_envelope_serializes_flat_with_event_type_and_envelope_fields() {
        let event = OrderStatusChangedEvent {
            order_id: Uuid::new_v4(),
            new_status: "PAID".to_string(),
            reason: "Payment successful".to_string(),
            timestamp: Utc::now(),
        };
        let envelope = EventEnvelope::new("order-service", "0.1.0", DomainEvent::OrderStatusChanged(event));
        let value = serde_json::to_value(&envelope).expect("envelope serializes");
        assert_eq!(value["event_type"], "OrderStatusChanged");
        assert_eq!(value["service_name"], "order-service");
        assert_eq!(value["service_version"], "0.1.0");
        assert!(value["event_id"].is_string());
        assert!(value["new_status"].is_string());
    }

    #[test]
    fn test_version_compatibility() {
        assert!(is_compatible(SCHEMA_VERSION, SCHEMA_VERSION));
        assert!(!is_compatible(1, 2));
    }

    #[test]
    fn test_domain_event_topic_routing() {
        let order_id = Uuid::new_v4();
        let paid = DomainEvent::OrderPaid(OrderPaidEvent {
            payment_id: Uuid::new_v4(),
            order_id,
            amount: 1198,
            amount_formatted: "11.98".to_string(),
            payment_method: "card".to_string(),
            timestamp: Utc::now(),
        });
        assert_eq!(paid.topic(), "payment-events");
        assert_eq!(paid.aggregate_id(), order_id);

        let created = DomainEvent::OrderCreated(OrderCreatedEvent {
            order_id,
            user_id: Uuid::new_v4(),
            total_amount: 1198,
            total_formatted: "11.98".to_string(),
            items_count: 1,
            items: vec![],
            payment_method: "card".to_string(),
            delivery_address: "123 Main St".to_string(),
            timestamp: Utc::now(),
        });
        assert_eq!(created.topic(), "order-events");
    }

    #[test]
    fn test_order_created_accepts_camel_case_alias() {
        let json = serde_json::json!({
            "event_type": "OrderCreated",
            "orderId": Uuid::new_v4(),
            "userId": Uuid::new_v4(),
            "totalAmount": 1198,
            "total_formatted": "11.98",
            "itemsCount": 1,
            "items": [],
            "paymentMethod": "card",
            "deliveryAddress": "123 Main St",
            "timestamp": Utc::now(),
        });
        let event: DomainEvent = serde_json::from_value(json).expect("camelCase payload parses");
        assert!(matches!(event, DomainEvent::OrderCreated(_)));
    }
}
