use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    Pending,
    Processing,
    Paid,
    Failed,
    Completed,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Processing => "PROCESSING",
            OrderStatus::Paid => "PAID",
            OrderStatus::Failed => "FAILED",
            OrderStatus::Completed => "COMPLETED",
        }
    }

    /// Sources from which a transition to `self` is legal:
    /// `PENDING -> PAID|FAILED`, `PAID -> COMPLETED`. This
    /// is stricter than the original Python's unconditional UPDATE, which the
    /// spec explicitly flags as a bug to fix rather than preserve.
    pub fn allowed_sources(&self) -> &'static [OrderStatus] {
        match self {
            OrderStatus::Paid => &[OrderStatus::Pending],
            OrderStatus::Failed => &[OrderStatus::Pending],
            OrderStatus::Completed => &[OrderStatus::Paid],
            OrderStatus::Pending | OrderStatus::Processing => &[],
        }
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(OrderStatus::Pending),
            "PROCESSING" => Ok(OrderStatus::Processing),
            "PAID" => Ok(OrderStatus::Paid),
            "FAILED" => Ok(OrderStatus::Failed),
            "COMPLETED" => Ok(OrderStatus::Completed),
            other => Err(format!("unknown order status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub status: String,
    pub total: i64,
    pub delivery_address: String,
    pub payment_method: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct OrderItem {
    pub id: i64,
    pub order_id: Uuid,
    pub pizza_id: Uuid,
    pub pizza_name: String,
    pub pizza_price: i64,
    pub quantity: i32,
    pub subtotal: i64,
}

#[derive(Debug, Serialize)]
pub struct OrderWithItems {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateOrderRequest {
    #[validate(length(min = 1, message = "order must contain at least one item"), nested)]
    pub items: Vec<OrderItemRequest>,
    pub user_id: Option<Uuid>,
    #[validate(length(min = 1))]
    pub delivery_address: String,
    #[validate(length(min = 1))]
    pub payment_method: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct OrderItemRequest {
    pub pizza_id: Uuid,
    #[serde(default = "default_quantity")]
    #[validate(range(min = 1, message = "quantity must be at least 1"))]
    pub quantity: i32,
}

fn default_quantity() -> i32 {
    1
}

#[derive(Debug, Deserialize)]
pub struct OrderListQuery {
    pub user_id: Option<Uuid>,
    pub status: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
    #[serde(default)]
    pub reason: String,
}

/// Pizza record as fetched from catalog-service, used only to compute the
/// order's snapshot items. Mirrors `catalog_service::models::Pizza`'s public
/// shape without depending on that crate.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogPizza {
    pub id: Uuid,
    pub name: String,
    pub price: i64,
    pub available: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paid_only_allowed_from_pending() {
        assert_eq!(OrderStatus::Paid.allowed_sources(), &[OrderStatus::Pending]);
    }

    #[test]
    fn completed_only_allowed_from_paid() {
        assert_eq!(
            OrderStatus::Completed.allowed_sources(),
            &[OrderStatus::Paid]
        );
    }

    #[test]
    fn pending_has_no_allowed_source_transitions_into_it() {
        assert!(OrderStatus::Pending.allowed_sources().is_empty());
    }

    #[test]
    fn create_order_request_rejects_zero_quantity_item() {
        let req = CreateOrderRequest {
            items: vec![OrderItemRequest {
                pizza_id: Uuid::new_v4(),
                quantity: 0,
            }],
            user_id: None,
            delivery_address: "123 Main St".to_string(),
            payment_method: "card".to_string(),
        };
        assert!(req.validate().is_err());
    }
}
