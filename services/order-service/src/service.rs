use std::str::FromStr;

use error_handling::ServiceError;
use event_schema::{DomainEvent, OrderCreatedEvent, OrderItemSummary, OrderStatusChangedEvent};
use sqlx::PgPool;
use transactional_outbox::{OutboxRepository, SqlxOutboxRepository};
use uuid::Uuid;

use crate::models::{CatalogPizza, CreateOrderRequest, Order, OrderItem, OrderStatus};

/// Order aggregate operations. Owns the `orders` schema exclusively; no other
/// service is allowed to touch it directly.
pub struct OrderService {
    pool: PgPool,
    outbox: SqlxOutboxRepository,
    http_client: reqwest::Client,
    catalog_service_url: String,
}

impl OrderService {
    pub fn new(pool: PgPool, catalog_service_url: String) -> Self {
        let outbox = SqlxOutboxRepository::new(
            pool.clone(),
            "orders",
            "order-service",
            env!("CARGO_PKG_VERSION"),
        );
        Self {
            pool,
            outbox,
            http_client: reqwest::Client::new(),
            catalog_service_url,
        }
    }

    /// Resolves each requested pizza against catalog-service, rejecting
    /// unknown or unavailable ids.
    pub async fn resolve_pizzas(
        &self,
        items: &[crate::models::OrderItemRequest],
    ) -> Result<Vec<CatalogPizza>, ServiceError> {
        let mut resolved = Vec::with_capacity(items.len());
        for item in items {
            let url = format!("{}/api/v1/menu/{}", self.catalog_service_url, item.pizza_id);
            let response = self.http_client.get(&url).send().await.map_err(|e| {
                tracing::error!(error = %e, pizza_id = %item.pizza_id, "catalog-service unreachable");
                ServiceError::ServiceUnavailable
            })?;

            if response.status() == reqwest::StatusCode::NOT_FOUND {
                return Err(ServiceError::ValidationError(format!(
                    "pizza not found: {}",
                    item.pizza_id
                )));
            }
            if !response.status().is_success() {
                return Err(ServiceError::InternalError(format!(
                    "catalog-service returned {}",
                    response.status()
                )));
            }

            #[derive(serde::Deserialize)]
            struct PizzaResponse {
                pizza: CatalogPizza,
            }
            let body: PizzaResponse = response
                .json()
                .await
                .map_err(|e| ServiceError::InternalError(format!("invalid catalog response: {e}")))?;

            if !body.pizza.available {
                return Err(ServiceError::ValidationError(format!(
                    "pizza not available: {}",
                    item.pizza_id
                )));
            }

            resolved.push(body.pizza);
        }
        Ok(resolved)
    }

    /// Creates the order, its items, and the `OrderCreated` outbox row in a
    /// single transaction.
    pub async fn create_order_with_outbox(
        &self,
        req: &CreateOrderRequest,
        pizzas: &[CatalogPizza],
    ) -> Result<Order, ServiceError> {
        let user_id = req.user_id.unwrap_or_else(Uuid::new_v4);

        let mut subtotal_items = Vec::with_capacity(req.items.len());
        let mut total: i64 = 0;
        for item in &req.items {
            let pizza = pizzas
                .iter()
                .find(|p| p.id == item.pizza_id)
                .ok_or_else(|| ServiceError::ValidationError(format!("pizza not found: {}", item.pizza_id)))?;
            let subtotal = pizza.price * item.quantity as i64;
            total += subtotal;
            subtotal_items.push((pizza.clone(), item.quantity, subtotal));
        }

        let mut tx = self.pool.begin().await?;

        let order: Order = sqlx::query_as(
            "INSERT INTO orders.orders (user_id, status, total, delivery_address, payment_method) \
             VALUES ($1, 'PENDING', $2, $3, $4) RETURNING *",
        )
        .bind(user_id)
        .bind(total)
        .bind(&req.delivery_address)
        .bind(&req.payment_method)
        .fetch_one(&mut *tx)
        .await?;

        for (pizza, quantity, subtotal) in &subtotal_items {
            sqlx::query(
                "INSERT INTO orders.order_items (order_id, pizza_id, pizza_name, pizza_price, quantity, subtotal) \
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(order.id)
            .bind(pizza.id)
            .bind(&pizza.name)
            .bind(pizza.price)
            .bind(*quantity)
            .bind(*subtotal)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            "INSERT INTO orders.order_saga_state (order_id, current_step) VALUES ($1, 'created') \
             ON CONFLICT (order_id) DO NOTHING",
        )
        .bind(order.id)
        .execute(&mut *tx)
        .await?;

        let total_formatted = format_minor_units(total);
        let event = DomainEvent::OrderCreated(OrderCreatedEvent {
            order_id: order.id,
            user_id,
            total_amount: total,
            total_formatted,
            items_count: req.items.len() as i32,
            items: req
                .items
                .iter()
                .map(|i| OrderItemSummary {
                    pizza_id: i.pizza_id,
                    quantity: i.quantity,
                })
                .collect(),
            payment_method: req.payment_method.clone(),
            delivery_address: req.delivery_address.clone(),
            timestamp: chrono::Utc::now(),
        });
        self.outbox.insert_in_tx(&mut tx, &event).await?;

        tx.commit().await?;
        Ok(order)
    }

    pub async fn get_order(&self, order_id: Uuid) -> Result<Option<Order>, ServiceError> {
        let order = sqlx::query_as("SELECT * FROM orders.orders WHERE id = $1")
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(order)
    }

    pub async fn get_order_items(&self, order_id: Uuid) -> Result<Vec<OrderItem>, ServiceError> {
        let items = sqlx::query_as("SELECT * FROM orders.order_items WHERE order_id = $1 ORDER BY id")
            .bind(order_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(items)
    }

    pub async fn list_orders(
        &self,
        user_id: Option<Uuid>,
        status: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Order>, ServiceError> {
        let orders = sqlx::query_as(
            "SELECT * FROM orders.orders \
             WHERE ($1::uuid IS NULL OR user_id = $1) \
               AND ($2::varchar IS NULL OR status = $2) \
             ORDER BY created_at DESC LIMIT $3 OFFSET $4",
        )
        .bind(user_id)
        .bind(status)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(orders)
    }

    /// Guarded status transition: `UPDATE ... WHERE id = $1 AND status = ANY(allowed_sources)`.
    /// Returns `true` if the transition was applied, `false` if it was
    /// rejected because the order's current status did not permit it
    /// Illegal transitions are rejected silently and logged, not treated as errors.
    pub async fn update_status(
        &self,
        order_id: Uuid,
        new_status: OrderStatus,
        reason: &str,
    ) -> Result<bool, ServiceError> {
        let allowed_sources: Vec<&'static str> = new_status
            .allowed_sources()
            .iter()
            .map(|s| s.as_str())
            .collect();
        if allowed_sources.is_empty() {
            tracing::warn!(order_id = %order_id, new_status = new_status.as_str(), "no allowed source status for this transition, rejecting");
            return Ok(false);
        }

        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "UPDATE orders.orders SET status = $1, updated_at = now() \
             WHERE id = $2 AND status = ANY($3)",
        )
        .bind(new_status.as_str())
        .bind(order_id)
        .bind(&allowed_sources)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tracing::warn!(
                order_id = %order_id,
                new_status = new_status.as_str(),
                "rejected illegal status transition (current status not in allowed sources)"
            );
            tx.rollback().await?;
            return Ok(false);
        }

        let event = DomainEvent::OrderStatusChanged(OrderStatusChangedEvent {
            order_id,
            new_status: new_status.as_str().to_string(),
            reason: reason.to_string(),
            timestamp: chrono::Utc::now(),
        });
        self.outbox.insert_in_tx(&mut tx, &event).await?;

        tx.commit().await?;
        tracing::info!(order_id = %order_id, new_status = new_status.as_str(), "order status updated");
        Ok(true)
    }

    /// Best-effort saga audit update; `orders.status` remains authoritative
    /// even if this write fails.
    pub async fn record_saga_step(&self, order_id: Uuid, step: &str, compensation_needed: bool) {
        let result = sqlx::query(
            "UPDATE orders.order_saga_state \
             SET current_step = $1, \
                 steps_completed = array_append(steps_completed, $1), \
                 compensation_needed = $2, \
                 updated_at = now() \
             WHERE order_id = $3",
        )
        .bind(step)
        .bind(compensation_needed)
        .bind(order_id)
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            tracing::warn!(order_id = %order_id, error = %e, "failed to record saga step (non-fatal)");
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Public REST endpoint requires a status string; resolve and validate it.
pub fn parse_requested_status(s: &str) -> Result<OrderStatus, ServiceError> {
    OrderStatus::from_str(s).map_err(ServiceError::ValidationError)
}

/// `{total/100:.2f}`-equivalent precomputed at the producer boundary
/// Avoids embedding a Python-style `{total/100:.2f}` expression evaluator
/// by precomputing the formatted string at the producer boundary.
pub fn format_minor_units(amount: i64) -> String {
    format!("{}.{:02}", amount / 100, amount.abs() % 100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_minor_units_as_fixed_decimal() {
        assert_eq!(format_minor_units(119800), "1198.00");
        assert_eq!(format_minor_units(5), "0.05");
        assert_eq!(format_minor_units(0), "0.00");
    }

    #[test]
    fn parses_known_status_strings() {
        assert_eq!(parse_requested_status("PAID").unwrap(), OrderStatus::Paid);
        assert!(parse_requested_status("BOGUS").is_err());
    }
}
