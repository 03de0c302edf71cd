use actix_web::{web, HttpResponse};
use error_handling::ServiceError;
use validator::Validate;

use crate::models::{CreateOrderRequest, OrderListQuery, OrderWithItems, UpdateStatusRequest};
use crate::service::{self, OrderService};

pub fn register_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/api/v1/orders", web::post().to(create_order))
        .route("/api/v1/orders", web::get().to(list_orders))
        .route("/api/v1/orders/{order_id}", web::get().to(get_order))
        .route("/api/v1/orders/{order_id}/status", web::put().to(update_status));
}

async fn create_order(
    service: web::Data<OrderService>,
    payload: web::Json<CreateOrderRequest>,
) -> Result<HttpResponse, ServiceError> {
    payload.validate()?;

    let pizzas = service.resolve_pizzas(&payload.items).await?;
    let order = service.create_order_with_outbox(&payload, &pizzas).await?;

    tracing::info!(order_id = %order.id, "order created");
    Ok(HttpResponse::Accepted().json(serde_json::json!({
        "success": true,
        "orderId": order.id,
        "status": order.status,
        "total": order.total,
    })))
}

async fn get_order(
    service: web::Data<OrderService>,
    path: web::Path<uuid::Uuid>,
) -> Result<HttpResponse, ServiceError> {
    let order_id = path.into_inner();
    let order = service
        .get_order(order_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("order not found: {order_id}")))?;
    let items = service.get_order_items(order_id).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "order": OrderWithItems { order, items },
    })))
}

async fn list_orders(
    service: web::Data<OrderService>,
    query: web::Query<OrderListQuery>,
) -> Result<HttpResponse, ServiceError> {
    let orders = service
        .list_orders(query.user_id, query.status.as_deref(), query.limit, query.offset)
        .await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "orders": orders,
        "count": orders.len(),
    })))
}

async fn update_status(
    service: web::Data<OrderService>,
    path: web::Path<uuid::Uuid>,
    payload: web::Json<UpdateStatusRequest>,
) -> Result<HttpResponse, ServiceError> {
    let order_id = path.into_inner();
    let new_status = service::parse_requested_status(&payload.status)?;

    let applied = service.update_status(order_id, new_status, &payload.reason).await?;
    if !applied {
        return Err(ServiceError::Conflict(format!(
            "cannot transition order {order_id} to {}",
            new_status.as_str()
        )));
    }

    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    #[test]
    fn create_order_request_rejects_empty_items() {
        let req = CreateOrderRequest {
            items: vec![],
            user_id: None,
            delivery_address: "123 Main St".to_string(),
            payment_method: "card".to_string(),
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn create_order_request_rejects_blank_address() {
        let req = CreateOrderRequest {
            items: vec![crate::models::OrderItemRequest {
                pizza_id: uuid::Uuid::new_v4(),
                quantity: 1,
            }],
            user_id: None,
            delivery_address: "".to_string(),
            payment_method: "card".to_string(),
        };
        assert!(req.validate().is_err());
    }
}
