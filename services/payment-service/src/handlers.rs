use std::sync::Arc;

use actix_web::{web, HttpResponse};
use error_handling::ServiceError;
use validator::Validate;

use crate::models::ProcessPaymentRequest;
use crate::service::PaymentExecutor;

pub fn register_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/api/v1/payments", web::post().to(process_payment))
        .route("/api/v1/payments/{payment_id}", web::get().to(get_payment))
        .route("/api/v1/payments/order/{order_id}", web::get().to(get_payment_by_order))
        .route(
            "/api/v1/payments/circuit-breaker/status",
            web::get().to(circuit_breaker_status),
        );
}

async fn process_payment(
    executor: web::Data<Arc<PaymentExecutor>>,
    payload: web::Json<ProcessPaymentRequest>,
) -> Result<HttpResponse, ServiceError> {
    payload.validate()?;

    if let Some(existing) = executor.get_payment_by_order_id(payload.order_id).await? {
        return Ok(HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "paymentId": existing.id,
            "status": existing.status,
            "message": "Payment already processed",
        })));
    }

    let payment = executor
        .create_payment_if_new(payload.order_id, payload.amount, &payload.payment_method)
        .await?;

    let executor = executor.get_ref().clone();
    let payment_id = payment.id;
    tokio::spawn(async move {
        executor.run_to_completion(payment_id).await;
    });

    tracing::info!(payment_id = %payment_id, order_id = %payload.order_id, "payment processing started");

    Ok(HttpResponse::Accepted().json(serde_json::json!({
        "success": true,
        "paymentId": payment_id,
        "status": "PROCESSING",
    })))
}

async fn get_payment(
    executor: web::Data<Arc<PaymentExecutor>>,
    path: web::Path<uuid::Uuid>,
) -> Result<HttpResponse, ServiceError> {
    let payment_id = path.into_inner();
    let payment = executor
        .get_payment_by_id(payment_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("payment not found: {payment_id}")))?;
    let attempts = executor.get_attempts(payment_id).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "payment": payment,
        "attempts": attempts,
    })))
}

async fn get_payment_by_order(
    executor: web::Data<Arc<PaymentExecutor>>,
    path: web::Path<uuid::Uuid>,
) -> Result<HttpResponse, ServiceError> {
    let order_id = path.into_inner();
    let payment = executor
        .get_payment_by_order_id(order_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("payment not found for order: {order_id}")))?;
    let attempts = executor.get_attempts(payment.id).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "payment": payment,
        "attempts": attempts,
    })))
}

async fn circuit_breaker_status(executor: web::Data<Arc<PaymentExecutor>>) -> HttpResponse {
    let cb = executor.circuit_breaker();
    let state = executor.circuit_state_label();
    crate::metrics::set_circuit_breaker_state(state);
    HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "circuitBreaker": {
            "state": state,
            "failureCount": cb.consecutive_failures(),
            "successCount": cb.consecutive_successes(),
            "canExecute": cb.can_execute(),
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn process_payment_request_rejects_non_positive_amount() {
        let req = ProcessPaymentRequest {
            order_id: uuid::Uuid::new_v4(),
            amount: 0,
            payment_method: "card".to_string(),
        };
        assert!(req.validate().is_err());
    }
}
