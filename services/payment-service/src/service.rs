use std::sync::atomic::{AtomicI32, Ordering};

use error_handling::ServiceError;
use event_schema::{DomainEvent, OrderPaidEvent, PaymentFailedEvent};
use resilience::{presets, with_retry, CircuitBreaker, CircuitState, RetryConfig};
use sha2::{Digest, Sha256};
use sqlx::error::DatabaseError;
use sqlx::PgPool;
use transactional_outbox::{OutboxRepository, SqlxOutboxRepository};
use uuid::Uuid;

use crate::metrics;

use crate::models::{Payment, PaymentAttempt, PaymentProviderRequest, PaymentProviderSuccessResponse};

/// Computes the payment's idempotency fingerprint: `SHA-256(order_id:amount:payment_method)`.
pub fn idempotency_key(order_id: Uuid, amount: i64, payment_method: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{order_id}:{amount}:{payment_method}").as_bytes());
    hex::encode(hasher.finalize())
}

pub struct PaymentExecutor {
    pool: PgPool,
    outbox: SqlxOutboxRepository,
    http_client: reqwest::Client,
    payment_mock_url: String,
    payment_timeout_secs: u64,
    circuit_breaker: CircuitBreaker,
    max_attempts: u32,
    retry_base: std::time::Duration,
}

impl PaymentExecutor {
    pub fn new(pool: PgPool, payment_mock_url: String, payment_timeout_secs: u64, max_attempts: u32, retry_base: std::time::Duration) -> Self {
        let outbox = SqlxOutboxRepository::new(
            pool.clone(),
            "payments",
            "payment-service",
            env!("CARGO_PKG_VERSION"),
        );
        let preset = presets::payment_provider_config();
        Self {
            pool,
            outbox,
            http_client: reqwest::Client::new(),
            payment_mock_url,
            payment_timeout_secs,
            circuit_breaker: CircuitBreaker::new(preset.circuit_breaker),
            max_attempts,
            retry_base,
        }
    }

    pub fn circuit_breaker(&self) -> &CircuitBreaker {
        &self.circuit_breaker
    }

    pub async fn get_payment_by_order_id(&self, order_id: Uuid) -> Result<Option<Payment>, ServiceError> {
        let payment = sqlx::query_as("SELECT * FROM payments.payments WHERE order_id = $1")
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(payment)
    }

    pub async fn get_payment_by_id(&self, payment_id: Uuid) -> Result<Option<Payment>, ServiceError> {
        let payment = sqlx::query_as("SELECT * FROM payments.payments WHERE id = $1")
            .bind(payment_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(payment)
    }

    pub async fn get_attempts(&self, payment_id: Uuid) -> Result<Vec<PaymentAttempt>, ServiceError> {
        let attempts = sqlx::query_as(
            "SELECT * FROM payments.payment_attempts WHERE payment_id = $1 ORDER BY attempt_number",
        )
        .bind(payment_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(attempts)
    }

    /// Idempotency gate: if a payment already exists for `order_id`, returns
    /// it unchanged. A unique constraint on
    /// `order_id` serializes concurrent creators, so a racing insert that
    /// loses the race is treated as idempotent success rather than an error.
    pub async fn create_payment_if_new(
        &self,
        order_id: Uuid,
        amount: i64,
        payment_method: &str,
    ) -> Result<Payment, ServiceError> {
        if let Some(existing) = self.get_payment_by_order_id(order_id).await? {
            return Ok(existing);
        }

        let key = idempotency_key(order_id, amount, payment_method);
        let inserted: Result<Payment, sqlx::Error> = sqlx::query_as(
            "INSERT INTO payments.payments (order_id, amount, payment_method, status, idempotency_key) \
             VALUES ($1, $2, $3, 'PENDING', $4) RETURNING *",
        )
        .bind(order_id)
        .bind(amount)
        .bind(payment_method)
        .bind(&key)
        .fetch_one(&self.pool)
        .await;

        match inserted {
            Ok(payment) => Ok(payment),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => self
                .get_payment_by_order_id(order_id)
                .await?
                .ok_or_else(|| ServiceError::InternalError("payment vanished after unique violation".into())),
            Err(e) => Err(e.into()),
        }
    }

    /// Runs the bounded-retry, circuit-broken executor to completion,
    /// leaving the payment `COMPLETED` or `FAILED` and publishing the
    /// matching outbox event. Scheduling and backoff are delegated to
    /// `resilience::with_retry`; this method only supplies the per-attempt
    /// circuit-breaker gate and bookkeeping `with_retry` doesn't know about.
    pub async fn run_to_completion(&self, payment_id: Uuid) {
        if let Err(e) = self.set_status(payment_id, crate::models::PaymentStatus::Processing, None).await {
            tracing::error!(payment_id = %payment_id, error = %e, "failed to mark payment PROCESSING");
            return;
        }

        let payment = match self.get_payment_by_id(payment_id).await {
            Ok(Some(p)) => p,
            Ok(None) => {
                tracing::error!(payment_id = %payment_id, "payment not found when starting executor");
                return;
            }
            Err(e) => {
                tracing::error!(payment_id = %payment_id, error = %e, "failed to load payment");
                return;
            }
        };

        // `with_retry`'s `max_retries` counts retries *after* the first call,
        // so `max_attempts` total invocations needs `max_attempts - 1` here.
        let retry_config = RetryConfig {
            max_retries: self.max_attempts.saturating_sub(1),
            initial_backoff: self.retry_base,
            max_backoff: std::time::Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter: false,
        };

        let attempt_counter = AtomicI32::new(0);
        let outcome = with_retry(retry_config, || {
            let attempt_number = attempt_counter.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if !self.circuit_breaker.can_execute() {
                    let reason = "payment provider unavailable (circuit breaker open)".to_string();
                    tracing::warn!(payment_id = %payment_id, "circuit breaker open, failing attempt without a call");
                    let _ = self.record_attempt(payment_id, attempt_number, false, Some(&reason)).await;
                    return Err(reason);
                }

                match self.call_provider(&payment).await {
                    Ok(()) => {
                        self.circuit_breaker.record_success();
                        let _ = self.record_attempt(payment_id, attempt_number, true, None).await;
                        Ok(())
                    }
                    Err(e) => {
                        self.circuit_breaker.record_failure();
                        let _ = self.record_attempt(payment_id, attempt_number, false, Some(&e)).await;
                        Err(e)
                    }
                }
            }
        })
        .await;

        match outcome {
            Ok(()) => self.finish_success(&payment).await,
            Err(_) => {
                let reason = self
                    .get_attempts(payment_id)
                    .await
                    .ok()
                    .and_then(|attempts| attempts.into_iter().last())
                    .and_then(|a| a.error_message)
                    .unwrap_or_else(|| "payment failed after exhausting retries".to_string());
                self.finish_failure(&payment, &reason).await;
            }
        }
    }

    /// Label for the circuit breaker's current state, used both for the
    /// `/circuit-breaker/status` endpoint and the Prometheus gauge.
    pub fn circuit_state_label(&self) -> &'static str {
        match self.circuit_breaker.state() {
            CircuitState::Closed => "CLOSED",
            CircuitState::Open => "OPEN",
            CircuitState::HalfOpen => "HALF_OPEN",
        }
    }

    async fn call_provider(&self, payment: &Payment) -> Result<(), String> {
        let body = PaymentProviderRequest {
            order_id: payment.order_id,
            amount: payment.amount,
            card_details: "...sensitive data...".to_string(),
        };

        let url = format!("{}/api/v1/payments/process", self.payment_mock_url);
        let response = self
            .http_client
            .post(&url)
            .json(&body)
            .timeout(std::time::Duration::from_secs(self.payment_timeout_secs))
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if response.status().is_success() {
            let _: PaymentProviderSuccessResponse = response
                .json()
                .await
                .unwrap_or(PaymentProviderSuccessResponse { transaction_id: String::new() });
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(format!("payment provider returned {status}: {body}"))
        }
    }

    async fn record_attempt(
        &self,
        payment_id: Uuid,
        attempt_number: i32,
        success: bool,
        error: Option<&str>,
    ) -> Result<(), ServiceError> {
        let status = if success { "SUCCESS" } else { "FAILED" };
        sqlx::query(
            "INSERT INTO payments.payment_attempts (payment_id, attempt_number, status, error_message, completed_at) \
             VALUES ($1, $2, $3, $4, now())",
        )
        .bind(payment_id)
        .bind(attempt_number)
        .bind(status)
        .bind(error)
        .execute(&self.pool)
        .await?;

        let result_label = match (success, error) {
            (true, _) => "success",
            (false, Some(reason)) if reason.contains("circuit breaker open") => "circuit_open",
            (false, _) => "failure",
        };
        metrics::record_payment_attempt(result_label);
        metrics::set_circuit_breaker_state(self.circuit_state_label());

        Ok(())
    }

    async fn set_status(
        &self,
        payment_id: Uuid,
        status: crate::models::PaymentStatus,
        failure_reason: Option<&str>,
    ) -> Result<(), ServiceError> {
        sqlx::query(
            "UPDATE payments.payments SET status = $1, failure_reason = $2, updated_at = now() WHERE id = $3",
        )
        .bind(status.as_str())
        .bind(failure_reason)
        .bind(payment_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn finish_success(&self, payment: &Payment) {
        if let Err(e) = self.set_status(payment.id, crate::models::PaymentStatus::Completed, None).await {
            tracing::error!(payment_id = %payment.id, error = %e, "failed to mark payment COMPLETED");
            return;
        }

        let event = DomainEvent::OrderPaid(OrderPaidEvent {
            payment_id: payment.id,
            order_id: payment.order_id,
            amount: payment.amount,
            amount_formatted: crate::format_minor_units(payment.amount),
            payment_method: payment.payment_method.clone(),
            timestamp: chrono::Utc::now(),
        });
        self.publish_outbox(payment.order_id, &event).await;
        tracing::info!(payment_id = %payment.id, order_id = %payment.order_id, "payment completed");
    }

    async fn finish_failure(&self, payment: &Payment, reason: &str) {
        if let Err(e) = self
            .set_status(payment.id, crate::models::PaymentStatus::Failed, Some(reason))
            .await
        {
            tracing::error!(payment_id = %payment.id, error = %e, "failed to mark payment FAILED");
            return;
        }

        let event = DomainEvent::PaymentFailed(PaymentFailedEvent {
            payment_id: payment.id,
            order_id: payment.order_id,
            amount: payment.amount,
            amount_formatted: crate::format_minor_units(payment.amount),
            payment_method: payment.payment_method.clone(),
            failure_reason: reason.to_string(),
            timestamp: chrono::Utc::now(),
        });
        self.publish_outbox(payment.order_id, &event).await;
        tracing::warn!(payment_id = %payment.id, order_id = %payment.order_id, reason, "payment failed after retries");
    }

    async fn publish_outbox(&self, _order_id: Uuid, event: &DomainEvent) {
        let mut tx = match self.pool.begin().await {
            Ok(tx) => tx,
            Err(e) => {
                tracing::error!(error = %e, "failed to open transaction for outbox insert");
                return;
            }
        };
        if let Err(e) = self.outbox.insert_in_tx(&mut tx, event).await {
            tracing::error!(error = %e, "failed to insert outbox event");
            return;
        }
        if let Err(e) = tx.commit().await {
            tracing::error!(error = %e, "failed to commit outbox transaction");
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idempotency_key_is_deterministic() {
        let order_id = Uuid::new_v4();
        let a = idempotency_key(order_id, 1198, "card");
        let b = idempotency_key(order_id, 1198, "card");
        assert_eq!(a, b);
    }

    #[test]
    fn idempotency_key_differs_on_amount() {
        let order_id = Uuid::new_v4();
        let a = idempotency_key(order_id, 1198, "card");
        let b = idempotency_key(order_id, 1199, "card");
        assert_ne!(a, b);
    }
}
