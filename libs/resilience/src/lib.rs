/// Resilience patterns used by the payment executor:
/// - **Circuit Breaker**: fails fast once consecutive failures cross a threshold
/// - **Timeout**: enforces a time limit on the provider call
/// - **Retry**: exponential backoff with jitter for transient failures
///
/// # Example
///
/// ```rust,no_run
/// use resilience::{presets, CircuitBreaker};
///
/// #[tokio::main]
/// async fn main() {
///     let config = presets::payment_provider_config();
///     let circuit_breaker = CircuitBreaker::new(config.circuit_breaker);
///
///     let result = circuit_breaker.call(|| async {
///         Ok::<_, String>(())
///     }).await;
/// }
/// ```

pub mod circuit_breaker;
pub mod metrics;
pub mod presets;
pub mod retry;
pub mod timeout;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitState};
pub use presets::{payment_provider_config, ServiceConfig};
pub use retry::{with_retry, RetryConfig, RetryError};
pub use timeout::{with_timeout, with_timeout_result, TimeoutConfig, TimeoutError};
