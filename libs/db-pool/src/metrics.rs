//! Prometheus metrics for database connection pool
//!
//! Tracks pool size, connection acquisition latency, and errors

use prometheus::{
    register_gauge_vec, register_histogram_vec, register_int_counter_vec, register_int_gauge_vec,
    GaugeVec, HistogramVec, IntCounterVec, IntGaugeVec,
};
use sqlx::{pool::PoolConnection, PgPool, Postgres};
use std::time::Instant;

lazy_static::lazy_static! {
    /// Database connection pool size by state (idle/active/max)
    static ref DB_POOL_CONNECTIONS: IntGaugeVec = register_int_gauge_vec!(
        "db_pool_connections",
        "Database pool connection count by state",
        &["service", "state"]
    ).expect("Prometheus metrics registration should succeed at startup");

    /// Time to acquire a connection from the pool
    static ref DB_POOL_ACQUIRE_DURATION: HistogramVec = register_histogram_vec!(
        "db_pool_acquire_duration_seconds",
        "Time to acquire connection from pool",
        &["service"],
        vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0]
    ).expect("Prometheus metrics registration should succeed at startup");

    /// Connection acquisition errors by type
    static ref DB_POOL_CONNECTION_ERRORS: IntGaugeVec = register_int_gauge_vec!(
        "db_pool_connection_errors_total",
        "Connection acquisition errors",
        &["service", "error_type"]
    ).expect("Prometheus metrics registration should succeed at startup");

    /// Pool utilization ratio (active / max), sampled on each backpressure check
    static ref DB_POOL_UTILIZATION: GaugeVec = register_gauge_vec!(
        "db_pool_utilization_ratio",
        "Database pool utilization (active connections / max connections)",
        &["service"]
    ).expect("Prometheus metrics registration should succeed at startup");

    /// Requests rejected due to pool exhaustion backpressure
    static ref DB_POOL_EXHAUSTED: IntCounterVec = register_int_counter_vec!(
        "db_pool_exhausted_total",
        "Requests rejected because the pool exceeded its backpressure threshold",
        &["service"]
    ).expect("Prometheus metrics registration should succeed at startup");
}

/// Update connection pool metrics (called periodically)
pub(crate) fn update_pool_metrics(pool: &PgPool, service: &str) {
    let size = pool.size() as i64;
    let idle = pool.num_idle() as i64;
    let active = size - idle;

    DB_POOL_CONNECTIONS
        .with_label_values(&[service, "idle"])
        .set(idle);

    DB_POOL_CONNECTIONS
        .with_label_values(&[service, "active"])
        .set(active);

    DB_POOL_CONNECTIONS
        .with_label_values(&[service, "max"])
        .set(pool.options().get_max_connections() as i64);
}

/// Acquire a connection from the pool and record metrics
///
/// This is a drop-in replacement for `pool.acquire().await` that automatically
/// tracks acquisition latency and error rates.
///
/// # Example
/// ```no_run
/// # use db_pool::{create_pool, DbConfig, acquire_with_metrics};
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// # let pool = create_pool(DbConfig::for_service("test")).await?;
/// let conn = acquire_with_metrics(&pool, "my-service").await?;
/// sqlx::query("SELECT 1").execute(&mut *conn).await?;
/// # Ok(())
/// # }
/// ```
pub async fn acquire_with_metrics(
    pool: &PgPool,
    service: &str,
) -> Result<PoolConnection<Postgres>, sqlx::Error> {
    let start = Instant::now();
    let result = pool.acquire().await;

    DB_POOL_ACQUIRE_DURATION
        .with_label_values(&[service])
        .observe(start.elapsed().as_secs_f64());

    if let Err(e) = &result {
        let error_type = match e {
            sqlx::Error::PoolTimedOut => "timeout",
            sqlx::Error::PoolClosed => "closed",
            _ => "other",
        };

        DB_POOL_CONNECTION_ERRORS
            .with_label_values(&[service, error_type])
            .inc();
    }

    result
}

/// Configuration for pool exhaustion backpressure.
#[derive(Debug, Clone, Copy)]
pub struct BackpressureConfig {
    /// Utilization threshold above which to reject requests (0.0-1.0).
    /// Default: 0.85 (reject when 85% of connections are active)
    pub threshold: f64,
}

impl Default for BackpressureConfig {
    fn default() -> Self {
        Self { threshold: 0.85 }
    }
}

impl BackpressureConfig {
    /// Build from `DB_POOL_BACKPRESSURE_THRESHOLD` (e.g. "0.90"), falling back
    /// to the default for anything missing, unparsable, or outside (0.0, 1.0].
    pub fn from_env() -> Self {
        let threshold = std::env::var("DB_POOL_BACKPRESSURE_THRESHOLD")
            .ok()
            .and_then(|v| v.parse::<f64>().ok())
            .filter(|&t| t > 0.0 && t <= 1.0)
            .unwrap_or(0.85);

        Self { threshold }
    }
}

/// Returned by [`acquire_with_backpressure`] when the pool is above its
/// configured utilization threshold.
#[derive(Debug, Clone)]
pub struct PoolExhaustedError {
    pub service: String,
    pub utilization: f64,
    pub threshold: f64,
}

impl std::fmt::Display for PoolExhaustedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Database pool exhausted (service={}, utilization={:.2}%, threshold={:.2}%)",
            self.service,
            self.utilization * 100.0,
            self.threshold * 100.0
        )
    }
}

impl std::error::Error for PoolExhaustedError {}

/// Acquire a connection with backpressure: rejects immediately once pool
/// utilization exceeds `config.threshold`, instead of queuing behind
/// `pool.acquire()`'s own timeout.
///
/// # Example
/// ```no_run
/// # use db_pool::{create_pool, DbConfig, acquire_with_backpressure, BackpressureConfig};
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// # let pool = create_pool(DbConfig::for_service("test")).await?;
/// let config = BackpressureConfig::default();
/// match acquire_with_backpressure(&pool, "my-service", config).await {
///     Ok(conn) => {
///         sqlx::query("SELECT 1").execute(&mut *conn.detach()).await?;
///     }
///     Err(e) => eprintln!("pool exhausted: {e}"),
/// }
/// # Ok(())
/// # }
/// ```
pub async fn acquire_with_backpressure(
    pool: &PgPool,
    service: &str,
    config: BackpressureConfig,
) -> Result<PoolConnection<Postgres>, PoolExhaustedError> {
    let size = pool.size() as f64;
    let idle = pool.num_idle() as f64;
    let active = size - idle;
    let max = pool.options().get_max_connections() as f64;

    let utilization = if max > 0.0 { active / max } else { 0.0 };

    DB_POOL_UTILIZATION
        .with_label_values(&[service])
        .set(utilization);

    if utilization > config.threshold {
        DB_POOL_EXHAUSTED.with_label_values(&[service]).inc();

        tracing::warn!(
            service = %service,
            utilization = %utilization,
            threshold = %config.threshold,
            active = %active,
            max = %max,
            "pool exhaustion: rejecting request (backpressure)"
        );

        return Err(PoolExhaustedError {
            service: service.to_string(),
            utilization,
            threshold: config.threshold,
        });
    }

    let start = Instant::now();
    let result = pool.acquire().await;

    DB_POOL_ACQUIRE_DURATION
        .with_label_values(&[service])
        .observe(start.elapsed().as_secs_f64());

    match result {
        Ok(conn) => Ok(conn),
        Err(e) => {
            let error_type = match &e {
                sqlx::Error::PoolTimedOut => "timeout",
                sqlx::Error::PoolClosed => "closed",
                _ => "other",
            };

            DB_POOL_CONNECTION_ERRORS
                .with_label_values(&[service, error_type])
                .inc();

            tracing::error!(
                service = %service,
                error = %e,
                error_type = %error_type,
                "connection acquisition failed after backpressure check"
            );

            Err(PoolExhaustedError {
                service: service.to_string(),
                utilization: 1.0,
                threshold: config.threshold,
            })
        }
    }
}
