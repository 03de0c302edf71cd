use std::io;
use std::sync::Arc;
use std::time::Duration;

use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpResponse, HttpServer};
use db_pool::{create_pool, migrate, DbConfig};
use order_service::{config::Config, consumer::PaymentEventsConsumer, handlers, metrics, OrderService};
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use transactional_outbox::{
    KafkaOutboxPublisher, OutboxMetrics, OutboxProcessor, OutboxRepository, SqlxOutboxRepository,
};

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!();

#[actix_web::main]
async fn main() -> io::Result<()> {
    error_handling::init_tracing();

    let config = Config::from_env().expect("failed to load configuration from environment");

    tracing::info!("starting order-service on {}:{}", config.server_host, config.server_port);

    let mut db_config = DbConfig::for_service("order-service");
    db_config.database_url = config.database_url.clone();
    let pool = create_pool(db_config)
        .await
        .map_err(|e| io::Error::other(format!("database connection failed: {e}")))?;

    migrate(&pool, &MIGRATOR)
        .await
        .map_err(|e| io::Error::other(format!("migration failed: {e}")))?;

    let order_service = Arc::new(OrderService::new(pool.clone(), config.catalog_service_url.clone()));

    let shutdown = CancellationToken::new();
    spawn_outbox_relay(&pool, &config, shutdown.clone());
    spawn_payment_events_consumer(order_service.clone(), &config, shutdown.clone());

    let addr = format!("{}:{}", config.server_host, config.server_port);
    tracing::info!("listening on {}", addr);

    let http_pool = pool.clone();
    let http_service = order_service.clone();
    let server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(http_pool.clone()))
            .app_data(web::Data::from(http_service.clone()))
            .wrap(Cors::permissive())
            .wrap(middleware::Logger::default())
            .wrap(tracing_actix_web::TracingLogger::default())
            .wrap(metrics::MetricsMiddleware)
            .route("/health", web::get().to(health))
            .route("/metrics", web::get().to(metrics::serve_metrics))
            .configure(handlers::register_routes)
    })
    .bind(&addr)?
    .run()
    .await;

    shutdown.cancel();
    server
}

fn spawn_outbox_relay(pool: &PgPool, config: &Config, shutdown: CancellationToken) {
    let repository = SqlxOutboxRepository::new(
        pool.clone(),
        "orders",
        "order-service",
        env!("CARGO_PKG_VERSION"),
    );
    let publisher = match KafkaOutboxPublisher::new(&config.kafka_bootstrap_servers) {
        Ok(publisher) => publisher,
        Err(e) => {
            tracing::error!(error = %e, "failed to create kafka outbox publisher, relay will not run");
            return;
        }
    };

    let processor = OutboxProcessor::new(repository, publisher)
        .with_batch_size(config.batch_size)
        .with_poll_interval(Duration::from_secs(config.processing_interval))
        .with_max_retries(config.max_retries)
        .with_metrics(OutboxMetrics::new("order-service"));

    let retention_hours = config.outbox_retention_hours;
    let gc_pool = pool.clone();
    tokio::spawn(async move {
        processor.run(shutdown).await;
    });
    tokio::spawn(async move {
        let repository = SqlxOutboxRepository::new(
            gc_pool,
            "orders",
            "order-service",
            env!("CARGO_PKG_VERSION"),
        );
        let mut interval = tokio::time::interval(Duration::from_secs(3600));
        loop {
            interval.tick().await;
            match repository
                .cleanup_processed(Duration::from_secs(retention_hours * 3600))
                .await
            {
                Ok(deleted) if deleted > 0 => {
                    tracing::info!(deleted, "purged processed outbox rows past retention")
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "outbox cleanup failed"),
            }
        }
    });
}

fn spawn_payment_events_consumer(service: Arc<OrderService>, config: &Config, shutdown: CancellationToken) {
    let consumer = PaymentEventsConsumer::new(service, config.kafka_bootstrap_servers.clone());
    tokio::spawn(async move {
        consumer.run(shutdown).await;
    });
}

async fn health(pool: web::Data<PgPool>) -> HttpResponse {
    match sqlx::query("SELECT 1").execute(pool.get_ref()).await {
        Ok(_) => HttpResponse::Ok().json(serde_json::json!({"status": "healthy"})),
        Err(e) => {
            tracing::error!("health check failed: {e}");
            HttpResponse::ServiceUnavailable().json(serde_json::json!({"status": "unhealthy"}))
        }
    }
}
