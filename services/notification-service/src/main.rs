use std::io;
use std::sync::Arc;
use std::time::Duration;

use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpResponse, HttpServer};
use db_pool::{create_pool, migrate, DbConfig};
use idempotent_consumer::IdempotencyGuard;
use notification_service::{
    consumer::NotificationEventsConsumer, handlers, metrics, Config, NotificationService,
    SenderRegistry,
};
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!();

#[actix_web::main]
async fn main() -> io::Result<()> {
    error_handling::init_tracing();

    let config = Config::from_env().expect("failed to load configuration from environment");

    tracing::info!("starting notification-service on {}:{}", config.server_host, config.server_port);

    let mut db_config = DbConfig::for_service("notification-service");
    db_config.database_url = config.database_url.clone();
    let pool = create_pool(db_config)
        .await
        .map_err(|e| io::Error::other(format!("database connection failed: {e}")))?;

    migrate(&pool, &MIGRATOR)
        .await
        .map_err(|e| io::Error::other(format!("migration failed: {e}")))?;

    let senders = Arc::new(SenderRegistry::new(
        config.email_enabled,
        config.sms_enabled,
        config.push_enabled,
        config.webhook_enabled,
        config.webhook_url.clone(),
    ));
    let service = Arc::new(NotificationService::new(pool.clone(), senders));

    let idempotency = Arc::new(IdempotencyGuard::new(
        pool.clone(),
        Duration::from_secs(config.idempotency_retention_days * 86_400),
    ));

    let shutdown = CancellationToken::new();
    spawn_events_consumer(service.clone(), idempotency.clone(), &config, shutdown.clone());
    spawn_idempotency_cleanup(idempotency.clone(), shutdown.clone());

    let addr = format!("{}:{}", config.server_host, config.server_port);
    tracing::info!("listening on {}", addr);

    let http_pool = pool.clone();
    let http_service = service.clone();
    let server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(http_pool.clone()))
            .app_data(web::Data::new(http_service.clone()))
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

fn spawn_events_consumer(
    service: Arc<NotificationService>,
    idempotency: Arc<IdempotencyGuard>,
    config: &Config,
    shutdown: CancellationToken,
) {
    let consumer = NotificationEventsConsumer::new(service, idempotency, config.kafka_bootstrap_servers.clone());
    tokio::spawn(async move {
        consumer.run(shutdown).await;
    });
}

fn spawn_idempotency_cleanup(idempotency: Arc<IdempotencyGuard>, shutdown: CancellationToken) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(3600));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match idempotency.cleanup_old_events().await {
                        Ok(deleted) if deleted > 0 => {
                            tracing::info!(deleted, "purged processed_events rows past retention")
                        }
                        Ok(_) => {}
                        Err(e) => tracing::warn!(error = %e, "idempotency cleanup failed"),
                    }
                }
                _ = shutdown.cancelled() => return,
            }
        }
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
