use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpResponse, HttpServer};
use catalog_service::{config::Config, handlers, metrics};
use db_pool::{create_pool, migrate, DbConfig};
use sqlx::PgPool;
use std::io;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!();

#[actix_web::main]
async fn main() -> io::Result<()> {
    error_handling::init_tracing();

    let config = Config::from_env().expect("failed to load configuration from environment");

    tracing::info!("starting catalog-service on {}:{}", config.server_host, config.server_port);

    let mut db_config = DbConfig::for_service("catalog-service");
    db_config.database_url = config.database_url.clone();
    let pool = create_pool(db_config)
        .await
        .map_err(|e| io::Error::other(format!("database connection failed: {e}")))?;

    migrate(&pool, &MIGRATOR)
        .await
        .map_err(|e| io::Error::other(format!("migration failed: {e}")))?;

    let addr = format!("{}:{}", config.server_host, config.server_port);
    tracing::info!("listening on {}", addr);

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(pool.clone()))
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
    .await
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
