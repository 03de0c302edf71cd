use actix_web::{web, HttpResponse};
use error_handling::ServiceError;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use crate::models::{CreatePizzaRequest, MenuQuery, Pizza};

pub fn register_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/api/v1/menu")
            .route(web::get().to(get_menu))
            .route(web::post().to(create_pizza)),
    )
    .service(web::resource("/api/v1/menu/{pizza_id}").route(web::get().to(get_pizza)));
}

async fn get_menu(
    pool: web::Data<PgPool>,
    query: web::Query<MenuQuery>,
) -> Result<HttpResponse, ServiceError> {
    let pizzas: Vec<Pizza> = if query.available {
        sqlx::query_as(
            "SELECT * FROM catalog.pizzas WHERE available = true ORDER BY name",
        )
        .fetch_all(pool.get_ref())
        .await?
    } else {
        sqlx::query_as("SELECT * FROM catalog.pizzas ORDER BY name")
            .fetch_all(pool.get_ref())
            .await?
    };

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "pizzas": pizzas,
    })))
}

async fn get_pizza(
    pool: web::Data<PgPool>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, ServiceError> {
    let pizza_id = path.into_inner();
    let pizza: Option<Pizza> = sqlx::query_as("SELECT * FROM catalog.pizzas WHERE id = $1")
        .bind(pizza_id)
        .fetch_optional(pool.get_ref())
        .await?;

    match pizza {
        Some(pizza) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "pizza": pizza,
        }))),
        None => Err(ServiceError::NotFound(format!("pizza {pizza_id} not found"))),
    }
}

async fn create_pizza(
    pool: web::Data<PgPool>,
    body: web::Json<CreatePizzaRequest>,
) -> Result<HttpResponse, ServiceError> {
    body.validate()?;

    let pizza: Pizza = sqlx::query_as(
        "INSERT INTO catalog.pizzas (name, description, price, image_url, ingredients, available) \
         VALUES ($1, $2, $3, $4, $5, $6) RETURNING *",
    )
    .bind(&body.name)
    .bind(body.description.clone().unwrap_or_default())
    .bind(body.price)
    .bind(body.image_url.clone().unwrap_or_default())
    .bind(body.ingredients.clone().unwrap_or_default())
    .bind(body.available)
    .fetch_one(pool.get_ref())
    .await?;

    Ok(HttpResponse::Created().json(json!({
        "success": true,
        "pizza": pizza,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_pizza_request_rejects_zero_price() {
        let req = CreatePizzaRequest {
            name: "Test".to_string(),
            description: None,
            price: 0,
            image_url: None,
            ingredients: None,
            available: true,
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn create_pizza_request_accepts_valid_input() {
        let req = CreatePizzaRequest {
            name: "Test".to_string(),
            description: Some("desc".to_string()),
            price: 1000,
            image_url: None,
            ingredients: None,
            available: true,
        };
        assert!(req.validate().is_ok());
    }
}
