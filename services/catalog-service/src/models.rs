use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Price/name lookup record. Catalog is read-mostly; order-service snapshots
/// `name`/`price` into `OrderItem` at order-creation time, so later catalog
/// edits never retroactively change an already-placed order's total.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Pizza {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    /// Minor currency units (cents/kopecks).
    pub price: i64,
    pub image_url: String,
    pub ingredients: Vec<String>,
    pub available: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreatePizzaRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    #[validate(range(min = 1))]
    pub price: i64,
    pub image_url: Option<String>,
    pub ingredients: Option<Vec<String>>,
    #[serde(default = "default_available")]
    pub available: bool,
}

fn default_available() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct MenuQuery {
    #[serde(default = "default_available_filter")]
    pub available: bool,
}

fn default_available_filter() -> bool {
    true
}
