use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Channel a notification can be dispatched over.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum NotificationChannel {
    Email,
    Sms,
    Push,
    Webhook,
}

impl NotificationChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationChannel::Email => "EMAIL",
            NotificationChannel::Sms => "SMS",
            NotificationChannel::Push => "PUSH",
            NotificationChannel::Webhook => "WEBHOOK",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "EMAIL" => Some(NotificationChannel::Email),
            "SMS" => Some(NotificationChannel::Sms),
            "PUSH" => Some(NotificationChannel::Push),
            "WEBHOOK" => Some(NotificationChannel::Webhook),
            _ => None,
        }
    }
}

/// Default channel set when an event does not specify one.
pub fn default_channels() -> Vec<NotificationChannel> {
    vec![NotificationChannel::Email, NotificationChannel::Push]
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub order_id: Option<Uuid>,
    pub subject: String,
    pub message: String,
    pub channels: Vec<String>,
    pub priority: String,
    pub status: String,
    pub template_type: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct DeliveryAttempt {
    pub id: i64,
    pub notification_id: Uuid,
    pub channel: String,
    pub attempt_number: i32,
    pub success: Option<bool>,
    pub error_message: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct NotificationTemplate {
    #[sqlx(rename = "type")]
    pub template_type: String,
    pub title_template: String,
    pub message_template: String,
}

/// Request body for `POST /api/v1/notifications`.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateNotificationRequest {
    pub user_id: Option<Uuid>,
    pub order_id: Option<Uuid>,
    pub subject: Option<String>,
    #[validate(length(min = 1, message = "message must not be empty"))]
    pub message: String,
    #[validate(length(min = 1, message = "at least one channel is required"))]
    pub channels: Vec<String>,
    pub priority: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_parse_accepts_lowercase() {
        assert_eq!(NotificationChannel::parse("email"), Some(NotificationChannel::Email));
        assert_eq!(NotificationChannel::parse("WEBHOOK"), Some(NotificationChannel::Webhook));
        assert_eq!(NotificationChannel::parse("carrier-pigeon"), None);
    }

    #[test]
    fn default_channels_is_email_and_push() {
        let channels = default_channels();
        assert_eq!(channels, vec![NotificationChannel::Email, NotificationChannel::Push]);
    }
}
