use std::collections::HashMap;
use std::sync::Arc;

use error_handling::ServiceError;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{default_channels, DeliveryAttempt, Notification, NotificationTemplate};
use crate::senders::SenderRegistry;
use crate::templates::render_notification;

pub struct NotificationService {
    pool: PgPool,
    senders: Arc<SenderRegistry>,
}

impl NotificationService {
    pub fn new(pool: PgPool, senders: Arc<SenderRegistry>) -> Self {
        Self { pool, senders }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn get_template(&self, event_type: &str) -> Result<Option<NotificationTemplate>, ServiceError> {
        let template = sqlx::query_as::<_, NotificationTemplate>(
            "SELECT type, title_template, message_template FROM notifications.notification_templates WHERE type = $1",
        )
        .bind(event_type)
        .fetch_optional(&self.pool)
        .await?;
        Ok(template)
    }

    /// Inserts a `Notification` from a caller-supplied subject/message
    /// (the HTTP `POST /api/v1/notifications` path, which bypasses
    /// template rendering entirely).
    pub async fn create_direct(
        &self,
        user_id: Option<Uuid>,
        order_id: Option<Uuid>,
        subject: &str,
        message: &str,
        channels: Vec<String>,
        priority: &str,
    ) -> Result<Notification, ServiceError> {
        let notification = sqlx::query_as::<_, Notification>(
            r#"
            INSERT INTO notifications.notifications
                (user_id, order_id, subject, message, channels, priority, status, template_type)
            VALUES ($1, $2, $3, $4, $5, $6, 'PENDING', NULL)
            RETURNING id, user_id, order_id, subject, message, channels, priority, status,
                      template_type, created_at, updated_at
            "#,
        )
        .bind(user_id)
        .bind(order_id)
        .bind(subject)
        .bind(message)
        .bind(&channels)
        .bind(priority)
        .fetch_one(&self.pool)
        .await?;

        Ok(notification)
    }

    /// Resolves the template, renders it, and inserts the `Notification`
    /// row. Returns `None` (logged, dropped) if no template exists for
    /// `event_type`.
    pub async fn create_from_event(
        &self,
        event_type: &str,
        user_id: Option<Uuid>,
        order_id: Option<Uuid>,
        context: &HashMap<&str, String>,
        channels: Option<Vec<String>>,
        priority: &str,
    ) -> Result<Option<Notification>, ServiceError> {
        let Some(template) = self.get_template(event_type).await? else {
            tracing::warn!(event_type, "no notification template registered, dropping event");
            return Ok(None);
        };

        let rendered = render_notification(&template, event_type, context);
        if rendered.used_fallback {
            tracing::warn!(event_type, "template render missing a placeholder, used fallback copy");
        }

        let channels = channels.unwrap_or_else(|| {
            default_channels().iter().map(|c| c.as_str().to_string()).collect()
        });

        let notification = sqlx::query_as::<_, Notification>(
            r#"
            INSERT INTO notifications.notifications
                (user_id, order_id, subject, message, channels, priority, status, template_type)
            VALUES ($1, $2, $3, $4, $5, $6, 'PENDING', $7)
            RETURNING id, user_id, order_id, subject, message, channels, priority, status,
                      template_type, created_at, updated_at
            "#,
        )
        .bind(user_id)
        .bind(order_id)
        .bind(&rendered.subject)
        .bind(&rendered.message)
        .bind(&channels)
        .bind(priority)
        .bind(event_type)
        .fetch_one(&self.pool)
        .await?;

        Ok(Some(notification))
    }

    /// Step 4: dispatch to every channel, recording a `DeliveryAttempt` per
    /// channel and settling the notification's final status. Never returns
    /// an error: a delivery failure is recorded on the attempt row, not
    /// propagated to the caller; the event consumer has no failure path
    /// to react to a delivery failure.
    pub async fn dispatch(&self, notification: &Notification) {
        let mut any_success = false;
        let mut any_failure = false;

        for (idx, channel) in notification.channels.iter().enumerate() {
            let attempt_number = idx as i32 + 1;
            let result = match self.senders.for_channel(channel) {
                Some(sender) => sender.send(notification).await,
                None => Err(format!("channel {channel} is disabled")),
            };

            let success = result.is_ok();
            if success {
                any_success = true;
            } else {
                any_failure = true;
            }

            if let Err(e) = self.record_attempt(notification.id, channel, attempt_number, &result).await {
                tracing::warn!(notification_id = %notification.id, channel, error = %e, "failed to record delivery attempt");
            }

            if let Err(e) = result {
                tracing::warn!(notification_id = %notification.id, channel, error = %e, "channel delivery failed");
            }
        }

        let final_status = if any_success && !any_failure {
            "SENT"
        } else if any_success {
            tracing::warn!(notification_id = %notification.id, "partial delivery across channels");
            "SENT"
        } else {
            "FAILED"
        };

        if let Err(e) = self.update_status(notification.id, final_status).await {
            tracing::error!(notification_id = %notification.id, error = %e, "failed to settle notification status");
        }
    }

    async fn record_attempt(
        &self,
        notification_id: Uuid,
        channel: &str,
        attempt_number: i32,
        result: &Result<(), String>,
    ) -> Result<(), ServiceError> {
        let (success, error_message) = match result {
            Ok(()) => (true, None),
            Err(e) => (false, Some(e.clone())),
        };

        sqlx::query(
            r#"
            INSERT INTO notifications.delivery_attempts
                (notification_id, channel, attempt_number, success, error_message, completed_at)
            VALUES ($1, $2, $3, $4, $5, now())
            "#,
        )
        .bind(notification_id)
        .bind(channel)
        .bind(attempt_number)
        .bind(success)
        .bind(error_message)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_status(&self, notification_id: Uuid, status: &str) -> Result<(), ServiceError> {
        sqlx::query("UPDATE notifications.notifications SET status = $1, updated_at = now() WHERE id = $2")
            .bind(status)
            .bind(notification_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn get_notification(&self, id: Uuid) -> Result<Option<Notification>, ServiceError> {
        let notification = sqlx::query_as::<_, Notification>(
            r#"
            SELECT id, user_id, order_id, subject, message, channels, priority, status,
                   template_type, created_at, updated_at
            FROM notifications.notifications WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(notification)
    }

    pub async fn get_attempts(&self, notification_id: Uuid) -> Result<Vec<DeliveryAttempt>, ServiceError> {
        let attempts = sqlx::query_as::<_, DeliveryAttempt>(
            r#"
            SELECT id, notification_id, channel, attempt_number, success, error_message, completed_at
            FROM notifications.delivery_attempts WHERE notification_id = $1 ORDER BY attempt_number ASC
            "#,
        )
        .bind(notification_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(attempts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_channel_list_serializes_as_strings() {
        let channels: Vec<String> = default_channels().iter().map(|c| c.as_str().to_string()).collect();
        assert_eq!(channels, vec!["EMAIL".to_string(), "PUSH".to_string()]);
    }
}
