//! Per-channel delivery. EMAIL/SMS/PUSH are mocked;
//! WEBHOOK performs a real `reqwest` POST with a 10 s timeout.

use std::time::Duration;

use async_trait::async_trait;

use crate::models::Notification;

#[async_trait]
pub trait ChannelSender: Send + Sync {
    /// Attempts delivery, returning an error message on failure.
    async fn send(&self, notification: &Notification) -> Result<(), String>;
}

/// EMAIL/SMS/PUSH: logged and treated as an immediate synthetic success.
/// Delivery is in scope only for how events are consumed and templates are
/// rendered, not for real provider integration.
pub struct MockSender {
    channel_name: &'static str,
}

impl MockSender {
    pub fn new(channel_name: &'static str) -> Self {
        Self { channel_name }
    }
}

#[async_trait]
impl ChannelSender for MockSender {
    async fn send(&self, notification: &Notification) -> Result<(), String> {
        tracing::info!(
            channel = self.channel_name,
            notification_id = %notification.id,
            subject = %notification.subject,
            "mock channel delivery"
        );
        Ok(())
    }
}

pub struct WebhookSender {
    client: reqwest::Client,
    url: String,
}

impl WebhookSender {
    pub fn new(url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("failed to build webhook reqwest client");
        Self { client, url }
    }
}

#[async_trait]
impl ChannelSender for WebhookSender {
    async fn send(&self, notification: &Notification) -> Result<(), String> {
        let body = serde_json::json!({
            "notificationId": notification.id,
            "userId": notification.user_id,
            "orderId": notification.order_id,
            "subject": notification.subject,
            "message": notification.message,
        });

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(format!("webhook responded with status {}", response.status()))
        }
    }
}

/// Builds the sender registry for the channels this deployment has enabled
/// (one `*_ENABLED` flag per channel); a disabled channel has no sender and
/// is treated as an unconditional failure for that `DeliveryAttempt`.
pub struct SenderRegistry {
    email: Option<MockSender>,
    sms: Option<MockSender>,
    push: Option<MockSender>,
    webhook: Option<WebhookSender>,
}

impl SenderRegistry {
    pub fn new(email_enabled: bool, sms_enabled: bool, push_enabled: bool, webhook_enabled: bool, webhook_url: String) -> Self {
        Self {
            email: email_enabled.then(|| MockSender::new("email")),
            sms: sms_enabled.then(|| MockSender::new("sms")),
            push: push_enabled.then(|| MockSender::new("push")),
            webhook: webhook_enabled.then(|| WebhookSender::new(webhook_url)),
        }
    }

    pub fn for_channel(&self, channel: &str) -> Option<&(dyn ChannelSender)> {
        match channel {
            "EMAIL" => self.email.as_ref().map(|s| s as &dyn ChannelSender),
            "SMS" => self.sms.as_ref().map(|s| s as &dyn ChannelSender),
            "PUSH" => self.push.as_ref().map(|s| s as &dyn ChannelSender),
            "WEBHOOK" => self.webhook.as_ref().map(|s| s as &dyn ChannelSender),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn notification() -> Notification {
        Notification {
            id: Uuid::new_v4(),
            user_id: None,
            order_id: None,
            subject: "test".to_string(),
            message: "test message".to_string(),
            channels: vec!["EMAIL".to_string()],
            priority: "normal".to_string(),
            status: "PENDING".to_string(),
            template_type: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn mock_sender_always_succeeds() {
        let sender = MockSender::new("email");
        assert!(sender.send(&notification()).await.is_ok());
    }

    #[test]
    fn registry_has_no_sender_for_disabled_channel() {
        let registry = SenderRegistry::new(true, false, true, false, "http://localhost".to_string());
        assert!(registry.for_channel("EMAIL").is_some());
        assert!(registry.for_channel("SMS").is_none());
        assert!(registry.for_channel("WEBHOOK").is_none());
    }
}
