use std::sync::Arc;

use actix_web::{web, HttpResponse};
use error_handling::ServiceError;
use validator::Validate;

use crate::models::CreateNotificationRequest;
use crate::service::NotificationService;

pub fn register_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/api/v1/notifications", web::post().to(create_notification))
        .route("/api/v1/notifications/{id}", web::get().to(get_notification));
}

async fn create_notification(
    service: web::Data<Arc<NotificationService>>,
    payload: web::Json<CreateNotificationRequest>,
) -> Result<HttpResponse, ServiceError> {
    payload.validate()?;

    // `direct` has no registered template: the subject/message are taken
    // from the request body verbatim rather than rendered.
    let subject = payload.subject.clone().unwrap_or_else(|| "Notification".to_string());
    let priority = payload.priority.clone().unwrap_or_else(|| "normal".to_string());

    let notification = service
        .create_direct(
            payload.user_id,
            payload.order_id,
            &subject,
            &payload.message,
            payload.channels.clone(),
            &priority,
        )
        .await?;

    let service = service.get_ref().clone();
    let dispatched = notification.clone();
    tokio::spawn(async move {
        service.dispatch(&dispatched).await;
    });

    tracing::info!(notification_id = %notification.id, "notification accepted");

    Ok(HttpResponse::Accepted().json(serde_json::json!({
        "success": true,
        "notificationId": notification.id,
        "status": "PENDING",
    })))
}

async fn get_notification(
    service: web::Data<Arc<NotificationService>>,
    path: web::Path<uuid::Uuid>,
) -> Result<HttpResponse, ServiceError> {
    let notification_id = path.into_inner();
    let notification = service
        .get_notification(notification_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("notification not found: {notification_id}")))?;
    let attempts = service.get_attempts(notification_id).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "notification": notification,
        "attempts": attempts,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn create_notification_request_rejects_empty_message() {
        let req = CreateNotificationRequest {
            user_id: Some(Uuid::new_v4()),
            order_id: None,
            subject: None,
            message: String::new(),
            channels: vec!["EMAIL".to_string()],
            priority: None,
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn create_notification_request_rejects_empty_channels() {
        let req = CreateNotificationRequest {
            user_id: Some(Uuid::new_v4()),
            order_id: None,
            subject: None,
            message: "hello".to_string(),
            channels: vec![],
            priority: None,
        };
        assert!(req.validate().is_err());
    }
}
