use super::{ok, AppState};
use crate::coordinator::detach;
use crate::domain::NotificationId;
use crate::error::Result;
use crate::middleware::Identity;
use actix_web::{web, HttpResponse};
use serde_json::json;

/// GET /api/notifications
pub async fn list_notifications(
    state: web::Data<AppState>,
    identity: Identity,
) -> Result<HttpResponse> {
    let user = state.current_user(&identity).await?;
    let notifications = state.notifications.list(user.id).await?;
    Ok(ok(
        "Notifications fetched",
        json!({ "notifications": notifications }),
    ))
}

/// DELETE /api/notifications/{id}
pub async fn delete_notification(
    state: web::Data<AppState>,
    path: web::Path<NotificationId>,
    identity: Identity,
) -> Result<HttpResponse> {
    let user = state.current_user(&identity).await?;
    let id = path.into_inner();

    let notifications = state.notifications.clone();
    let removed = detach(async move { notifications.delete_one(user.id, id).await }).await?;
    Ok(ok("Notification deleted", json!({ "removed": removed })))
}

/// DELETE /api/notifications
pub async fn clear_notifications(
    state: web::Data<AppState>,
    identity: Identity,
) -> Result<HttpResponse> {
    let user = state.current_user(&identity).await?;

    let notifications = state.notifications.clone();
    let removed = detach(async move { notifications.clear_all(user.id).await }).await?;
    Ok(ok("Notifications deleted", json!({ "removed": removed })))
}
