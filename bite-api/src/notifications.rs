use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use bite_notification::Notification;
use bite_shared::CreateNotificationRequest;

use crate::error::{AppError, AppJson, AppPath};
use crate::idempotency::IdempotencyKey;
use crate::state::NotificationState;

pub fn routes() -> Router<NotificationState> {
    Router::new()
        .route("/api/notifications", get(list_notifications).post(create_notification))
        .route("/api/notifications/{id}", get(get_notification))
        .route("/api/notifications/{id}/read", put(mark_read))
        .route("/api/users/{user_id}/notifications", get(list_user_notifications))
        .route("/api/users/{user_id}/notifications/unread", get(list_unread_notifications))
        .route("/api/users/{user_id}/notifications/read-all", put(mark_all_read))
        .route("/api/orders/{order_id}/notifications", get(list_order_notifications))
}

pub async fn list_notifications(State(state): State<NotificationState>) -> Json<Vec<Notification>> {
    Json(state.notifications.list_notifications().await)
}

/// POST /api/notifications
/// Called by the order service at each customer-visible milestone
pub async fn create_notification(
    State(state): State<NotificationState>,
    key: IdempotencyKey,
    AppJson(req): AppJson<CreateNotificationRequest>,
) -> (StatusCode, Json<Notification>) {
    let notification = state
        .notifications
        .create_notification_with_key(req, key.as_deref())
        .await;
    (StatusCode::CREATED, Json(notification))
}

pub async fn get_notification(
    State(state): State<NotificationState>,
    AppPath(notification_id): AppPath<u64>,
) -> Result<Json<Notification>, AppError> {
    Ok(Json(state.notifications.get_notification(notification_id).await?))
}

pub async fn mark_read(
    State(state): State<NotificationState>,
    AppPath(notification_id): AppPath<u64>,
) -> Result<Json<Notification>, AppError> {
    Ok(Json(state.notifications.mark_read(notification_id).await?))
}

pub async fn list_user_notifications(
    State(state): State<NotificationState>,
    AppPath(user_id): AppPath<u64>,
) -> Json<Vec<Notification>> {
    Json(state.notifications.list_by_user(user_id).await)
}

pub async fn list_unread_notifications(
    State(state): State<NotificationState>,
    AppPath(user_id): AppPath<u64>,
) -> Json<Vec<Notification>> {
    Json(state.notifications.list_unread_by_user(user_id).await)
}

/// PUT /api/users/{user_id}/notifications/read-all
pub async fn mark_all_read(
    State(state): State<NotificationState>,
    AppPath(user_id): AppPath<u64>,
) -> Json<Vec<Notification>> {
    Json(state.notifications.mark_all_read(user_id).await)
}

pub async fn list_order_notifications(
    State(state): State<NotificationState>,
    AppPath(order_id): AppPath<u64>,
) -> Json<Vec<Notification>> {
    Json(state.notifications.list_by_order(order_id).await)
}
