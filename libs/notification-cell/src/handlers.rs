// libs/notification-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, State},
    Json,
};
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;
use shared_utils::extractor::caller_id;

use crate::services::NotificationService;

#[axum::debug_handler]
pub async fn list_notifications(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let user_id = caller_id(&user)?;
    let service = NotificationService::new(&state);

    let notifications = service.list_for_user(user_id, auth.token()).await?;

    Ok(Json(json!({
        "notifications": notifications,
        "total": notifications.len()
    })))
}

#[axum::debug_handler]
pub async fn unread_count(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let user_id = caller_id(&user)?;
    let service = NotificationService::new(&state);

    let count = service.unread_count(user_id, auth.token()).await?;

    Ok(Json(json!({ "unreadCount": count })))
}

#[axum::debug_handler]
pub async fn mark_read(
    State(state): State<Arc<AppConfig>>,
    Path(notification_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let user_id = caller_id(&user)?;
    let service = NotificationService::new(&state);

    service.mark_read(notification_id, user_id, auth.token()).await?;

    Ok(Json(json!({ "message": "Notification marked as read" })))
}

#[axum::debug_handler]
pub async fn mark_all_read(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let user_id = caller_id(&user)?;
    let service = NotificationService::new(&state);

    service.mark_all_read(user_id, auth.token()).await?;

    Ok(Json(json!({ "message": "All notifications marked as read" })))
}

#[axum::debug_handler]
pub async fn delete_notification(
    State(state): State<Arc<AppConfig>>,
    Path(notification_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let user_id = caller_id(&user)?;
    let service = NotificationService::new(&state);

    service.delete(notification_id, user_id, auth.token()).await?;

    Ok(Json(json!({ "message": "Notification deleted" })))
}
