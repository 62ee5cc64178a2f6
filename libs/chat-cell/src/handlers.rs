// libs/chat-cell/src/handlers.rs
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

use crate::models::SendMessageRequest;
use crate::services::ChatService;

#[axum::debug_handler]
pub async fn send_message(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<SendMessageRequest>,
) -> Result<Json<Value>, AppError> {
    let message = ChatService::new(&state)
        .send(&user, request, auth.token())
        .await?;

    Ok(Json(json!({
        "message": "Message sent",
        "data": message
    })))
}

#[axum::debug_handler]
pub async fn get_conversation(
    State(state): State<Arc<AppConfig>>,
    Path(other_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let user_id = caller_id(&user)?;

    let messages = ChatService::new(&state)
        .conversation(user_id, other_id, auth.token())
        .await?;

    Ok(Json(json!({ "messages": messages })))
}

#[axum::debug_handler]
pub async fn mark_conversation_read(
    State(state): State<Arc<AppConfig>>,
    Path(other_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let user_id = caller_id(&user)?;

    let updated = ChatService::new(&state)
        .mark_read(user_id, other_id, auth.token())
        .await?;

    Ok(Json(json!({
        "message": "Messages marked as read",
        "updatedCount": updated
    })))
}
