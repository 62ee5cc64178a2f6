// libs/assistant-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, State},
    Json,
};
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};
use serde_json::{json, Value};

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;
use shared_utils::extractor::caller_id;

use crate::models::AskRequest;
use crate::services::AssistantService;

#[axum::debug_handler]
pub async fn ask(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<AskRequest>,
) -> Result<Json<Value>, AppError> {
    let user_id = caller_id(&user)?;

    let exchange = AssistantService::new(&state)
        .ask(user_id, request.question.as_deref(), auth.token())
        .await?;

    Ok(Json(json!({ "answer": exchange.answer })))
}

#[axum::debug_handler]
pub async fn history(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let user_id = caller_id(&user)?;

    let exchanges = AssistantService::new(&state)
        .history(user_id, auth.token())
        .await?;

    Ok(Json(json!({ "conversations": exchanges })))
}
