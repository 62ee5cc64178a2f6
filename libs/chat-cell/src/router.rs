// libs/chat-cell/src/router.rs
use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post, put},
    middleware,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn chat_routes(state: Arc<AppConfig>) -> Router {
    let protected_routes = Router::new()
        .route("/messages", post(handlers::send_message))
        .route("/conversations/{user_id}", get(handlers::get_conversation))
        .route("/conversations/{user_id}/read", put(handlers::mark_conversation_read))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(protected_routes)
        .with_state(state)
}
