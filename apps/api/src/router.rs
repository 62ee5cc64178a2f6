use std::sync::Arc;

use axum::{
    Router,
    routing::get,
};

use appointment_cell::appointment_routes;
use assistant_cell::assistant_routes;
use auth_cell::auth_routes;
use chat_cell::chat_routes;
use doctor_cell::doctor_routes;
use notification_cell::notification_routes;
use prescription_cell::prescription_routes;
use shared_config::AppConfig;

pub fn create_router(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/", get(|| async { "Telecare API is running!" }))
        .nest("/auth", auth_routes(state.clone()))
        .nest("/doctors", doctor_routes(state.clone()))
        .nest("/appointments", appointment_routes(state.clone()))
        .nest("/notifications", notification_routes(state.clone()))
        .nest("/chat", chat_routes(state.clone()))
        .nest("/prescriptions", prescription_routes(state.clone()))
        .nest("/assistant", assistant_routes(state))
}
