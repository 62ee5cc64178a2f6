// libs/appointment-cell/src/router.rs
use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post, put},
    middleware,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;
use shared_utils::upload::upload_body_limit;

use crate::handlers;

pub fn appointment_routes(state: Arc<AppConfig>) -> Router {
    // Sweep triggers for operators and cron jobs; no caller identity
    let internal_routes = Router::new()
        .route("/check-expired", post(handlers::check_expired))
        .route("/send-reminders", post(handlers::send_reminders));

    let protected_routes = Router::new()
        .route("/doctors", get(handlers::list_doctors))
        .route("/doctor/{doctor_id}/booked-slots", get(handlers::booked_slots))
        .route("/book", post(handlers::book_appointment))
        .route(
            "/upload-screenshot",
            post(handlers::upload_screenshot).layer(DefaultBodyLimit::max(upload_body_limit(1))),
        )
        .route("/patient", get(handlers::patient_appointments))
        .route("/doctor", get(handlers::doctor_appointments))
        .route("/all", get(handlers::all_appointments))
        .route("/status", put(handlers::update_status))
        .route("/{appointment_id}", get(handlers::get_appointment))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(internal_routes)
        .merge(protected_routes)
        .with_state(state)
}
