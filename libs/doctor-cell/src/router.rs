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
use crate::models::MAX_DOCUMENTS_PER_UPLOAD;

pub fn doctor_routes(state: Arc<AppConfig>) -> Router {
    let protected_routes = Router::new()
        .route("/pending", get(handlers::list_pending_doctors))
        .route(
            "/documents",
            post(handlers::resubmit_documents)
                .layer(DefaultBodyLimit::max(upload_body_limit(MAX_DOCUMENTS_PER_UPLOAD))),
        )
        .route("/{doctor_id}", get(handlers::get_doctor))
        .route("/{doctor_id}/approval", put(handlers::set_approval))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(protected_routes)
        .with_state(state)
}
