use std::sync::Arc;

use axum::{
    extract::{Path, State, Extension},
    Json,
};
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::{Role, User};
use shared_models::error::AppError;
use shared_utils::extractor::{caller_id, require_role};

use crate::models::{ApprovalDecision, DocumentResubmission};
use crate::services::DoctorService;

#[axum::debug_handler]
pub async fn get_doctor(
    State(state): State<Arc<AppConfig>>,
    Path(doctor_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let doctor = DoctorService::new(&state).get_doctor(doctor_id).await?;

    Ok(Json(json!({ "doctor": doctor })))
}

#[axum::debug_handler]
pub async fn list_pending_doctors(
    State(state): State<Arc<AppConfig>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    require_role(&user, Role::Admin)?;

    let doctors = DoctorService::new(&state).list_pending().await?;

    Ok(Json(json!({
        "doctors": doctors,
        "total": doctors.len()
    })))
}

#[axum::debug_handler]
pub async fn set_approval(
    State(state): State<Arc<AppConfig>>,
    Path(doctor_id): Path<Uuid>,
    Extension(user): Extension<User>,
    Json(decision): Json<ApprovalDecision>,
) -> Result<Json<Value>, AppError> {
    require_role(&user, Role::Admin)?;

    let status = decision.status;
    let doctor = DoctorService::new(&state).set_approval(doctor_id, decision).await?;

    Ok(Json(json!({
        "message": format!("Doctor {} successfully", status),
        "doctor": doctor
    })))
}

#[axum::debug_handler]
pub async fn resubmit_documents(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(payload): Json<DocumentResubmission>,
) -> Result<Json<Value>, AppError> {
    require_role(&user, Role::Doctor)?;
    let doctor_id = caller_id(&user)?;

    let doctor = DoctorService::new(&state)
        .resubmit_documents(doctor_id, payload.files, auth.token())
        .await?;

    Ok(Json(json!({
        "message": "Documents submitted for review",
        "doctor": doctor
    })))
}
