// libs/prescription-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
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

use crate::models::CreatePrescriptionRequest;
use crate::services::PrescriptionService;

#[axum::debug_handler]
pub async fn create_prescription(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreatePrescriptionRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let prescription = PrescriptionService::new(&state)
        .create(&user, request, auth.token())
        .await?;

    Ok((StatusCode::CREATED, Json(json!({
        "message": "Prescription created",
        "prescription": prescription
    }))))
}

#[axum::debug_handler]
pub async fn patient_prescriptions(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    require_role(&user, Role::Patient)?;
    let patient_id = caller_id(&user)?;

    let prescriptions = PrescriptionService::new(&state)
        .list_for_patient(patient_id, auth.token())
        .await?;

    Ok(Json(json!({ "prescriptions": prescriptions })))
}

#[axum::debug_handler]
pub async fn doctor_prescriptions(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    require_role(&user, Role::Doctor)?;
    let doctor_id = caller_id(&user)?;

    let prescriptions = PrescriptionService::new(&state)
        .list_for_doctor(doctor_id, auth.token())
        .await?;

    Ok(Json(json!({ "prescriptions": prescriptions })))
}

#[axum::debug_handler]
pub async fn get_prescription(
    State(state): State<Arc<AppConfig>>,
    Path(prescription_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let prescription = PrescriptionService::new(&state)
        .get(prescription_id, &user)
        .await?;

    Ok(Json(json!({ "prescription": prescription })))
}
