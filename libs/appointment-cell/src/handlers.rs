// libs/appointment-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State, Extension},
    Json,
};
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::{Role, User};
use shared_models::error::AppError;
use shared_utils::clock::system_clock;
use shared_utils::extractor::{caller_id, require_role};

use crate::models::{
    parse_date, AppointmentError, BookAppointmentRequest, BookedSlotsQuery, StatusDecisionRequest,
    UploadProofRequest,
};
use crate::services::{
    AppointmentApprovalService, AppointmentBookingService, ExpirySweeper, PaymentProofService,
    ReminderSweeper, Sweep,
};

// ==============================================================================
// BOOKING
// ==============================================================================

#[axum::debug_handler]
pub async fn list_doctors(
    State(state): State<Arc<AppConfig>>,
) -> Result<Json<Value>, AppError> {
    let doctors = AppointmentBookingService::new(&state).list_bookable_doctors().await?;

    Ok(Json(json!({ "doctors": doctors })))
}

#[axum::debug_handler]
pub async fn booked_slots(
    State(state): State<Arc<AppConfig>>,
    Path(doctor_id): Path<Uuid>,
    Query(query): Query<BookedSlotsQuery>,
) -> Result<Json<Value>, AppError> {
    let date = query.date.as_deref()
        .and_then(parse_date)
        .ok_or_else(|| AppointmentError::ValidationError("A date (YYYY-MM-DD) is required".to_string()))?;

    let slots = AppointmentBookingService::new(&state).booked_slots(doctor_id, date).await?;
    let slots: Vec<String> = slots.iter().map(|t| t.format("%H:%M").to_string()).collect();

    Ok(Json(json!({ "bookedSlots": slots })))
}

#[axum::debug_handler]
pub async fn book_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<BookAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let appointment = AppointmentBookingService::new(&state)
        .book(&user, request, auth.token())
        .await?;

    Ok(Json(json!({
        "message": "Appointment booked successfully. Please upload your payment screenshot.",
        "appointment": appointment
    })))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let appointment = AppointmentBookingService::new(&state)
        .get_appointment(appointment_id, &user)
        .await?;

    Ok(Json(json!({ "appointment": appointment })))
}

// ==============================================================================
// PAYMENT AND APPROVAL
// ==============================================================================

#[axum::debug_handler]
pub async fn upload_screenshot(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<UploadProofRequest>,
) -> Result<Json<Value>, AppError> {
    let appointment_id = request.appointment_id
        .ok_or_else(|| AppointmentError::ValidationError("Appointment ID is required".to_string()))?;
    let patient_id = caller_id(&user)?;

    let url = PaymentProofService::new(&state)
        .upload_proof(appointment_id, patient_id, request.file, auth.token())
        .await?;

    Ok(Json(json!({
        "message": "Payment screenshot uploaded. An admin will review it shortly.",
        "screenshotUrl": url
    })))
}

#[axum::debug_handler]
pub async fn update_status(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<StatusDecisionRequest>,
) -> Result<Json<Value>, AppError> {
    let appointment = AppointmentApprovalService::new(&state)
        .set_status(&user, request, auth.token())
        .await?;

    Ok(Json(json!({
        "message": format!("Appointment {} successfully", appointment.status)
    })))
}

// ==============================================================================
// LISTINGS
// ==============================================================================

#[axum::debug_handler]
pub async fn patient_appointments(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    require_role(&user, Role::Patient)?;
    let patient_id = caller_id(&user)?;

    let appointments = AppointmentBookingService::new(&state)
        .list_for_patient(patient_id, auth.token())
        .await?;

    Ok(Json(json!({ "appointments": appointments })))
}

#[axum::debug_handler]
pub async fn doctor_appointments(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    require_role(&user, Role::Doctor)?;
    let doctor_id = caller_id(&user)?;

    let appointments = AppointmentBookingService::new(&state)
        .list_for_doctor(doctor_id, auth.token())
        .await?;

    Ok(Json(json!({ "appointments": appointments })))
}

#[axum::debug_handler]
pub async fn all_appointments(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    require_role(&user, Role::Admin)?;

    let appointments = AppointmentBookingService::new(&state)
        .list_all(auth.token())
        .await?;

    Ok(Json(json!({ "appointments": appointments })))
}

// ==============================================================================
// SWEEPS (internal)
// ==============================================================================

#[axum::debug_handler]
pub async fn check_expired(
    State(state): State<Arc<AppConfig>>,
) -> Result<Json<Value>, AppError> {
    let report = ExpirySweeper::new(&state, system_clock()).run().await?;

    Ok(Json(json!({
        "message": format!("Expired {} appointments", report.changed),
        "expiredCount": report.changed
    })))
}

#[axum::debug_handler]
pub async fn send_reminders(
    State(state): State<Arc<AppConfig>>,
) -> Result<Json<Value>, AppError> {
    let report = ReminderSweeper::new(&state, system_clock()).run().await?;

    Ok(Json(json!({
        "message": format!("Sent {} reminders", report.changed),
        "remindersSent": report.changed,
        "appointmentsChecked": report.matched
    })))
}
