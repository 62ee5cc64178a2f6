// libs/prescription-cell/src/models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use doctor_cell::DoctorError;
use shared_database::SupabaseError;
use shared_models::error::AppError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Medication {
    pub name: String,
    pub dosage: String,
    pub frequency: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
}

impl Medication {
    fn is_complete(&self) -> bool {
        [&self.name, &self.dosage, &self.frequency]
            .iter()
            .all(|field| !field.trim().is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prescription {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub patient_id: Uuid,
    pub appointment_id: Option<Uuid>,
    pub diagnosis: Option<String>,
    pub medications: Vec<Medication>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Prescription {
    pub fn is_participant(&self, user_id: Uuid) -> bool {
        self.doctor_id == user_id || self.patient_id == user_id
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePrescriptionRequest {
    pub patient_id: Option<Uuid>,
    pub appointment_id: Option<Uuid>,
    pub diagnosis: Option<String>,
    #[serde(default)]
    pub medications: Vec<Medication>,
    pub notes: Option<String>,
}

/// At least one medication, each with a name, dosage and frequency.
pub fn validate_medications(medications: &[Medication]) -> Result<(), PrescriptionError> {
    if medications.is_empty() {
        return Err(PrescriptionError::ValidationError(
            "At least one medication is required".to_string(),
        ));
    }

    if let Some(position) = medications.iter().position(|m| !m.is_complete()) {
        return Err(PrescriptionError::ValidationError(format!(
            "Medication {} needs a name, dosage and frequency",
            position + 1
        )));
    }

    Ok(())
}

/// Blank free-text fields are stored as null.
pub fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[derive(Debug, thiserror::Error)]
pub enum PrescriptionError {
    #[error("{0}")]
    ValidationError(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("Prescription not found")]
    NotFound,

    #[error("Doctor not found")]
    DoctorNotFound,

    #[error("Doctor is not approved to prescribe yet")]
    DoctorNotApproved,

    #[error("No approved appointment with this patient")]
    NoApprovedAppointment,

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<SupabaseError> for PrescriptionError {
    fn from(e: SupabaseError) -> Self {
        PrescriptionError::DatabaseError(e.to_string())
    }
}

impl From<DoctorError> for PrescriptionError {
    fn from(e: DoctorError) -> Self {
        match e {
            DoctorError::NotFound => PrescriptionError::DoctorNotFound,
            other => PrescriptionError::DatabaseError(other.to_string()),
        }
    }
}

impl From<PrescriptionError> for AppError {
    fn from(e: PrescriptionError) -> Self {
        match e {
            PrescriptionError::ValidationError(msg) => AppError::ValidationError(msg),
            PrescriptionError::Forbidden(msg) => AppError::Forbidden(msg),
            PrescriptionError::NotFound | PrescriptionError::DoctorNotFound => AppError::NotFound(e.to_string()),
            PrescriptionError::DoctorNotApproved | PrescriptionError::NoApprovedAppointment => {
                AppError::State(e.to_string())
            }
            PrescriptionError::DatabaseError(msg) => AppError::Database(msg),
        }
    }
}
