use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use auth_cell::{AuthError, UserProfile};
use shared_database::SupabaseError;
use shared_models::auth::{ApprovalStatus, Role};
use shared_models::error::AppError;
use shared_utils::upload::{FileUpload, UploadError};

/// Files accepted in one document resubmission.
pub const MAX_DOCUMENTS_PER_UPLOAD: usize = 5;

/// Doctor view of a `users` row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Doctor {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub specialization: Option<String>,
    pub consultation_fee: Option<f64>,
    pub approval_status: ApprovalStatus,
    #[serde(default)]
    pub document_urls: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Doctor {
    pub fn is_approved(&self) -> bool {
        self.approval_status == ApprovalStatus::Approved
    }
}

impl TryFrom<UserProfile> for Doctor {
    type Error = DoctorError;

    fn try_from(profile: UserProfile) -> Result<Self, Self::Error> {
        if profile.role != Role::Doctor {
            return Err(DoctorError::NotFound);
        }

        Ok(Doctor {
            id: profile.id,
            email: profile.email,
            full_name: profile.full_name,
            specialization: profile.specialization,
            consultation_fee: profile.consultation_fee,
            // Rows written before the approval column existed read as pending
            approval_status: profile.approval_status.unwrap_or(ApprovalStatus::Pending),
            document_urls: profile.document_urls,
            rejection_reason: profile.rejection_reason,
            created_at: profile.created_at,
            updated_at: profile.updated_at,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApprovalDecision {
    pub status: ApprovalStatus,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DocumentResubmission {
    pub files: Vec<FileUpload>,
}

#[derive(Debug, thiserror::Error)]
pub enum DoctorError {
    #[error("Doctor not found")]
    NotFound,

    #[error("{0}")]
    InvalidDecision(String),

    #[error("Doctor is {from}; cannot move to {to}")]
    InvalidTransition { from: ApprovalStatus, to: ApprovalStatus },

    #[error("Approved doctors cannot resubmit documents")]
    AlreadyApproved,

    #[error("At least one document is required")]
    NoDocuments,

    #[error("At most {0} documents can be uploaded at once")]
    TooManyDocuments(usize),

    #[error("Invalid document: {0}")]
    InvalidDocument(#[from] UploadError),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<SupabaseError> for DoctorError {
    fn from(e: SupabaseError) -> Self {
        DoctorError::DatabaseError(e.to_string())
    }
}

impl From<AuthError> for DoctorError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::UserNotFound => DoctorError::NotFound,
            other => DoctorError::DatabaseError(other.to_string()),
        }
    }
}

impl From<DoctorError> for AppError {
    fn from(e: DoctorError) -> Self {
        match e {
            DoctorError::NotFound => AppError::NotFound(e.to_string()),
            DoctorError::InvalidDecision(msg) => AppError::ValidationError(msg),
            DoctorError::NoDocuments
            | DoctorError::TooManyDocuments(_)
            | DoctorError::InvalidDocument(_) => {
                AppError::ValidationError(e.to_string())
            }
            DoctorError::InvalidTransition { .. } | DoctorError::AlreadyApproved => {
                AppError::State(e.to_string())
            }
            DoctorError::DatabaseError(msg) => AppError::Database(msg),
        }
    }
}
