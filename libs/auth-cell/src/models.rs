use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_database::SupabaseError;
use shared_models::auth::{ApprovalStatus, Role};
use shared_models::error::AppError;

/// A row of the `users` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub role: Role,
    pub age: Option<i32>,
    pub gender: Option<String>,
    pub specialization: Option<String>,
    pub consultation_fee: Option<f64>,
    pub approval_status: Option<ApprovalStatus>,
    #[serde(default)]
    pub document_urls: Vec<String>,
    pub rejection_reason: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl UserProfile {
    pub fn is_approved_doctor(&self) -> bool {
        self.role == Role::Doctor && self.approval_status == Some(ApprovalStatus::Approved)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub full_name: String,
    pub role: Role,
    pub age: Option<i32>,
    pub gender: Option<String>,
    pub specialization: Option<String>,
    pub consultation_fee: Option<f64>,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("Admin accounts cannot be self-registered")]
    RoleNotSelfRegistrable,

    #[error("An account with this email already exists")]
    EmailTaken,

    #[error("User not found")]
    UserNotFound,

    #[error("Signup failed: {0}")]
    SignupFailed(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<SupabaseError> for AuthError {
    fn from(e: SupabaseError) -> Self {
        match e {
            SupabaseError::UniqueViolation(_) => AuthError::EmailTaken,
            other => AuthError::DatabaseError(other.to_string()),
        }
    }
}

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::InvalidInput(msg) => AppError::ValidationError(msg),
            AuthError::RoleNotSelfRegistrable => AppError::ValidationError(e.to_string()),
            AuthError::EmailTaken => AppError::Conflict(e.to_string()),
            AuthError::UserNotFound => AppError::NotFound(e.to_string()),
            AuthError::SignupFailed(msg) => AppError::ExternalService(msg),
            AuthError::DatabaseError(msg) => AppError::Database(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn register_request_uses_camel_case() {
        let request: RegisterRequest = serde_json::from_value(json!({
            "email": "doc@example.com",
            "password": "secret123",
            "fullName": "Dr. Who",
            "role": "doctor",
            "specialization": "Cardiology",
            "consultationFee": 80.0
        }))
        .unwrap();

        assert_eq!(request.role, Role::Doctor);
        assert_eq!(request.consultation_fee, Some(80.0));
        assert!(request.age.is_none());
    }

    #[test]
    fn approved_doctor_check() {
        let mut profile: UserProfile = serde_json::from_value(json!({
            "id": Uuid::new_v4(),
            "email": "doc@example.com",
            "full_name": "Dr. Who",
            "role": "doctor",
            "age": null,
            "gender": null,
            "specialization": "Cardiology",
            "consultation_fee": 80.0,
            "approval_status": "pending",
            "rejection_reason": null,
            "created_at": null,
            "updated_at": null
        }))
        .unwrap();

        assert!(!profile.is_approved_doctor());
        profile.approval_status = Some(ApprovalStatus::Approved);
        assert!(profile.is_approved_doctor());
    }
}
