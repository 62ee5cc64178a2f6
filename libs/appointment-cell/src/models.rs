// libs/appointment-cell/src/models.rs
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use doctor_cell::DoctorError;
use notification_cell::NotificationError;
use shared_database::SupabaseError;
use shared_models::error::AppError;
use shared_utils::upload::{FileUpload, UploadError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub appointment_date: NaiveDate,
    #[serde(with = "slot_time")]
    pub appointment_time: NaiveTime,
    pub status: AppointmentStatus,
    pub payment_screenshot_url: Option<String>,
    pub screenshot_uploaded_at: Option<DateTime<Utc>>,
    pub admin_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Appointment {
    pub fn has_payment_proof(&self) -> bool {
        self.payment_screenshot_url
            .as_deref()
            .is_some_and(|url| !url.trim().is_empty())
    }

    pub fn is_participant(&self, user_id: Uuid) -> bool {
        self.patient_id == user_id || self.doctor_id == user_id
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentStatus {
    Pending,
    Approved,
    Rejected,
    Expired,
}

impl AppointmentStatus {
    /// Statuses that hold a slot.
    pub const ACTIVE: [AppointmentStatus; 2] = [AppointmentStatus::Pending, AppointmentStatus::Approved];

    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "pending",
            AppointmentStatus::Approved => "approved",
            AppointmentStatus::Rejected => "rejected",
            AppointmentStatus::Expired => "expired",
        }
    }

    /// PostgREST `in.(...)` list of the slot-holding statuses.
    pub fn active_filter() -> String {
        let statuses = Self::ACTIVE.iter().map(|s| s.as_str()).collect::<Vec<_>>();
        format!("in.({})", statuses.join(","))
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppointmentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(AppointmentStatus::Pending),
            "approved" => Ok(AppointmentStatus::Approved),
            "rejected" => Ok(AppointmentStatus::Rejected),
            "expired" => Ok(AppointmentStatus::Expired),
            other => Err(format!("Unknown appointment status: {}", other)),
        }
    }
}

// Request bodies keep every field optional so a missing field is reported
// as a validation error by the service rather than a JSON rejection.

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookAppointmentRequest {
    pub doctor_id: Option<Uuid>,
    pub appointment_date: Option<String>,
    pub appointment_time: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadProofRequest {
    pub appointment_id: Option<Uuid>,
    #[serde(flatten)]
    pub file: FileUpload,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusDecisionRequest {
    pub appointment_id: Option<Uuid>,
    pub status: Option<String>,
    pub admin_notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BookedSlotsQuery {
    pub date: Option<String>,
}

/// Validated booking: the three required fields, parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotRequest {
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    pub time: NaiveTime,
}

pub fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").ok()
}

pub fn parse_slot_time(value: &str) -> Option<NaiveTime> {
    let value = value.trim();
    NaiveTime::parse_from_str(value, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M"))
        .ok()
}

/// Store form of a slot time, used in filters and inserts.
pub fn store_time(time: &NaiveTime) -> String {
    time.format("%H:%M:%S").to_string()
}

/// Slot times travel as `HH:MM`; the store hands back `HH:MM:SS`.
pub mod slot_time {
    use chrono::NaiveTime;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_slot_time(&raw)
            .ok_or_else(|| de::Error::custom(format!("invalid slot time: {}", raw)))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppointmentError {
    #[error("{0}")]
    ValidationError(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("Appointment not found")]
    NotFound,

    #[error("Doctor not found")]
    DoctorNotFound,

    #[error("Doctor is not approved for appointments yet")]
    DoctorNotApproved,

    #[error("This time slot is already booked")]
    SlotTaken,

    #[error("Appointment expired, please book a new one")]
    Expired,

    #[error("Cannot decide without payment screenshot")]
    MissingPaymentProof,

    #[error("Appointment is already {0}")]
    NotPending(AppointmentStatus),

    #[error("Appointment was changed by another request; reload and try again")]
    Superseded,

    #[error("Invalid payment screenshot: {0}")]
    InvalidUpload(#[from] UploadError),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<SupabaseError> for AppointmentError {
    fn from(e: SupabaseError) -> Self {
        AppointmentError::DatabaseError(e.to_string())
    }
}

impl From<DoctorError> for AppointmentError {
    fn from(e: DoctorError) -> Self {
        match e {
            DoctorError::NotFound => AppointmentError::DoctorNotFound,
            other => AppointmentError::DatabaseError(other.to_string()),
        }
    }
}

impl From<NotificationError> for AppointmentError {
    fn from(e: NotificationError) -> Self {
        AppointmentError::DatabaseError(e.to_string())
    }
}

impl From<AppointmentError> for AppError {
    fn from(e: AppointmentError) -> Self {
        match e {
            AppointmentError::ValidationError(msg) => AppError::ValidationError(msg),
            AppointmentError::InvalidUpload(_) => AppError::ValidationError(e.to_string()),
            AppointmentError::Forbidden(msg) => AppError::Forbidden(msg),
            AppointmentError::NotFound | AppointmentError::DoctorNotFound => {
                AppError::NotFound(e.to_string())
            }
            AppointmentError::SlotTaken => AppError::Conflict(e.to_string()),
            AppointmentError::DoctorNotApproved
            | AppointmentError::Expired
            | AppointmentError::MissingPaymentProof
            | AppointmentError::NotPending(_)
            | AppointmentError::Superseded => AppError::State(e.to_string()),
            AppointmentError::DatabaseError(msg) => AppError::Database(msg),
        }
    }
}
