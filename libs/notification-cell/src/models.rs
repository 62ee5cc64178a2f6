// libs/notification-cell/src/models.rs
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_database::SupabaseError;
use shared_models::error::AppError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub title: String,
    pub message: String,
    pub related_id: Option<Uuid>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    Appointment,
    Reminder,
    System,
    Prescription,
    Message,
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotificationType::Appointment => write!(f, "appointment"),
            NotificationType::Reminder => write!(f, "reminder"),
            NotificationType::System => write!(f, "system"),
            NotificationType::Prescription => write!(f, "prescription"),
            NotificationType::Message => write!(f, "message"),
        }
    }
}

/// Row written to the notifications table. Everything else on a
/// notification is filled in by the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewNotification {
    pub user_id: Uuid,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub title: String,
    pub message: String,
    pub related_id: Option<Uuid>,
}

impl NewNotification {
    pub fn new(user_id: Uuid, kind: NotificationType, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            user_id,
            kind,
            title: title.into(),
            message: message.into(),
            related_id: None,
        }
    }

    pub fn related_to(mut self, related_id: Uuid) -> Self {
        self.related_id = Some(related_id);
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("Notification not found")]
    NotFound,

    #[error("Notification belongs to another user")]
    NotOwner,

    #[error("Invalid user id: {0}")]
    InvalidUserId(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<SupabaseError> for NotificationError {
    fn from(e: SupabaseError) -> Self {
        NotificationError::DatabaseError(e.to_string())
    }
}

impl From<NotificationError> for AppError {
    fn from(e: NotificationError) -> Self {
        match e {
            NotificationError::NotFound => AppError::NotFound(e.to_string()),
            NotificationError::NotOwner => AppError::Forbidden(e.to_string()),
            NotificationError::InvalidUserId(_) => AppError::BadRequest(e.to_string()),
            NotificationError::DatabaseError(msg) => AppError::Database(msg),
        }
    }
}
