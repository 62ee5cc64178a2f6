// libs/chat-cell/src/models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use auth_cell::AuthError;
use shared_database::SupabaseError;
use shared_models::auth::Role;
use shared_models::error::AppError;

pub const MAX_MESSAGE_CHARS: usize = 4000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub content: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub receiver_id: Option<Uuid>,
    pub content: Option<String>,
}

/// Chat only runs between a patient and a doctor. Returns the role the
/// other side must have, or `None` if `role` cannot chat at all.
pub fn counterpart_role(role: Role) -> Option<Role> {
    match role {
        Role::Patient => Some(Role::Doctor),
        Role::Doctor => Some(Role::Patient),
        Role::Admin => None,
    }
}

/// Trimmed message body, or why it was refused.
pub fn validate_content(content: Option<&str>) -> Result<&str, ChatError> {
    let content = content.map(str::trim).unwrap_or_default();

    if content.is_empty() {
        return Err(ChatError::ValidationError("Message content is required".to_string()));
    }
    if content.chars().count() > MAX_MESSAGE_CHARS {
        return Err(ChatError::ValidationError(format!(
            "Message content cannot exceed {} characters",
            MAX_MESSAGE_CHARS
        )));
    }

    Ok(content)
}

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("{0}")]
    ValidationError(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("Recipient not found")]
    RecipientNotFound,

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<SupabaseError> for ChatError {
    fn from(e: SupabaseError) -> Self {
        ChatError::DatabaseError(e.to_string())
    }
}

impl From<AuthError> for ChatError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::UserNotFound => ChatError::RecipientNotFound,
            other => ChatError::DatabaseError(other.to_string()),
        }
    }
}

impl From<ChatError> for AppError {
    fn from(e: ChatError) -> Self {
        match e {
            ChatError::ValidationError(msg) => AppError::ValidationError(msg),
            ChatError::Forbidden(msg) => AppError::Forbidden(msg),
            ChatError::RecipientNotFound => AppError::NotFound(e.to_string()),
            ChatError::DatabaseError(msg) => AppError::Database(msg),
        }
    }
}
