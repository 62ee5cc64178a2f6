// libs/assistant-cell/src/models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_database::SupabaseError;
use shared_models::error::AppError;

pub const MAX_QUESTION_CHARS: usize = 2000;

/// Earlier exchanges replayed to the model on each question.
pub const HISTORY_EXCHANGES: usize = 10;

/// One stored question/answer pair from `ai_conversations`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Exchange {
    pub id: Uuid,
    pub user_id: Uuid,
    pub question: String,
    pub answer: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AskRequest {
    pub question: Option<String>,
}

/// A chat-completions message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
}

impl ChatTurn {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".to_string(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: "assistant".to_string(), content: content.into() }
    }
}

pub fn validate_question(question: Option<&str>) -> Result<&str, AssistantError> {
    let question = question.map(str::trim).unwrap_or_default();

    if question.is_empty() {
        return Err(AssistantError::ValidationError("A question is required".to_string()));
    }
    if question.chars().count() > MAX_QUESTION_CHARS {
        return Err(AssistantError::ValidationError(format!(
            "Questions cannot exceed {} characters",
            MAX_QUESTION_CHARS
        )));
    }

    Ok(question)
}

#[derive(Debug, thiserror::Error)]
pub enum AssistantError {
    #[error("{0}")]
    ValidationError(String),

    #[error("Assistant is not configured")]
    NotConfigured,

    #[error("Assistant request failed: {0}")]
    Upstream(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<SupabaseError> for AssistantError {
    fn from(e: SupabaseError) -> Self {
        AssistantError::DatabaseError(e.to_string())
    }
}

impl From<AssistantError> for AppError {
    fn from(e: AssistantError) -> Self {
        match e {
            AssistantError::ValidationError(msg) => AppError::ValidationError(msg),
            AssistantError::NotConfigured | AssistantError::Upstream(_) => AppError::ExternalService(e.to_string()),
            AssistantError::DatabaseError(msg) => AppError::Database(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn question_bounds() {
        assert_eq!(validate_question(Some(" What is a normal heart rate? ")).unwrap(), "What is a normal heart rate?");
        assert_matches!(validate_question(Some("")), Err(AssistantError::ValidationError(_)));
        assert_matches!(validate_question(None), Err(AssistantError::ValidationError(_)));
        assert!(validate_question(Some(&"q".repeat(MAX_QUESTION_CHARS))).is_ok());
        assert_matches!(
            validate_question(Some(&"q".repeat(MAX_QUESTION_CHARS + 1))),
            Err(AssistantError::ValidationError(_))
        );
    }

    #[test]
    fn unconfigured_assistant_is_a_gateway_error() {
        let err: AppError = AssistantError::NotConfigured.into();
        assert_eq!(err.status_code(), axum::http::StatusCode::BAD_GATEWAY);
    }
}
