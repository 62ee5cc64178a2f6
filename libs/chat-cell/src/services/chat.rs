// libs/chat-cell/src/services/chat.rs
use std::sync::Arc;

use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use auth_cell::IdentityService;
use notification_cell::{NewNotification, NotificationService, NotificationType};
use shared_config::AppConfig;
use shared_database::SupabaseClient;
use shared_models::auth::User;
use shared_utils::clock::{system_clock, Clock};

use crate::models::{counterpart_role, validate_content, ChatError, Message, SendMessageRequest};

const PREVIEW_CHARS: usize = 80;

/// Direct messages between a patient and a doctor.
pub struct ChatService {
    supabase: Arc<SupabaseClient>,
    identity: IdentityService,
    notifications: NotificationService,
    clock: Arc<dyn Clock>,
}

impl ChatService {
    pub fn new(config: &AppConfig) -> Self {
        Self::with_clock(config, system_clock())
    }

    pub fn with_clock(config: &AppConfig, clock: Arc<dyn Clock>) -> Self {
        let supabase = Arc::new(SupabaseClient::new(config));
        Self {
            identity: IdentityService::with_client(Arc::clone(&supabase), config),
            notifications: NotificationService::with_client(Arc::clone(&supabase), config),
            supabase,
            clock,
        }
    }

    #[instrument(skip(self, sender, request, auth_token), fields(sender = %sender.id))]
    pub async fn send(
        &self,
        sender: &User,
        request: SendMessageRequest,
        auth_token: &str,
    ) -> Result<Message, ChatError> {
        let receiver_id = request.receiver_id
            .ok_or_else(|| ChatError::ValidationError("Receiver ID is required".to_string()))?;
        let content = validate_content(request.content.as_deref())?;

        let sender_id = Uuid::parse_str(&sender.id)
            .map_err(|_| ChatError::Forbidden("Invalid caller id".to_string()))?;
        if sender_id == receiver_id {
            return Err(ChatError::ValidationError("Cannot send a message to yourself".to_string()));
        }

        let expected = sender.app_role()
            .and_then(counterpart_role)
            .ok_or_else(|| ChatError::Forbidden("Only patients and doctors can use chat".to_string()))?;

        let receiver = self.identity.get_user(receiver_id).await?;
        if receiver.role != expected {
            return Err(ChatError::Forbidden(format!("Messages can only be sent to a {}", expected)));
        }

        let row = json!({
            "sender_id": sender_id,
            "receiver_id": receiver_id,
            "content": content,
            "is_read": false,
            "created_at": self.clock.now().to_rfc3339()
        });

        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::POST,
            "/rest/v1/messages",
            Some(auth_token),
            Some(row),
            Some(SupabaseClient::representation_headers()),
        ).await?;

        let message = parse_messages(result)?
            .into_iter()
            .next()
            .ok_or_else(|| ChatError::DatabaseError("Message insert returned no rows".to_string()))?;

        debug!("Message {} stored", message.id);

        let preview: String = content.chars().take(PREVIEW_CHARS).collect();
        self.notifications.notify(
            NewNotification::new(receiver_id, NotificationType::Message, "New message", preview)
                .related_to(message.id),
        ).await;

        Ok(message)
    }

    /// Both directions of the thread between `caller_id` and `other_id`, oldest first.
    pub async fn conversation(
        &self,
        caller_id: Uuid,
        other_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<Message>, ChatError> {
        let path = format!(
            "/rest/v1/messages?or=(and(sender_id.eq.{a},receiver_id.eq.{b}),and(sender_id.eq.{b},receiver_id.eq.{a}))&order=created_at.asc",
            a = caller_id,
            b = other_id
        );

        let rows: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await?;

        parse_messages(rows)
    }

    /// Marks unread messages from `other_id` to the caller as read. Returns how many changed.
    pub async fn mark_read(
        &self,
        caller_id: Uuid,
        other_id: Uuid,
        auth_token: &str,
    ) -> Result<usize, ChatError> {
        let path = format!(
            "/rest/v1/messages?sender_id=eq.{}&receiver_id=eq.{}&is_read=eq.false",
            other_id, caller_id
        );

        let updated: Vec<Value> = self.supabase.request_with_headers(
            Method::PATCH,
            &path,
            Some(auth_token),
            Some(json!({ "is_read": true })),
            Some(SupabaseClient::representation_headers()),
        ).await?;

        info!("Marked {} messages from {} as read", updated.len(), other_id);
        Ok(updated.len())
    }
}

fn parse_messages(rows: Vec<Value>) -> Result<Vec<Message>, ChatError> {
    rows.into_iter()
        .map(serde_json::from_value)
        .collect::<Result<Vec<Message>, _>>()
        .map_err(|e| ChatError::DatabaseError(format!("Failed to parse messages: {}", e)))
}
