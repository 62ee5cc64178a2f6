// libs/assistant-cell/src/services/assistant.rs
use std::sync::Arc;

use reqwest::Method;
use serde_json::{json, Value};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::SupabaseClient;
use shared_utils::clock::{system_clock, Clock};

use crate::models::{validate_question, AssistantError, ChatTurn, Exchange, HISTORY_EXCHANGES};
use crate::services::completion::CompletionClient;

const SYSTEM_PROMPT: &str = "You are the health information assistant of a telehealth clinic. \
Answer general health and wellness questions clearly and briefly. \
You cannot diagnose conditions or prescribe medication. \
When symptoms sound serious or persistent, advise booking an appointment with one of the clinic's doctors, \
and for emergencies tell the user to contact local emergency services immediately.";

pub struct AssistantService {
    supabase: Arc<SupabaseClient>,
    client: Option<CompletionClient>,
    clock: Arc<dyn Clock>,
}

impl AssistantService {
    pub fn new(config: &AppConfig) -> Self {
        Self::with_clock(config, system_clock())
    }

    pub fn with_clock(config: &AppConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
            client: CompletionClient::from_config(config),
            clock,
        }
    }

    /// Answers a question in the context of the caller's recent exchanges
    /// and stores the new exchange.
    #[instrument(skip(self, question, auth_token))]
    pub async fn ask(
        &self,
        user_id: Uuid,
        question: Option<&str>,
        auth_token: &str,
    ) -> Result<Exchange, AssistantError> {
        let question = validate_question(question)?;
        let client = self.client.as_ref().ok_or(AssistantError::NotConfigured)?;

        let recent = self.recent_exchanges(user_id, HISTORY_EXCHANGES, auth_token).await?;
        let messages = build_prompt(&recent, question);

        let answer = client.complete(&messages).await.map_err(|e| {
            warn!("Assistant completion failed for user {}: {:#}", user_id, e);
            AssistantError::Upstream(e.to_string())
        })?;

        let row = json!({
            "user_id": user_id,
            "question": question,
            "answer": answer,
            "created_at": self.clock.now().to_rfc3339()
        });

        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::POST,
            "/rest/v1/ai_conversations",
            Some(auth_token),
            Some(row),
            Some(SupabaseClient::representation_headers()),
        ).await?;

        let exchange = parse_exchanges(result)?
            .into_iter()
            .next()
            .ok_or_else(|| AssistantError::DatabaseError("Conversation insert returned no rows".to_string()))?;

        info!("Assistant answered user {} ({} prior exchanges)", user_id, recent.len());
        Ok(exchange)
    }

    /// The caller's exchanges, newest first.
    pub async fn history(&self, user_id: Uuid, auth_token: &str) -> Result<Vec<Exchange>, AssistantError> {
        let path = format!("/rest/v1/ai_conversations?user_id=eq.{}&order=created_at.desc", user_id);
        self.fetch(&path, auth_token).await
    }

    async fn recent_exchanges(
        &self,
        user_id: Uuid,
        limit: usize,
        auth_token: &str,
    ) -> Result<Vec<Exchange>, AssistantError> {
        let path = format!(
            "/rest/v1/ai_conversations?user_id=eq.{}&order=created_at.desc&limit={}",
            user_id, limit
        );
        self.fetch(&path, auth_token).await
    }

    async fn fetch(&self, path: &str, auth_token: &str) -> Result<Vec<Exchange>, AssistantError> {
        let rows: Vec<Value> = self.supabase.request(
            Method::GET,
            path,
            Some(auth_token),
            None,
        ).await?;

        parse_exchanges(rows)
    }
}

/// System prompt, then prior exchanges oldest first, then the new question.
/// `recent` arrives newest first, as the store returns it.
fn build_prompt(recent: &[Exchange], question: &str) -> Vec<ChatTurn> {
    let mut messages = Vec::with_capacity(recent.len() * 2 + 2);
    messages.push(ChatTurn::system(SYSTEM_PROMPT));

    for exchange in recent.iter().rev() {
        messages.push(ChatTurn::user(exchange.question.as_str()));
        messages.push(ChatTurn::assistant(exchange.answer.as_str()));
    }

    messages.push(ChatTurn::user(question));
    messages
}

fn parse_exchanges(rows: Vec<Value>) -> Result<Vec<Exchange>, AssistantError> {
    rows.into_iter()
        .map(serde_json::from_value)
        .collect::<Result<Vec<Exchange>, _>>()
        .map_err(|e| AssistantError::DatabaseError(format!("Failed to parse conversations: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn exchange(question: &str, answer: &str, hour: u32) -> Exchange {
        Exchange {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            question: question.to_string(),
            answer: answer.to_string(),
            created_at: Utc.with_ymd_and_hms(2025, 12, 1, hour, 0, 0).unwrap(),
        }
    }

    #[test]
    fn prompt_replays_history_oldest_first() {
        let recent = vec![exchange("second?", "two", 10), exchange("first?", "one", 9)];

        let messages = build_prompt(&recent, "third?");

        let contents: Vec<&str> = messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(messages[0].role, "system");
        assert_eq!(&contents[1..], ["first?", "one", "second?", "two", "third?"]);
        assert_eq!(messages.last().unwrap().role, "user");
    }
}
