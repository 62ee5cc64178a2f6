// libs/assistant-cell/src/services/completion.rs
use anyhow::{anyhow, Context, Result};
use reqwest::{header, Client};
use serde_json::{json, Value};
use tracing::{debug, error};

use shared_config::AppConfig;

use crate::models::ChatTurn;

/// Thin client for an OpenAI-compatible `/chat/completions` endpoint.
pub struct CompletionClient {
    http_client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl CompletionClient {
    /// `None` when no API key is configured.
    pub fn from_config(config: &AppConfig) -> Option<Self> {
        if !config.is_assistant_configured() {
            return None;
        }

        Some(Self {
            http_client: Client::new(),
            api_key: config.openai_api_key.clone(),
            base_url: config.openai_base_url.trim_end_matches('/').to_string(),
            model: config.openai_model.clone(),
        })
    }

    pub async fn complete(&self, messages: &[ChatTurn]) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!("Sending {} messages to {}", messages.len(), url);

        let body = json!({
            "model": self.model,
            "messages": messages,
            "temperature": 0.3
        });

        let response = self.http_client.post(&url)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.api_key))
            .header(header::CONTENT_TYPE, "application/json")
            .json(&body)
            .send()
            .await
            .context("completion request could not be sent")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            error!("Completion endpoint returned {}: {}", status, error_text);
            return Err(anyhow!("completion endpoint returned {}", status));
        }

        let reply: Value = response.json().await.context("completion response was not JSON")?;
        let answer = reply["choices"][0]["message"]["content"].as_str()
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .ok_or_else(|| anyhow!("completion response had no message content"))?;

        Ok(answer.to_string())
    }
}
