use reqwest::{
    Client,
    header::{HeaderMap, HeaderValue, CONTENT_TYPE, AUTHORIZATION},
    Method,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error};

use shared_config::AppConfig;

/// SQLSTATE raised by Postgres for a unique index violation.
const UNIQUE_VIOLATION: &str = "23505";

#[derive(Debug, Error)]
pub enum SupabaseError {
    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl SupabaseError {
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, SupabaseError::UniqueViolation(_))
    }

    fn from_status(status: u16, body: String) -> Self {
        let code = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| v.get("code").and_then(|c| c.as_str()).map(str::to_string));

        match (status, code.as_deref()) {
            (_, Some(UNIQUE_VIOLATION)) | (409, None) => SupabaseError::UniqueViolation(body),
            (401 | 403, _) => SupabaseError::Auth(body),
            (404, _) => SupabaseError::NotFound(body),
            _ => SupabaseError::Api { status, message: body },
        }
    }
}

pub type SupabaseResult<T> = std::result::Result<T, SupabaseError>;

pub struct SupabaseClient {
    client: Client,
    base_url: String,
    anon_key: String,
}

impl SupabaseClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.supabase_url.clone(),
            anon_key: config.supabase_anon_key.clone(),
        }
    }

    fn get_headers(&self, auth_token: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();

        if let Ok(key) = HeaderValue::from_str(&self.anon_key) {
            headers.insert("apikey", key);
        }
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(token) = auth_token {
            if let Ok(bearer) = HeaderValue::from_str(&format!("Bearer {}", token)) {
                headers.insert(AUTHORIZATION, bearer);
            }
        }

        headers
    }

    /// Headers asking PostgREST to echo the written rows back.
    pub fn representation_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("Prefer", HeaderValue::from_static("return=representation"));
        headers
    }

    pub async fn request<T>(&self, method: Method, path: &str,
                            auth_token: Option<&str>, body: Option<Value>)
                            -> SupabaseResult<T>
    where T: DeserializeOwned {
        self.request_with_headers(method, path, auth_token, body, None).await
    }

    pub async fn request_with_headers<T>(&self, method: Method, path: &str,
                                         auth_token: Option<&str>, body: Option<Value>,
                                         extra_headers: Option<HeaderMap>)
                                         -> SupabaseResult<T>
    where T: DeserializeOwned {
        let url = format!("{}{}", self.base_url, path);
        debug!("Making {} request to {}", method, url);

        let mut headers = self.get_headers(auth_token);
        if let Some(extra) = extra_headers {
            headers.extend(extra);
        }

        let mut req = self.client.request(method, &url)
            .headers(headers);

        if let Some(body_data) = body {
            req = req.json(&body_data);
        }

        let response = req.send().await?;
        Self::decode(response).await
    }

    /// Upload raw bytes to a storage bucket and return the public URL of the object.
    pub async fn upload_object(&self, bucket: &str, object_path: &str,
                               bytes: Vec<u8>, content_type: &str,
                               auth_token: &str) -> SupabaseResult<String> {
        let url = format!("{}/storage/v1/object/{}/{}", self.base_url, bucket, object_path);
        debug!("Uploading {} bytes to {}", bytes.len(), url);

        let mut headers = self.get_headers(Some(auth_token));
        let content_type = HeaderValue::from_str(content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
        headers.insert(CONTENT_TYPE, content_type);
        headers.insert("x-upsert", HeaderValue::from_static("true"));

        let response = self.client.post(&url)
            .headers(headers)
            .body(bytes)
            .send()
            .await?;

        let _: Value = Self::decode(response).await?;

        Ok(self.get_public_url(&format!("/storage/v1/object/public/{}/{}", bucket, object_path)))
    }

    /// Remove an object from a storage bucket.
    pub async fn delete_object(&self, bucket: &str, object_path: &str,
                               auth_token: &str) -> SupabaseResult<()> {
        let url = format!("{}/storage/v1/object/{}/{}", self.base_url, bucket, object_path);
        debug!("Deleting {}", url);

        let response = self.client.delete(&url)
            .headers(self.get_headers(Some(auth_token)))
            .send()
            .await?;

        let _: Value = Self::decode(response).await?;
        Ok(())
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> SupabaseResult<T> {
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            error!("API error ({}): {}", status, text);
            return Err(SupabaseError::from_status(status.as_u16(), text));
        }

        // 204 responses (updates without representation) carry no body
        if text.trim().is_empty() {
            return Ok(serde_json::from_value(Value::Null)?);
        }

        Ok(serde_json::from_str(&text)?)
    }

    pub fn get_base_url(&self) -> &str {
        &self.base_url
    }

    pub fn get_public_url(&self, storage_path: &str) -> String {
        format!("{}{}", self.base_url, storage_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_violation_is_recognised_by_sqlstate() {
        let err = SupabaseError::from_status(
            409,
            r#"{"code":"23505","message":"duplicate key value violates unique constraint"}"#.to_string(),
        );
        assert!(err.is_unique_violation());
    }

    #[test]
    fn foreign_key_conflict_is_not_a_unique_violation() {
        let err = SupabaseError::from_status(409, r#"{"code":"23503","message":"fk"}"#.to_string());
        assert!(!err.is_unique_violation());
        assert!(matches!(err, SupabaseError::Api { status: 409, .. }));
    }

    #[test]
    fn auth_and_not_found_statuses_are_classified() {
        assert!(matches!(SupabaseError::from_status(401, "no".into()), SupabaseError::Auth(_)));
        assert!(matches!(SupabaseError::from_status(404, "gone".into()), SupabaseError::NotFound(_)));
        assert!(matches!(SupabaseError::from_status(500, "boom".into()), SupabaseError::Api { status: 500, .. }));
    }
}
