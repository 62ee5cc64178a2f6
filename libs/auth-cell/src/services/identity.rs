use std::sync::Arc;

use reqwest::Method;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::SupabaseClient;
use shared_models::auth::Role;

use crate::models::{AuthError, UserProfile};

/// Lookups against the `users` table on behalf of other cells. Runs with the
/// system key because callers routinely need rows that are not their own
/// (the doctor being booked, every admin for a fan-out).
pub struct IdentityService {
    supabase: Arc<SupabaseClient>,
    system_key: String,
}

impl IdentityService {
    pub fn new(config: &AppConfig) -> Self {
        Self::with_client(Arc::new(SupabaseClient::new(config)), config)
    }

    pub fn with_client(supabase: Arc<SupabaseClient>, config: &AppConfig) -> Self {
        Self {
            supabase,
            system_key: config.system_key().to_string(),
        }
    }

    pub async fn find_user(&self, user_id: Uuid) -> Result<Option<UserProfile>, AuthError> {
        let path = format!("/rest/v1/users?id=eq.{}", user_id);
        self.fetch_one(&path).await
    }

    pub async fn get_user(&self, user_id: Uuid) -> Result<UserProfile, AuthError> {
        self.find_user(user_id).await?.ok_or(AuthError::UserNotFound)
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<UserProfile>, AuthError> {
        let path = format!(
            "/rest/v1/users?email=eq.{}",
            urlencoding::encode(&email.trim().to_lowercase())
        );
        self.fetch_one(&path).await
    }

    pub async fn ids_by_role(&self, role: Role) -> Result<Vec<Uuid>, AuthError> {
        debug!("Looking up {} accounts", role);

        let path = format!("/rest/v1/users?select=id&role=eq.{}", role);
        let rows: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(&self.system_key),
            None,
        ).await?;

        Ok(rows.iter()
            .filter_map(|row| row["id"].as_str())
            .filter_map(|id| Uuid::parse_str(id).ok())
            .collect())
    }

    async fn fetch_one(&self, path: &str) -> Result<Option<UserProfile>, AuthError> {
        let rows: Vec<Value> = self.supabase.request(
            Method::GET,
            path,
            Some(&self.system_key),
            None,
        ).await?;

        rows.into_iter()
            .next()
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| AuthError::DatabaseError(format!("Failed to parse user: {}", e)))
    }
}
