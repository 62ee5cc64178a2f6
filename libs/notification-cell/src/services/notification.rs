// libs/notification-cell/src/services/notification.rs
use std::collections::HashSet;
use std::sync::Arc;

use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::{SupabaseClient, SupabaseError};

use crate::models::{NewNotification, Notification, NotificationError, NotificationType};

/// Reads and writes the per-user notifications table.
///
/// Writes addressed to someone other than the caller (booking, approvals,
/// sweepers) go out with the system key. `notify`/`notify_many` are the
/// best-effort variants: they never fail the caller's primary operation and
/// only log when the store rejects the write.
pub struct NotificationService {
    supabase: Arc<SupabaseClient>,
    system_key: String,
}

impl NotificationService {
    pub fn new(config: &AppConfig) -> Self {
        Self::with_client(Arc::new(SupabaseClient::new(config)), config)
    }

    pub fn with_client(supabase: Arc<SupabaseClient>, config: &AppConfig) -> Self {
        Self {
            supabase,
            system_key: config.system_key().to_string(),
        }
    }

    pub async fn create(&self, notification: NewNotification) -> Result<Notification, NotificationError> {
        debug!("Creating {} notification for user {}", notification.kind, notification.user_id);

        let body = serde_json::to_value(&notification)
            .map_err(|e| NotificationError::DatabaseError(e.to_string()))?;

        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::POST,
            "/rest/v1/notifications",
            Some(&self.system_key),
            Some(body),
            Some(SupabaseClient::representation_headers()),
        ).await?;

        let row = result.into_iter().next()
            .ok_or_else(|| NotificationError::DatabaseError("Notification insert returned no rows".to_string()))?;

        serde_json::from_value(row)
            .map_err(|e| NotificationError::DatabaseError(format!("Failed to parse notification: {}", e)))
    }

    /// Bulk insert in a single request. Returns the number of rows written.
    pub async fn create_many(&self, notifications: Vec<NewNotification>) -> Result<usize, NotificationError> {
        if notifications.is_empty() {
            return Ok(0);
        }

        let count = notifications.len();
        let body = serde_json::to_value(&notifications)
            .map_err(|e| NotificationError::DatabaseError(e.to_string()))?;

        let _: Value = self.supabase.request(
            Method::POST,
            "/rest/v1/notifications",
            Some(&self.system_key),
            Some(body),
        ).await?;

        debug!("Inserted {} notifications", count);
        Ok(count)
    }

    /// Inserts a notification the store keeps unique (one reminder per
    /// appointment). Returns `false` when an identical one already exists.
    pub async fn create_unique(&self, notification: NewNotification) -> Result<bool, NotificationError> {
        let body = serde_json::to_value(&notification)
            .map_err(|e| NotificationError::DatabaseError(e.to_string()))?;

        let result: Result<Value, SupabaseError> = self.supabase.request(
            Method::POST,
            "/rest/v1/notifications",
            Some(&self.system_key),
            Some(body),
        ).await;

        match result {
            Ok(_) => Ok(true),
            Err(SupabaseError::UniqueViolation(_)) => {
                debug!(
                    "{} notification for {:?} already exists",
                    notification.kind, notification.related_id
                );
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Best-effort single notification. Returns whether it was stored.
    pub async fn notify(&self, notification: NewNotification) -> bool {
        let user_id = notification.user_id;
        let kind = notification.kind;

        match self.create(notification).await {
            Ok(_) => true,
            Err(e) => {
                warn!("Failed to deliver {} notification to user {}: {}", kind, user_id, e);
                false
            }
        }
    }

    /// Best-effort fan-out. Returns how many were stored.
    pub async fn notify_many(&self, notifications: Vec<NewNotification>) -> usize {
        let count = notifications.len();

        match self.create_many(notifications).await {
            Ok(written) => written,
            Err(e) => {
                warn!("Failed to deliver {} notifications: {}", count, e);
                0
            }
        }
    }

    /// Which of `related_ids` already have a notification of `kind`.
    pub async fn existing_related_ids(
        &self,
        kind: NotificationType,
        related_ids: &[Uuid],
    ) -> Result<HashSet<Uuid>, NotificationError> {
        if related_ids.is_empty() {
            return Ok(HashSet::new());
        }

        let id_list = related_ids.iter()
            .map(Uuid::to_string)
            .collect::<Vec<_>>()
            .join(",");

        let path = format!(
            "/rest/v1/notifications?select=related_id&type=eq.{}&related_id=in.({})",
            kind, id_list
        );

        let rows: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(&self.system_key),
            None,
        ).await?;

        Ok(rows.iter()
            .filter_map(|row| row["related_id"].as_str())
            .filter_map(|id| Uuid::parse_str(id).ok())
            .collect())
    }

    pub async fn list_for_user(
        &self,
        user_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<Notification>, NotificationError> {
        let path = format!("/rest/v1/notifications?user_id=eq.{}&order=created_at.desc", user_id);

        let rows: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await?;

        rows.into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Notification>, _>>()
            .map_err(|e| NotificationError::DatabaseError(format!("Failed to parse notifications: {}", e)))
    }

    pub async fn unread_count(&self, user_id: Uuid, auth_token: &str) -> Result<usize, NotificationError> {
        let path = format!("/rest/v1/notifications?select=id&user_id=eq.{}&is_read=eq.false", user_id);

        let rows: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await?;

        Ok(rows.len())
    }

    pub async fn mark_read(
        &self,
        notification_id: Uuid,
        user_id: Uuid,
        auth_token: &str,
    ) -> Result<(), NotificationError> {
        self.get_owned(notification_id, user_id, auth_token).await?;

        let path = format!("/rest/v1/notifications?id=eq.{}&user_id=eq.{}", notification_id, user_id);
        let _: Value = self.supabase.request(
            Method::PATCH,
            &path,
            Some(auth_token),
            Some(json!({ "is_read": true })),
        ).await?;

        Ok(())
    }

    pub async fn mark_all_read(&self, user_id: Uuid, auth_token: &str) -> Result<(), NotificationError> {
        let path = format!("/rest/v1/notifications?user_id=eq.{}&is_read=eq.false", user_id);
        let _: Value = self.supabase.request(
            Method::PATCH,
            &path,
            Some(auth_token),
            Some(json!({ "is_read": true })),
        ).await?;

        info!("Marked all notifications read for user {}", user_id);
        Ok(())
    }

    pub async fn delete(
        &self,
        notification_id: Uuid,
        user_id: Uuid,
        auth_token: &str,
    ) -> Result<(), NotificationError> {
        self.get_owned(notification_id, user_id, auth_token).await?;

        let path = format!("/rest/v1/notifications?id=eq.{}&user_id=eq.{}", notification_id, user_id);
        let _: Value = self.supabase.request(
            Method::DELETE,
            &path,
            Some(auth_token),
            None,
        ).await?;

        Ok(())
    }

    async fn get_owned(
        &self,
        notification_id: Uuid,
        user_id: Uuid,
        auth_token: &str,
    ) -> Result<Notification, NotificationError> {
        let path = format!("/rest/v1/notifications?id=eq.{}", notification_id);

        let rows: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await?;

        let row = rows.into_iter().next().ok_or(NotificationError::NotFound)?;
        let notification: Notification = serde_json::from_value(row)
            .map_err(|e| NotificationError::DatabaseError(format!("Failed to parse notification: {}", e)))?;

        if notification.user_id != user_id {
            return Err(NotificationError::NotOwner);
        }

        Ok(notification)
    }
}
