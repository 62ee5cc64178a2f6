use std::sync::Arc;

use chrono::Utc;
use regex::Regex;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::{SupabaseClient, SupabaseError};
use shared_models::auth::{ApprovalStatus, Role};

use crate::models::{AuthError, RegisterRequest, UserProfile};
use crate::services::IdentityService;

const EMAIL_PATTERN: &str = r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$";
const MIN_PASSWORD_LENGTH: usize = 8;

pub struct RegistrationService {
    supabase: Arc<SupabaseClient>,
    identity: IdentityService,
    system_key: String,
}

impl RegistrationService {
    pub fn new(config: &AppConfig) -> Self {
        let supabase = Arc::new(SupabaseClient::new(config));
        Self {
            identity: IdentityService::with_client(Arc::clone(&supabase), config),
            supabase,
            system_key: config.system_key().to_string(),
        }
    }

    /// Creates the credential with the auth provider, then the `users` row.
    #[instrument(skip(self, request), fields(email = %request.email, role = %request.role))]
    pub async fn register(&self, request: RegisterRequest) -> Result<UserProfile, AuthError> {
        validate_registration(&request)?;

        let email = request.email.trim().to_lowercase();
        if self.identity.find_by_email(&email).await?.is_some() {
            return Err(AuthError::EmailTaken);
        }

        let user_id = self.sign_up(&email, &request).await?;
        debug!("Auth account created: {}", user_id);

        let now = Utc::now().to_rfc3339();
        let approval_status = (request.role == Role::Doctor).then_some(ApprovalStatus::Pending);

        let row = json!({
            "id": user_id,
            "email": email,
            "full_name": request.full_name.trim(),
            "role": request.role,
            "age": request.age,
            "gender": request.gender,
            "specialization": request.specialization,
            "consultation_fee": request.consultation_fee,
            "approval_status": approval_status,
            "document_urls": [],
            "created_at": now,
            "updated_at": now
        });

        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::POST,
            "/rest/v1/users",
            Some(&self.system_key),
            Some(row),
            Some(SupabaseClient::representation_headers()),
        ).await?;

        let profile = result.into_iter().next()
            .ok_or_else(|| AuthError::DatabaseError("User insert returned no rows".to_string()))?;
        let profile: UserProfile = serde_json::from_value(profile)
            .map_err(|e| AuthError::DatabaseError(format!("Failed to parse user: {}", e)))?;

        info!("Registered {} account {}", profile.role, profile.id);
        Ok(profile)
    }

    async fn sign_up(&self, email: &str, request: &RegisterRequest) -> Result<Uuid, AuthError> {
        let body = json!({
            "email": email,
            "password": request.password,
            "data": {
                "full_name": request.full_name.trim(),
                "role": request.role
            }
        });

        let response: Value = self.supabase
            .request(Method::POST, "/auth/v1/signup", None, Some(body))
            .await
            .map_err(|e| match e {
                SupabaseError::UniqueViolation(_) => AuthError::EmailTaken,
                SupabaseError::Api { message, .. } if message.contains("already registered") => {
                    AuthError::EmailTaken
                }
                other => AuthError::SignupFailed(other.to_string()),
            })?;

        // Depending on email confirmation settings the user is either the
        // body itself or nested under `user`.
        response.get("user")
            .and_then(|u| u.get("id"))
            .or_else(|| response.get("id"))
            .and_then(|id| id.as_str())
            .and_then(|id| Uuid::parse_str(id).ok())
            .ok_or_else(|| AuthError::SignupFailed("Signup response carried no user id".to_string()))
    }
}

pub fn validate_registration(request: &RegisterRequest) -> Result<(), AuthError> {
    if !request.role.is_self_registrable() {
        return Err(AuthError::RoleNotSelfRegistrable);
    }

    if !is_valid_email(request.email.trim()) {
        return Err(AuthError::InvalidInput("A valid email address is required".to_string()));
    }

    if request.password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::InvalidInput(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        )));
    }

    if request.full_name.trim().is_empty() {
        return Err(AuthError::InvalidInput("Full name is required".to_string()));
    }

    match request.role {
        Role::Doctor => {
            if request.specialization.as_deref().map_or(true, |s| s.trim().is_empty()) {
                return Err(AuthError::InvalidInput("Doctors must provide a specialization".to_string()));
            }
            match request.consultation_fee {
                Some(fee) if fee.is_finite() && fee >= 0.0 => {}
                _ => {
                    return Err(AuthError::InvalidInput(
                        "Doctors must provide a non-negative consultation fee".to_string(),
                    ))
                }
            }
        }
        Role::Patient => {
            if matches!(request.age, Some(age) if !(0..=150).contains(&age)) {
                return Err(AuthError::InvalidInput("Age is out of range".to_string()));
            }
        }
        Role::Admin => return Err(AuthError::RoleNotSelfRegistrable),
    }

    Ok(())
}

fn is_valid_email(email: &str) -> bool {
    email.len() <= 254
        && Regex::new(EMAIL_PATTERN)
            .map(|re| re.is_match(email))
            .unwrap_or(false)
}
