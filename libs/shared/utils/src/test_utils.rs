use std::sync::Arc;
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use base64::{Engine as _, engine::general_purpose};
use serde_json::json;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;

pub struct TestConfig {
    pub jwt_secret: String,
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_service_role_key: String,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "test-secret-key-for-jwt-validation-must-be-long-enough".to_string(),
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "test-anon-key".to_string(),
            supabase_service_role_key: "test-service-role-key".to_string(),
        }
    }
}

impl TestConfig {
    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            supabase_url: self.supabase_url.clone(),
            supabase_anon_key: self.supabase_anon_key.clone(),
            supabase_service_role_key: self.supabase_service_role_key.clone(),
            supabase_jwt_secret: self.jwt_secret.clone(),
            ..AppConfig::default()
        }
    }

    /// Config pointed at a wiremock server standing in for Supabase.
    pub fn with_supabase_url(url: &str) -> AppConfig {
        let mut config = Self::default().to_app_config();
        config.supabase_url = url.to_string();
        config
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

pub struct TestUser {
    pub id: String,
    pub email: String,
    pub role: String,
}

impl Default for TestUser {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: "test@example.com".to_string(),
            role: "patient".to_string(),
        }
    }
}

impl TestUser {
    pub fn new(email: &str, role: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            role: role.to_string(),
        }
    }

    pub fn doctor(email: &str) -> Self {
        Self::new(email, "doctor")
    }

    pub fn patient(email: &str) -> Self {
        Self::new(email, "patient")
    }

    pub fn admin(email: &str) -> Self {
        Self::new(email, "admin")
    }

    pub fn to_user(&self) -> User {
        User {
            id: self.id.clone(),
            email: Some(self.email.clone()),
            role: Some(self.role.clone()),
            metadata: None,
            created_at: Some(Utc::now()),
        }
    }
}

pub struct JwtTestUtils;

impl JwtTestUtils {
    /// Token shaped like the auth provider's: generic `authenticated` role
    /// claim, application role in `app_metadata`.
    pub fn create_test_token(user: &TestUser, secret: &str, exp_hours: Option<i64>) -> String {
        let now = Utc::now();
        let exp = now + Duration::hours(exp_hours.unwrap_or(24));

        let header = json!({
            "alg": "HS256",
            "typ": "JWT"
        });

        let payload = json!({
            "sub": user.id,
            "email": user.email,
            "role": "authenticated",
            "app_metadata": { "role": user.role },
            "iat": now.timestamp(),
            "exp": exp.timestamp()
        });

        let header_encoded = general_purpose::URL_SAFE_NO_PAD.encode(header.to_string());
        let payload_encoded = general_purpose::URL_SAFE_NO_PAD.encode(payload.to_string());

        let signing_input = format!("{}.{}", header_encoded, payload_encoded);

        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(signing_input.as_bytes());
        let signature = mac.finalize().into_bytes();
        let signature_encoded = general_purpose::URL_SAFE_NO_PAD.encode(signature);

        format!("{}.{}", signing_input, signature_encoded)
    }

    pub fn create_expired_token(user: &TestUser, secret: &str) -> String {
        Self::create_test_token(user, secret, Some(-1))
    }

    pub fn create_invalid_signature_token(user: &TestUser) -> String {
        Self::create_test_token(user, "wrong-secret", Some(24))
    }

    pub fn create_malformed_token() -> String {
        "invalid.token.format".to_string()
    }
}

/// JSON rows as the Supabase REST API returns them.
pub struct MockSupabaseResponses;

impl MockSupabaseResponses {
    pub fn user_row(user_id: &str, email: &str, role: &str) -> serde_json::Value {
        json!({
            "id": user_id,
            "email": email,
            "full_name": "Test User",
            "role": role,
            "age": 34,
            "gender": "female",
            "specialization": null,
            "consultation_fee": null,
            "approval_status": null,
            "document_urls": [],
            "rejection_reason": null,
            "created_at": "2025-01-01T00:00:00Z",
            "updated_at": "2025-01-01T00:00:00Z"
        })
    }

    pub fn doctor_row(doctor_id: &str, approval_status: &str) -> serde_json::Value {
        json!({
            "id": doctor_id,
            "email": "doctor@example.com",
            "full_name": "Dr. Test",
            "role": "doctor",
            "age": null,
            "gender": null,
            "specialization": "General Practice",
            "consultation_fee": 150.0,
            "approval_status": approval_status,
            "document_urls": ["https://storage.example.com/license.pdf"],
            "rejection_reason": null,
            "created_at": "2025-01-01T00:00:00Z",
            "updated_at": "2025-01-01T00:00:00Z"
        })
    }

    pub fn appointment_row(
        appointment_id: &str,
        patient_id: &str,
        doctor_id: &str,
        status: &str,
        screenshot_url: Option<&str>,
    ) -> serde_json::Value {
        json!({
            "id": appointment_id,
            "patient_id": patient_id,
            "doctor_id": doctor_id,
            "appointment_date": "2025-12-05",
            "appointment_time": "10:00:00",
            "status": status,
            "payment_screenshot_url": screenshot_url,
            "screenshot_uploaded_at": screenshot_url.map(|_| "2025-12-01T09:00:00Z"),
            "admin_notes": null,
            "created_at": "2025-12-01T08:00:00Z",
            "updated_at": "2025-12-01T08:00:00Z"
        })
    }

    pub fn notification_row(user_id: &str, kind: &str, related_id: Option<&str>) -> serde_json::Value {
        json!({
            "id": Uuid::new_v4(),
            "user_id": user_id,
            "type": kind,
            "title": "Test notification",
            "message": "Something happened",
            "related_id": related_id,
            "is_read": false,
            "created_at": "2025-12-01T08:00:00Z"
        })
    }

    pub fn message_row(sender_id: &str, receiver_id: &str, content: &str) -> serde_json::Value {
        json!({
            "id": Uuid::new_v4(),
            "sender_id": sender_id,
            "receiver_id": receiver_id,
            "content": content,
            "is_read": false,
            "created_at": "2025-12-01T08:00:00Z"
        })
    }

    pub fn prescription_row(prescription_id: &str, doctor_id: &str, patient_id: &str) -> serde_json::Value {
        json!({
            "id": prescription_id,
            "doctor_id": doctor_id,
            "patient_id": patient_id,
            "appointment_id": null,
            "diagnosis": "Seasonal allergic rhinitis",
            "medications": [
                { "name": "Cetirizine", "dosage": "10mg", "frequency": "Once daily", "duration": "14 days" }
            ],
            "notes": null,
            "created_at": "2025-12-05T10:30:00Z"
        })
    }

    pub fn error_response(message: &str, code: &str) -> serde_json::Value {
        json!({
            "code": code,
            "message": message,
            "details": null,
            "hint": null
        })
    }
}
