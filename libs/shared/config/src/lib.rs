use std::env;
use std::str::FromStr;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_service_role_key: String,
    pub supabase_jwt_secret: String,
    pub openai_api_key: String,
    pub openai_base_url: String,
    pub openai_model: String,
    pub server_port: u16,
    pub sweep_interval_seconds: u64,
    pub sweep_initial_delay_seconds: u64,
    pub appointment_expiry_days: i64,
    pub payment_proof_bucket: String,
    pub doctor_document_bucket: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            supabase_service_role_key: env::var("SUPABASE_SERVICE_ROLE_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_SERVICE_ROLE_KEY not set, background jobs will run with the anon key");
                    String::new()
                }),
            supabase_jwt_secret: env::var("SUPABASE_JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_JWT_SECRET not set, using empty value");
                    String::new()
                }),
            openai_api_key: env::var("OPENAI_API_KEY")
                .unwrap_or_else(|_| {
                    warn!("OPENAI_API_KEY not set, assistant endpoints will be unavailable");
                    String::new()
                }),
            openai_base_url: env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            openai_model: env::var("OPENAI_MODEL")
                .unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            server_port: parse_or("SERVER_PORT", 3000),
            sweep_interval_seconds: parse_or("SWEEP_INTERVAL_SECONDS", 3600),
            sweep_initial_delay_seconds: parse_or("SWEEP_INITIAL_DELAY_SECONDS", 5),
            appointment_expiry_days: parse_or("APPOINTMENT_EXPIRY_DAYS", 3),
            payment_proof_bucket: env::var("PAYMENT_PROOF_BUCKET")
                .unwrap_or_else(|_| "payment-proofs".to_string()),
            doctor_document_bucket: env::var("DOCTOR_DOCUMENT_BUCKET")
                .unwrap_or_else(|_| "doctor-documents".to_string()),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_anon_key.is_empty()
            && !self.supabase_jwt_secret.is_empty()
    }

    pub fn is_assistant_configured(&self) -> bool {
        !self.openai_api_key.is_empty() && !self.openai_base_url.is_empty()
    }

    /// Key used for writes that are not made on behalf of the caller
    /// (sweepers, notification fan-out, profile rows created at signup).
    pub fn system_key(&self) -> &str {
        if self.supabase_service_role_key.is_empty() {
            &self.supabase_anon_key
        } else {
            &self.supabase_service_role_key
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            supabase_url: String::new(),
            supabase_anon_key: String::new(),
            supabase_service_role_key: String::new(),
            supabase_jwt_secret: String::new(),
            openai_api_key: String::new(),
            openai_base_url: "https://api.openai.com/v1".to_string(),
            openai_model: "gpt-4o-mini".to_string(),
            server_port: 3000,
            sweep_interval_seconds: 3600,
            sweep_initial_delay_seconds: 5,
            appointment_expiry_days: 3,
            payment_proof_bucket: "payment-proofs".to_string(),
            doctor_document_bucket: "doctor-documents".to_string(),
        }
    }
}

fn parse_or<T: FromStr + Copy + std::fmt::Display>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("{} has invalid value '{}', using default {}", key, raw, default);
            default
        }),
        Err(_) => default,
    }
}
