use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct JwtClaims {
    pub sub: String,
    pub exp: Option<u64>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub app_metadata: Option<serde_json::Value>,
    pub user_metadata: Option<serde_json::Value>,
    pub aud: Option<String>,
    pub iat: Option<u64>,
}

impl JwtClaims {
    /// Application role of the subject. Supabase puts `authenticated` in the
    /// top-level `role` claim, so the metadata blocks take precedence.
    pub fn app_role(&self) -> Option<String> {
        let from_metadata = |meta: &Option<serde_json::Value>| {
            meta.as_ref()
                .and_then(|m| m.get("role"))
                .and_then(|r| r.as_str())
                .map(str::to_string)
        };

        from_metadata(&self.app_metadata)
            .or_else(|| from_metadata(&self.user_metadata))
            .or_else(|| self.role.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Patient,
    Doctor,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Patient => "patient",
            Role::Doctor => "doctor",
            Role::Admin => "admin",
        }
    }

    /// Admin accounts are provisioned out of band.
    pub fn is_self_registrable(&self) -> bool {
        matches!(self, Role::Patient | Role::Doctor)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "patient" => Ok(Role::Patient),
            "doctor" => Ok(Role::Doctor),
            "admin" => Ok(Role::Admin),
            other => Err(format!("Unknown role: {}", other)),
        }
    }
}

/// Where a doctor account stands in the admin review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Rejected => "rejected",
        }
    }

    /// pending -> approved | rejected, rejected -> pending on resubmission.
    /// Nothing leaves `approved`.
    pub fn can_transition_to(&self, next: ApprovalStatus) -> bool {
        matches!(
            (self, next),
            (ApprovalStatus::Pending, ApprovalStatus::Approved)
                | (ApprovalStatus::Pending, ApprovalStatus::Rejected)
                | (ApprovalStatus::Rejected, ApprovalStatus::Pending)
        )
    }
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: Option<String>,
    pub role: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn app_role(&self) -> Option<Role> {
        self.role.as_deref().and_then(|r| r.parse().ok())
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.app_role() == Some(role)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(Role::Admin)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub valid: bool,
    pub user_id: String,
    pub email: Option<String>,
    pub role: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn claims(role: Option<&str>, app: Option<serde_json::Value>, user: Option<serde_json::Value>) -> JwtClaims {
        JwtClaims {
            sub: "u1".to_string(),
            exp: None,
            email: None,
            role: role.map(str::to_string),
            app_metadata: app,
            user_metadata: user,
            aud: None,
            iat: None,
        }
    }

    #[test]
    fn app_metadata_role_wins_over_generic_claim() {
        let c = claims(Some("authenticated"), Some(json!({ "role": "admin" })), Some(json!({ "role": "patient" })));
        assert_eq!(c.app_role().as_deref(), Some("admin"));
    }

    #[test]
    fn falls_back_to_top_level_role() {
        let c = claims(Some("doctor"), None, Some(json!({ "full_name": "X" })));
        assert_eq!(c.app_role().as_deref(), Some("doctor"));
    }

    #[test]
    fn only_patients_and_doctors_self_register() {
        assert!(Role::Patient.is_self_registrable());
        assert!(Role::Doctor.is_self_registrable());
        assert!(!Role::Admin.is_self_registrable());
        assert_eq!("Doctor".parse::<Role>(), Ok(Role::Doctor));
        assert!("nurse".parse::<Role>().is_err());
    }

    #[test]
    fn approval_never_leaves_approved() {
        use ApprovalStatus::*;
        assert!(Pending.can_transition_to(Approved));
        assert!(Pending.can_transition_to(Rejected));
        assert!(Rejected.can_transition_to(Pending));
        assert!(!Rejected.can_transition_to(Approved));
        assert!(!Approved.can_transition_to(Pending));
        assert!(!Approved.can_transition_to(Rejected));
        assert!(!Pending.can_transition_to(Pending));
    }
}
