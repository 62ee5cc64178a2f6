use std::sync::Arc;

use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use auth_cell::{IdentityService, UserProfile};
use notification_cell::{NewNotification, NotificationService, NotificationType};
use shared_config::AppConfig;
use shared_database::SupabaseClient;
use shared_models::auth::ApprovalStatus;
use shared_utils::clock::{system_clock, Clock};
use shared_utils::upload::{object_path, FileUpload};

use crate::models::{ApprovalDecision, Doctor, DoctorError, MAX_DOCUMENTS_PER_UPLOAD};

pub struct DoctorService {
    supabase: Arc<SupabaseClient>,
    identity: IdentityService,
    notifications: NotificationService,
    clock: Arc<dyn Clock>,
    system_key: String,
    document_bucket: String,
}

impl DoctorService {
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
            system_key: config.system_key().to_string(),
            document_bucket: config.doctor_document_bucket.clone(),
        }
    }

    /// Doctors patients can book.
    pub async fn list_approved(&self) -> Result<Vec<Doctor>, DoctorError> {
        self.list_by_status(ApprovalStatus::Approved).await
    }

    pub async fn list_pending(&self) -> Result<Vec<Doctor>, DoctorError> {
        self.list_by_status(ApprovalStatus::Pending).await
    }

    pub async fn get_doctor(&self, doctor_id: Uuid) -> Result<Doctor, DoctorError> {
        let profile = self.identity.get_user(doctor_id).await?;
        Doctor::try_from(profile)
    }

    /// Admin decision on a pending doctor. The update only matches while the
    /// row is still pending, so two admins deciding at once cannot both win.
    #[instrument(skip(self, decision), fields(status = %decision.status))]
    pub async fn set_approval(
        &self,
        doctor_id: Uuid,
        decision: ApprovalDecision,
    ) -> Result<Doctor, DoctorError> {
        if decision.status == ApprovalStatus::Pending {
            return Err(DoctorError::InvalidDecision(
                "Status must be either approved or rejected".to_string(),
            ));
        }

        let doctor = self.get_doctor(doctor_id).await?;
        if !doctor.approval_status.can_transition_to(decision.status) {
            return Err(DoctorError::InvalidTransition {
                from: doctor.approval_status,
                to: decision.status,
            });
        }

        let reason = match decision.status {
            ApprovalStatus::Rejected => decision.reason.filter(|r| !r.trim().is_empty()),
            _ => None,
        };

        let path = format!(
            "/rest/v1/users?id=eq.{}&role=eq.doctor&approval_status=eq.{}",
            doctor_id, ApprovalStatus::Pending
        );
        let update = json!({
            "approval_status": decision.status,
            "rejection_reason": reason,
            "updated_at": self.clock.now().to_rfc3339()
        });

        let updated = self.update_returning(&path, update).await?
            .ok_or(DoctorError::InvalidTransition {
                from: doctor.approval_status,
                to: decision.status,
            })?;

        let message = match (&decision.status, &updated.rejection_reason) {
            (ApprovalStatus::Approved, _) => {
                "Your account has been approved. Patients can now book appointments with you.".to_string()
            }
            (_, Some(reason)) => format!("Your account application was rejected: {}", reason),
            _ => "Your account application was rejected. You may resubmit your documents.".to_string(),
        };

        self.notifications.notify(NewNotification::new(
            doctor_id,
            NotificationType::System,
            format!("Account {}", decision.status),
            message,
        )).await;

        info!("Doctor {} {}", doctor_id, decision.status);
        Ok(updated)
    }

    /// Stores new supporting documents. A rejected doctor goes back to pending.
    #[instrument(skip(self, files, auth_token))]
    pub async fn resubmit_documents(
        &self,
        doctor_id: Uuid,
        files: Vec<FileUpload>,
        auth_token: &str,
    ) -> Result<Doctor, DoctorError> {
        if files.is_empty() {
            return Err(DoctorError::NoDocuments);
        }
        if files.len() > MAX_DOCUMENTS_PER_UPLOAD {
            return Err(DoctorError::TooManyDocuments(MAX_DOCUMENTS_PER_UPLOAD));
        }

        let doctor = self.get_doctor(doctor_id).await?;
        if doctor.is_approved() {
            return Err(DoctorError::AlreadyApproved);
        }

        // Decode everything before touching storage
        let decoded = files.iter()
            .map(FileUpload::decode)
            .collect::<Result<Vec<_>, _>>()?;

        let mut document_urls = doctor.document_urls.clone();
        for file in decoded {
            let object = object_path(doctor_id, &file);
            let url = self.supabase.upload_object(
                &self.document_bucket,
                &object,
                file.bytes,
                &file.content_type,
                auth_token,
            ).await?;
            debug!("Stored document {}", object);
            document_urls.push(url);
        }

        let path = format!(
            "/rest/v1/users?id=eq.{}&role=eq.doctor&approval_status=eq.{}",
            doctor_id, doctor.approval_status
        );
        let update = json!({
            "document_urls": document_urls,
            "approval_status": ApprovalStatus::Pending,
            "rejection_reason": null,
            "updated_at": self.clock.now().to_rfc3339()
        });

        let updated = self.update_returning(&path, update).await?
            .ok_or(DoctorError::InvalidTransition {
                from: doctor.approval_status,
                to: ApprovalStatus::Pending,
            })?;

        info!("Doctor {} resubmitted documents; now {}", doctor_id, updated.approval_status);
        Ok(updated)
    }

    async fn list_by_status(&self, status: ApprovalStatus) -> Result<Vec<Doctor>, DoctorError> {
        let path = format!(
            "/rest/v1/users?role=eq.doctor&approval_status=eq.{}&order=full_name.asc",
            status
        );

        let rows: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(&self.system_key),
            None,
        ).await?;

        rows.into_iter()
            .map(|row| {
                serde_json::from_value::<UserProfile>(row)
                    .map_err(|e| DoctorError::DatabaseError(format!("Failed to parse doctor: {}", e)))
                    .and_then(Doctor::try_from)
            })
            .collect()
    }

    async fn update_returning(&self, path: &str, update: Value) -> Result<Option<Doctor>, DoctorError> {
        let rows: Vec<Value> = self.supabase.request_with_headers(
            Method::PATCH,
            path,
            Some(&self.system_key),
            Some(update),
            Some(SupabaseClient::representation_headers()),
        ).await?;

        rows.into_iter()
            .next()
            .map(|row| {
                serde_json::from_value::<UserProfile>(row)
                    .map_err(|e| DoctorError::DatabaseError(format!("Failed to parse doctor: {}", e)))
                    .and_then(Doctor::try_from)
            })
            .transpose()
    }
}
