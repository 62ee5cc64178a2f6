// libs/appointment-cell/src/services/payment.rs
use std::sync::Arc;

use reqwest::Method;
use serde_json::{json, Value};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use auth_cell::IdentityService;
use notification_cell::{NewNotification, NotificationService, NotificationType};
use shared_config::AppConfig;
use shared_database::SupabaseClient;
use shared_models::auth::Role;
use shared_utils::clock::{system_clock, Clock};
use shared_utils::upload::{object_path, FileUpload};

use crate::models::{AppointmentError, AppointmentStatus};
use crate::services::booking::{fetch_appointment, parse_appointments};
use crate::services::lifecycle::AppointmentLifecycle;

pub struct PaymentProofService {
    supabase: Arc<SupabaseClient>,
    identity: IdentityService,
    notifications: NotificationService,
    clock: Arc<dyn Clock>,
    system_key: String,
    bucket: String,
}

impl PaymentProofService {
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
            bucket: config.payment_proof_bucket.clone(),
        }
    }

    /// Attaches a payment screenshot to the caller's appointment and tells
    /// every admin it is ready for review. Status is left as it was.
    #[instrument(skip(self, file, auth_token))]
    pub async fn upload_proof(
        &self,
        appointment_id: Uuid,
        caller_id: Uuid,
        file: FileUpload,
        auth_token: &str,
    ) -> Result<String, AppointmentError> {
        let appointment = fetch_appointment(&self.supabase, &self.system_key, appointment_id).await?;

        if appointment.patient_id != caller_id {
            return Err(AppointmentError::Forbidden(
                "Only the patient who booked this appointment can upload payment proof".to_string(),
            ));
        }
        AppointmentLifecycle::ensure_accepts_proof(&appointment)?;

        let decoded = file.decode()?;
        let object = object_path(appointment_id, &decoded);
        let url = self.supabase.upload_object(
            &self.bucket,
            &object,
            decoded.bytes,
            &decoded.content_type,
            auth_token,
        ).await?;

        // Guard on the status we checked; the expiry sweep may have run since
        let now = self.clock.now().to_rfc3339();
        let path = format!(
            "/rest/v1/appointments?id=eq.{}&status=eq.{}",
            appointment_id, appointment.status
        );
        let rows: Vec<Value> = self.supabase.request_with_headers(
            Method::PATCH,
            &path,
            Some(&self.system_key),
            Some(json!({
                "payment_screenshot_url": url,
                "screenshot_uploaded_at": now,
                "updated_at": now
            })),
            Some(SupabaseClient::representation_headers()),
        ).await?;

        if parse_appointments(rows)?.is_empty() {
            self.discard_object(&object).await;
            let current = fetch_appointment(&self.supabase, &self.system_key, appointment_id).await?;
            return Err(match current.status {
                AppointmentStatus::Expired => AppointmentError::Expired,
                _ => AppointmentError::Superseded,
            });
        }

        info!("Payment proof stored for appointment {}", appointment_id);
        self.notify_admins(appointment_id).await;

        Ok(url)
    }

    /// Drops a stored proof the appointment never took.
    async fn discard_object(&self, object: &str) {
        if let Err(e) = self.supabase.delete_object(&self.bucket, object, &self.system_key).await {
            warn!("Orphaned payment proof {}/{} left in storage: {}", self.bucket, object, e);
        }
    }

    async fn notify_admins(&self, appointment_id: Uuid) -> usize {
        let admins = match self.identity.ids_by_role(Role::Admin).await {
            Ok(ids) => ids,
            Err(e) => {
                warn!("Could not look up admins for appointment {}: {}", appointment_id, e);
                return 0;
            }
        };

        let batch = admins.into_iter()
            .map(|admin_id| {
                NewNotification::new(
                    admin_id,
                    NotificationType::Appointment,
                    "Payment proof uploaded",
                    "A patient uploaded a payment screenshot. Review it to approve or reject the appointment.",
                )
                .related_to(appointment_id)
            })
            .collect();

        self.notifications.notify_many(batch).await
    }
}
