// libs/appointment-cell/src/services/approval.rs
use std::sync::Arc;

use reqwest::Method;
use serde_json::{json, Value};
use tracing::{info, instrument};

use notification_cell::{NewNotification, NotificationService, NotificationType};
use shared_config::AppConfig;
use shared_database::SupabaseClient;
use shared_models::auth::User;
use shared_utils::clock::{system_clock, Clock};

use crate::models::{Appointment, AppointmentError, AppointmentStatus, StatusDecisionRequest};
use crate::services::booking::{fetch_appointment, parse_appointments};
use crate::services::lifecycle::AppointmentLifecycle;

pub struct AppointmentApprovalService {
    supabase: Arc<SupabaseClient>,
    notifications: NotificationService,
    clock: Arc<dyn Clock>,
    system_key: String,
}

impl AppointmentApprovalService {
    pub fn new(config: &AppConfig) -> Self {
        Self::with_clock(config, system_clock())
    }

    pub fn with_clock(config: &AppConfig, clock: Arc<dyn Clock>) -> Self {
        let supabase = Arc::new(SupabaseClient::new(config));
        Self {
            notifications: NotificationService::with_client(Arc::clone(&supabase), config),
            supabase,
            clock,
            system_key: config.system_key().to_string(),
        }
    }

    /// Admin decision on a paid, pending appointment.
    ///
    /// The write is conditional on the row still being pending with a proof,
    /// so a decision never lands on an appointment that moved on in between.
    /// Approval notifies the patient; rejection does not.
    #[instrument(skip(self, caller, request, auth_token), fields(admin_id = %caller.id))]
    pub async fn set_status(
        &self,
        caller: &User,
        request: StatusDecisionRequest,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        if !caller.is_admin() {
            return Err(AppointmentError::Forbidden("Only admins can decide appointments".to_string()));
        }

        let appointment_id = request.appointment_id.ok_or_else(|| {
            AppointmentError::ValidationError("Appointment ID is required".to_string())
        })?;
        let new_status = AppointmentLifecycle::parse_decision(request.status.as_deref())?;

        let appointment = fetch_appointment(&self.supabase, &self.system_key, appointment_id).await?;
        AppointmentLifecycle::ensure_decidable(&appointment)?;

        let path = format!(
            "/rest/v1/appointments?id=eq.{}&status=eq.{}&payment_screenshot_url=not.is.null",
            appointment_id,
            AppointmentStatus::Pending
        );
        let notes = request.admin_notes
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());

        let rows: Vec<Value> = self.supabase.request_with_headers(
            Method::PATCH,
            &path,
            Some(auth_token),
            Some(json!({
                "status": new_status,
                "admin_notes": notes,
                "updated_at": self.clock.now().to_rfc3339()
            })),
            Some(SupabaseClient::representation_headers()),
        ).await?;

        let updated = parse_appointments(rows)?
            .into_iter()
            .next()
            .ok_or(AppointmentError::Superseded)?;

        info!("Appointment {} {}", appointment_id, new_status);

        if new_status == AppointmentStatus::Approved {
            self.notify_patient_of_approval(&updated).await;
        }

        Ok(updated)
    }

    async fn notify_patient_of_approval(&self, appointment: &Appointment) -> bool {
        self.notifications.notify(
            NewNotification::new(
                appointment.patient_id,
                NotificationType::Appointment,
                "Appointment confirmed",
                format!(
                    "Your payment was verified. Your appointment on {} at {} is confirmed.",
                    appointment.appointment_date,
                    appointment.appointment_time.format("%H:%M")
                ),
            )
            .related_to(appointment.id),
        ).await
    }
}
