// libs/appointment-cell/src/services/booking.rs
use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use doctor_cell::{Doctor, DoctorService};
use notification_cell::{NewNotification, NotificationService, NotificationType};
use shared_config::AppConfig;
use shared_database::{SupabaseClient, SupabaseError};
use shared_models::auth::{Role, User};
use shared_utils::clock::{system_clock, Clock};

use crate::models::{
    parse_slot_time, store_time, Appointment, AppointmentError, AppointmentStatus,
    BookAppointmentRequest,
};
use crate::services::lifecycle::AppointmentLifecycle;

pub struct AppointmentBookingService {
    supabase: Arc<SupabaseClient>,
    doctors: DoctorService,
    notifications: NotificationService,
    clock: Arc<dyn Clock>,
    system_key: String,
}

impl AppointmentBookingService {
    pub fn new(config: &AppConfig) -> Self {
        Self::with_clock(config, system_clock())
    }

    pub fn with_clock(config: &AppConfig, clock: Arc<dyn Clock>) -> Self {
        let supabase = Arc::new(SupabaseClient::new(config));
        Self {
            doctors: DoctorService::with_clock(config, Arc::clone(&clock)),
            notifications: NotificationService::with_client(Arc::clone(&supabase), config),
            supabase,
            clock,
            system_key: config.system_key().to_string(),
        }
    }

    pub async fn list_bookable_doctors(&self) -> Result<Vec<Doctor>, AppointmentError> {
        Ok(self.doctors.list_approved().await?)
    }

    /// Times already held on `date` for `doctor_id`. Uses the same status set
    /// as the booking conflict check so a slot shown free can be booked.
    pub async fn booked_slots(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<NaiveTime>, AppointmentError> {
        let path = format!(
            "/rest/v1/appointments?select=appointment_time&doctor_id=eq.{}&appointment_date=eq.{}&status={}&order=appointment_time.asc",
            doctor_id,
            date,
            AppointmentStatus::active_filter()
        );

        let rows: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(&self.system_key),
            None,
        ).await?;

        Ok(rows.iter()
            .filter_map(|row| row["appointment_time"].as_str())
            .filter_map(parse_slot_time)
            .collect())
    }

    /// Books a slot for the calling patient.
    ///
    /// Checks run in order: required fields, caller role, doctor exists, doctor
    /// approved, slot free. The store's partial unique index backs the slot
    /// check; a rejected insert surfaces as [`AppointmentError::SlotTaken`].
    /// Notifying the doctor is best-effort and never undoes the booking.
    #[instrument(skip(self, caller, request, auth_token), fields(patient_id = %caller.id))]
    pub async fn book(
        &self,
        caller: &User,
        request: BookAppointmentRequest,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let slot = AppointmentLifecycle::validate_booking(&request)?;

        if !caller.has_role(Role::Patient) {
            return Err(AppointmentError::Forbidden("Only patients can book appointments".to_string()));
        }
        let patient_id = Uuid::parse_str(&caller.id)
            .map_err(|_| AppointmentError::Forbidden("Invalid caller id".to_string()))?;

        let doctor = self.doctors.get_doctor(slot.doctor_id).await?;
        if !doctor.is_approved() {
            return Err(AppointmentError::DoctorNotApproved);
        }

        if self.booked_slots(slot.doctor_id, slot.date).await?.contains(&slot.time) {
            warn!("Slot {} {} already held for doctor {}", slot.date, slot.time, slot.doctor_id);
            return Err(AppointmentError::SlotTaken);
        }

        let now = self.clock.now().to_rfc3339();
        let row = json!({
            "patient_id": patient_id,
            "doctor_id": slot.doctor_id,
            "appointment_date": slot.date.to_string(),
            "appointment_time": store_time(&slot.time),
            "status": AppointmentStatus::Pending,
            "payment_screenshot_url": null,
            "created_at": now,
            "updated_at": now
        });

        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::POST,
            "/rest/v1/appointments",
            Some(auth_token),
            Some(row),
            Some(SupabaseClient::representation_headers()),
        ).await.map_err(|e| match e {
            SupabaseError::UniqueViolation(_) => AppointmentError::SlotTaken,
            other => other.into(),
        })?;

        let appointment: Appointment = result.into_iter().next()
            .ok_or_else(|| AppointmentError::DatabaseError("Appointment insert returned no rows".to_string()))
            .and_then(|row| {
                serde_json::from_value(row)
                    .map_err(|e| AppointmentError::DatabaseError(format!("Failed to parse appointment: {}", e)))
            })?;

        info!("Appointment {} booked for {} {}", appointment.id, slot.date, slot.time);

        self.notifications.notify(
            NewNotification::new(
                doctor.id,
                NotificationType::Appointment,
                "New appointment request",
                format!(
                    "A patient booked {} at {}. Payment verification is pending.",
                    slot.date,
                    slot.time.format("%H:%M")
                ),
            )
            .related_to(appointment.id),
        ).await;

        Ok(appointment)
    }

    /// One appointment, visible to its patient, its doctor and admins.
    pub async fn get_appointment(&self, appointment_id: Uuid, caller: &User) -> Result<Appointment, AppointmentError> {
        let appointment = fetch_appointment(&self.supabase, &self.system_key, appointment_id).await?;

        let caller_id = Uuid::parse_str(&caller.id).ok();
        if caller.is_admin() || caller_id.is_some_and(|id| appointment.is_participant(id)) {
            Ok(appointment)
        } else {
            Err(AppointmentError::Forbidden("Not authorized to view this appointment".to_string()))
        }
    }

    pub async fn list_for_patient(&self, patient_id: Uuid, auth_token: &str) -> Result<Vec<Appointment>, AppointmentError> {
        let path = format!(
            "/rest/v1/appointments?patient_id=eq.{}&order=appointment_date.desc,appointment_time.desc",
            patient_id
        );
        self.list(&path, auth_token).await
    }

    /// A doctor only sees appointments whose payment has been verified.
    pub async fn list_for_doctor(&self, doctor_id: Uuid, auth_token: &str) -> Result<Vec<Appointment>, AppointmentError> {
        let path = format!(
            "/rest/v1/appointments?doctor_id=eq.{}&status=eq.{}&order=appointment_date.asc,appointment_time.asc",
            doctor_id,
            AppointmentStatus::Approved
        );
        self.list(&path, auth_token).await
    }

    pub async fn list_all(&self, auth_token: &str) -> Result<Vec<Appointment>, AppointmentError> {
        self.list("/rest/v1/appointments?order=created_at.desc", auth_token).await
    }

    async fn list(&self, path: &str, auth_token: &str) -> Result<Vec<Appointment>, AppointmentError> {
        debug!("Listing appointments: {}", path);

        let rows: Vec<Value> = self.supabase.request(
            Method::GET,
            path,
            Some(auth_token),
            None,
        ).await?;

        parse_appointments(rows)
    }
}

pub(crate) async fn fetch_appointment(
    supabase: &SupabaseClient,
    token: &str,
    appointment_id: Uuid,
) -> Result<Appointment, AppointmentError> {
    let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
    let rows: Vec<Value> = supabase.request(Method::GET, &path, Some(token), None).await?;

    parse_appointments(rows)?
        .into_iter()
        .next()
        .ok_or(AppointmentError::NotFound)
}

pub(crate) fn parse_appointments(rows: Vec<Value>) -> Result<Vec<Appointment>, AppointmentError> {
    rows.into_iter()
        .map(serde_json::from_value)
        .collect::<Result<Vec<Appointment>, _>>()
        .map_err(|e| AppointmentError::DatabaseError(format!("Failed to parse appointments: {}", e)))
}
