// libs/prescription-cell/src/services/prescription.rs
use std::sync::Arc;

use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use appointment_cell::AppointmentStatus;
use doctor_cell::DoctorService;
use notification_cell::{NewNotification, NotificationService, NotificationType};
use shared_config::AppConfig;
use shared_database::SupabaseClient;
use shared_models::auth::{Role, User};
use shared_utils::clock::{system_clock, Clock};

use crate::models::{
    non_blank, validate_medications, CreatePrescriptionRequest, Prescription, PrescriptionError,
};

pub struct PrescriptionService {
    supabase: Arc<SupabaseClient>,
    doctors: DoctorService,
    notifications: NotificationService,
    clock: Arc<dyn Clock>,
    system_key: String,
}

impl PrescriptionService {
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

    /// Issues a prescription. The prescriber must be an approved doctor who
    /// has an approved appointment with the patient (the given one, if any).
    #[instrument(skip(self, caller, request, auth_token), fields(doctor = %caller.id))]
    pub async fn create(
        &self,
        caller: &User,
        request: CreatePrescriptionRequest,
        auth_token: &str,
    ) -> Result<Prescription, PrescriptionError> {
        if !caller.has_role(Role::Doctor) {
            return Err(PrescriptionError::Forbidden("Only doctors can issue prescriptions".to_string()));
        }
        let doctor_id = Uuid::parse_str(&caller.id)
            .map_err(|_| PrescriptionError::Forbidden("Invalid caller id".to_string()))?;

        let patient_id = request.patient_id
            .ok_or_else(|| PrescriptionError::ValidationError("Patient ID is required".to_string()))?;
        validate_medications(&request.medications)?;

        let doctor = self.doctors.get_doctor(doctor_id).await?;
        if !doctor.is_approved() {
            return Err(PrescriptionError::DoctorNotApproved);
        }

        if !self.has_approved_appointment(doctor_id, patient_id, request.appointment_id, auth_token).await? {
            return Err(PrescriptionError::NoApprovedAppointment);
        }

        let row = json!({
            "doctor_id": doctor_id,
            "patient_id": patient_id,
            "appointment_id": request.appointment_id,
            "diagnosis": non_blank(request.diagnosis),
            "medications": request.medications,
            "notes": non_blank(request.notes),
            "created_at": self.clock.now().to_rfc3339()
        });

        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::POST,
            "/rest/v1/prescriptions",
            Some(auth_token),
            Some(row),
            Some(SupabaseClient::representation_headers()),
        ).await?;

        let prescription = parse_prescriptions(result)?
            .into_iter()
            .next()
            .ok_or_else(|| PrescriptionError::DatabaseError("Prescription insert returned no rows".to_string()))?;

        info!("Prescription {} issued to patient {}", prescription.id, patient_id);

        self.notifications.notify(
            NewNotification::new(
                patient_id,
                NotificationType::Prescription,
                "New prescription",
                format!("Dr. {} issued you a new prescription.", doctor.full_name),
            )
            .related_to(prescription.id),
        ).await;

        Ok(prescription)
    }

    async fn has_approved_appointment(
        &self,
        doctor_id: Uuid,
        patient_id: Uuid,
        appointment_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<bool, PrescriptionError> {
        let mut path = format!(
            "/rest/v1/appointments?select=id&doctor_id=eq.{}&patient_id=eq.{}&status=eq.{}",
            doctor_id, patient_id, AppointmentStatus::Approved
        );
        if let Some(id) = appointment_id {
            path.push_str(&format!("&id=eq.{}", id));
        }
        path.push_str("&limit=1");

        let rows: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await?;

        Ok(!rows.is_empty())
    }

    /// One prescription, visible to its doctor, its patient and admins.
    pub async fn get(&self, prescription_id: Uuid, caller: &User) -> Result<Prescription, PrescriptionError> {
        let path = format!("/rest/v1/prescriptions?id=eq.{}", prescription_id);
        let rows: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(&self.system_key),
            None,
        ).await?;

        let prescription = parse_prescriptions(rows)?
            .into_iter()
            .next()
            .ok_or(PrescriptionError::NotFound)?;

        let caller_id = Uuid::parse_str(&caller.id).ok();
        if caller.is_admin() || caller_id.is_some_and(|id| prescription.is_participant(id)) {
            Ok(prescription)
        } else {
            Err(PrescriptionError::Forbidden("Not authorized to view this prescription".to_string()))
        }
    }

    pub async fn list_for_patient(&self, patient_id: Uuid, auth_token: &str) -> Result<Vec<Prescription>, PrescriptionError> {
        let path = format!("/rest/v1/prescriptions?patient_id=eq.{}&order=created_at.desc", patient_id);
        self.list(&path, auth_token).await
    }

    pub async fn list_for_doctor(&self, doctor_id: Uuid, auth_token: &str) -> Result<Vec<Prescription>, PrescriptionError> {
        let path = format!("/rest/v1/prescriptions?doctor_id=eq.{}&order=created_at.desc", doctor_id);
        self.list(&path, auth_token).await
    }

    async fn list(&self, path: &str, auth_token: &str) -> Result<Vec<Prescription>, PrescriptionError> {
        debug!("Listing prescriptions: {}", path);

        let rows: Vec<Value> = self.supabase.request(
            Method::GET,
            path,
            Some(auth_token),
            None,
        ).await?;

        parse_prescriptions(rows)
    }
}

fn parse_prescriptions(rows: Vec<Value>) -> Result<Vec<Prescription>, PrescriptionError> {
    rows.into_iter()
        .map(serde_json::from_value)
        .collect::<Result<Vec<Prescription>, _>>()
        .map_err(|e| PrescriptionError::DatabaseError(format!("Failed to parse prescriptions: {}", e)))
}
