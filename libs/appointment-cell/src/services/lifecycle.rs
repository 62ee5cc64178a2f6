// libs/appointment-cell/src/services/lifecycle.rs
use chrono::{DateTime, Duration, Utc};

use crate::models::{
    parse_date, parse_slot_time, Appointment, AppointmentError, AppointmentStatus,
    BookAppointmentRequest, SlotRequest,
};

/// Status rules for an appointment, independent of the store.
pub struct AppointmentLifecycle;

impl AppointmentLifecycle {
    /// Required booking fields, checked before anything else.
    pub fn validate_booking(request: &BookAppointmentRequest) -> Result<SlotRequest, AppointmentError> {
        let (Some(doctor_id), Some(date), Some(time)) = (
            request.doctor_id,
            request.appointment_date.as_deref().filter(|d| !d.trim().is_empty()),
            request.appointment_time.as_deref().filter(|t| !t.trim().is_empty()),
        ) else {
            return Err(AppointmentError::ValidationError(
                "Doctor ID, appointment date and appointment time are required".to_string(),
            ));
        };

        let date = parse_date(date).ok_or_else(|| {
            AppointmentError::ValidationError("Appointment date must be YYYY-MM-DD".to_string())
        })?;
        let time = parse_slot_time(time).ok_or_else(|| {
            AppointmentError::ValidationError("Appointment time must be HH:MM".to_string())
        })?;

        Ok(SlotRequest { doctor_id, date, time })
    }

    /// Only `approved` and `rejected` are admin decisions.
    pub fn parse_decision(status: Option<&str>) -> Result<AppointmentStatus, AppointmentError> {
        let invalid = || {
            AppointmentError::ValidationError("Status must be either approved or rejected".to_string())
        };

        match status.map(str::parse::<AppointmentStatus>) {
            Some(Ok(s @ (AppointmentStatus::Approved | AppointmentStatus::Rejected))) => Ok(s),
            _ => Err(invalid()),
        }
    }

    /// An admin decision needs a pending appointment that carries payment proof.
    pub fn ensure_decidable(appointment: &Appointment) -> Result<(), AppointmentError> {
        if appointment.status != AppointmentStatus::Pending {
            return Err(AppointmentError::NotPending(appointment.status));
        }
        if !appointment.has_payment_proof() {
            return Err(AppointmentError::MissingPaymentProof);
        }
        Ok(())
    }

    pub fn ensure_accepts_proof(appointment: &Appointment) -> Result<(), AppointmentError> {
        if appointment.status == AppointmentStatus::Expired {
            return Err(AppointmentError::Expired);
        }
        Ok(())
    }

    /// Rows created before this instant are past the payment grace period.
    pub fn expiry_cutoff(now: DateTime<Utc>, grace_days: i64) -> DateTime<Utc> {
        now - Duration::days(grace_days)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::{NaiveDate, NaiveTime, TimeZone};
    use uuid::Uuid;

    fn appointment(status: AppointmentStatus, proof: Option<&str>, created_at: DateTime<Utc>) -> Appointment {
        Appointment {
            id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            doctor_id: Uuid::new_v4(),
            appointment_date: NaiveDate::from_ymd_opt(2025, 12, 5).unwrap(),
            appointment_time: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            status,
            payment_screenshot_url: proof.map(str::to_string),
            screenshot_uploaded_at: None,
            admin_notes: None,
            created_at,
            updated_at: None,
        }
    }

    #[test]
    fn booking_requires_all_three_fields() {
        let request = BookAppointmentRequest {
            doctor_id: Some(Uuid::new_v4()),
            appointment_date: Some("2025-12-05".to_string()),
            appointment_time: None,
        };
        assert_matches!(
            AppointmentLifecycle::validate_booking(&request),
            Err(AppointmentError::ValidationError(_))
        );

        let request = BookAppointmentRequest {
            appointment_time: Some("10:00".to_string()),
            ..request
        };
        let slot = AppointmentLifecycle::validate_booking(&request).unwrap();
        assert_eq!(slot.time, NaiveTime::from_hms_opt(10, 0, 0).unwrap());
    }

    #[test]
    fn malformed_date_is_a_validation_error() {
        let request = BookAppointmentRequest {
            doctor_id: Some(Uuid::new_v4()),
            appointment_date: Some("05/12/2025".to_string()),
            appointment_time: Some("10:00".to_string()),
        };
        assert_matches!(
            AppointmentLifecycle::validate_booking(&request),
            Err(AppointmentError::ValidationError(_))
        );
    }

    #[test]
    fn only_approve_and_reject_are_decisions() {
        assert_eq!(AppointmentLifecycle::parse_decision(Some("approved")).unwrap(), AppointmentStatus::Approved);
        assert_eq!(AppointmentLifecycle::parse_decision(Some("rejected")).unwrap(), AppointmentStatus::Rejected);
        assert!(AppointmentLifecycle::parse_decision(Some("expired")).is_err());
        assert!(AppointmentLifecycle::parse_decision(Some("pending")).is_err());
        assert!(AppointmentLifecycle::parse_decision(Some("cancelled")).is_err());
        assert!(AppointmentLifecycle::parse_decision(None).is_err());
    }

    #[test]
    fn approval_requires_proof_for_any_pending_appointment() {
        let now = Utc::now();
        for proof in [None, Some(""), Some("   ")] {
            let a = appointment(AppointmentStatus::Pending, proof, now);
            assert_matches!(AppointmentLifecycle::ensure_decidable(&a), Err(AppointmentError::MissingPaymentProof));
        }

        let a = appointment(AppointmentStatus::Pending, Some("https://x/proof.png"), now);
        assert!(AppointmentLifecycle::ensure_decidable(&a).is_ok());
    }

    #[test]
    fn decided_appointments_are_terminal() {
        let now = Utc::now();
        for status in [AppointmentStatus::Approved, AppointmentStatus::Rejected, AppointmentStatus::Expired] {
            let a = appointment(status, Some("https://x/proof.png"), now);
            assert_matches!(AppointmentLifecycle::ensure_decidable(&a), Err(AppointmentError::NotPending(s)) if s == status);
        }
    }

    #[test]
    fn expired_appointments_refuse_proof() {
        let a = appointment(AppointmentStatus::Expired, None, Utc::now());
        assert_matches!(AppointmentLifecycle::ensure_accepts_proof(&a), Err(AppointmentError::Expired));

        let a = appointment(AppointmentStatus::Pending, None, Utc::now());
        assert!(AppointmentLifecycle::ensure_accepts_proof(&a).is_ok());
    }

    #[test]
    fn expiry_cutoff_is_grace_days_before_now() {
        let now = Utc.with_ymd_and_hms(2025, 12, 8, 12, 0, 0).unwrap();
        assert_eq!(
            AppointmentLifecycle::expiry_cutoff(now, 3),
            Utc.with_ymd_and_hms(2025, 12, 5, 12, 0, 0).unwrap()
        );
    }
}
