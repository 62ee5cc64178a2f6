use std::sync::Arc;

use assert_matches::assert_matches;
use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::{MockServer, Mock, ResponseTemplate};
use wiremock::matchers::{method, path, query_param};

use prescription_cell::{prescription_routes, CreatePrescriptionRequest, PrescriptionError, PrescriptionService};
use shared_utils::test_utils::{TestConfig, TestUser, JwtTestUtils, MockSupabaseResponses};

fn request_for(patient_id: &str) -> CreatePrescriptionRequest {
    serde_json::from_value(json!({
        "patientId": patient_id,
        "diagnosis": "Seasonal allergic rhinitis",
        "medications": [
            { "name": "Cetirizine", "dosage": "10mg", "frequency": "Once daily", "duration": "14 days" }
        ],
        "notes": "  "
    }))
    .unwrap()
}

async fn mount_doctor(server: &MockServer, doctor_id: &str, status: &str) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/users"))
        .and(query_param("id", format!("eq.{}", doctor_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::doctor_row(doctor_id, status)
        ])))
        .mount(server)
        .await;
}

async fn mount_appointment_check(server: &MockServer, doctor_id: &str, patient_id: &str, rows: Value) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("doctor_id", format!("eq.{}", doctor_id)))
        .and(query_param("patient_id", format!("eq.{}", patient_id)))
        .and(query_param("status", "eq.approved"))
        .respond_with(ResponseTemplate::new(200).set_body_json(rows))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_doctor_with_approved_appointment_prescribes_and_patient_is_notified() {
    let server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&server.uri());
    let doctor = TestUser::doctor("doc@example.com");
    let patient_id = Uuid::new_v4().to_string();
    let prescription_id = Uuid::new_v4().to_string();

    mount_doctor(&server, &doctor.id, "approved").await;
    mount_appointment_check(&server, &doctor.id, &patient_id, json!([{ "id": Uuid::new_v4() }])).await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/prescriptions"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockSupabaseResponses::prescription_row(&prescription_id, &doctor.id, &patient_id)
        ])))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/notifications"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockSupabaseResponses::notification_row(&patient_id, "prescription", Some(&prescription_id))
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let prescription = PrescriptionService::new(&config)
        .create(&doctor.to_user(), request_for(&patient_id), "doctor-token")
        .await
        .unwrap();

    assert_eq!(prescription.id.to_string(), prescription_id);
    assert_eq!(prescription.medications.len(), 1);

    let requests = server.received_requests().await.unwrap();
    let insert = requests.iter().find(|r| r.url.path() == "/rest/v1/prescriptions").unwrap();
    let row: Value = serde_json::from_slice(&insert.body).unwrap();
    assert_eq!(row["patient_id"], patient_id);
    assert_eq!(row["notes"], Value::Null);
    assert_eq!(row["medications"][0]["name"], "Cetirizine");

    let notification = requests.iter().find(|r| r.url.path() == "/rest/v1/notifications").unwrap();
    let sent: Value = serde_json::from_slice(&notification.body).unwrap();
    assert_eq!(sent["type"], "prescription");
    assert_eq!(sent["user_id"], patient_id);
}

#[tokio::test]
async fn test_prescribing_without_approved_appointment_is_a_state_error() {
    let server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&server.uri());
    let doctor = TestUser::doctor("doc@example.com");
    let patient_id = Uuid::new_v4().to_string();

    mount_doctor(&server, &doctor.id, "approved").await;
    mount_appointment_check(&server, &doctor.id, &patient_id, json!([])).await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/prescriptions"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let result = PrescriptionService::new(&config)
        .create(&doctor.to_user(), request_for(&patient_id), "doctor-token")
        .await;

    assert_matches!(result, Err(PrescriptionError::NoApprovedAppointment));
}

#[tokio::test]
async fn test_named_appointment_narrows_the_check() {
    let server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&server.uri());
    let doctor = TestUser::doctor("doc@example.com");
    let patient_id = Uuid::new_v4().to_string();
    let appointment_id = Uuid::new_v4();

    mount_doctor(&server, &doctor.id, "approved").await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", appointment_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let mut request = request_for(&patient_id);
    request.appointment_id = Some(appointment_id);

    let result = PrescriptionService::new(&config)
        .create(&doctor.to_user(), request, "doctor-token")
        .await;

    assert_matches!(result, Err(PrescriptionError::NoApprovedAppointment));
}

#[tokio::test]
async fn test_unapproved_doctor_cannot_prescribe() {
    let server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&server.uri());
    let doctor = TestUser::doctor("doc@example.com");

    mount_doctor(&server, &doctor.id, "pending").await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&server)
        .await;

    let result = PrescriptionService::new(&config)
        .create(&doctor.to_user(), request_for(&Uuid::new_v4().to_string()), "doctor-token")
        .await;

    assert_matches!(result, Err(PrescriptionError::DoctorNotApproved));
}

#[tokio::test]
async fn test_input_and_role_checks_precede_lookups() {
    let server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&server.uri());
    let service = PrescriptionService::new(&config);
    let doctor = TestUser::doctor("doc@example.com").to_user();

    let patient = TestUser::patient("pat@example.com").to_user();
    let result = service.create(&patient, request_for(&Uuid::new_v4().to_string()), "token").await;
    assert_matches!(result, Err(PrescriptionError::Forbidden(_)));

    let mut no_medications = request_for(&Uuid::new_v4().to_string());
    no_medications.medications.clear();
    let result = service.create(&doctor, no_medications, "token").await;
    assert_matches!(result, Err(PrescriptionError::ValidationError(_)));

    let result = service.create(&doctor, CreatePrescriptionRequest::default(), "token").await;
    assert_matches!(result, Err(PrescriptionError::ValidationError(_)));

    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_prescription_visible_to_participants_and_admins_only() {
    let server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&server.uri());
    let doctor = TestUser::doctor("doc@example.com");
    let patient = TestUser::patient("pat@example.com");
    let stranger = TestUser::patient("other@example.com");
    let admin = TestUser::admin("admin@example.com");
    let prescription_id = Uuid::new_v4().to_string();

    Mock::given(method("GET"))
        .and(path("/rest/v1/prescriptions"))
        .and(query_param("id", format!("eq.{}", prescription_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::prescription_row(&prescription_id, &doctor.id, &patient.id)
        ])))
        .mount(&server)
        .await;

    let secret = config.supabase_jwt_secret.clone();
    let app = prescription_routes(Arc::new(config));

    for (user, expected) in [
        (&patient, StatusCode::OK),
        (&doctor, StatusCode::OK),
        (&admin, StatusCode::OK),
        (&stranger, StatusCode::FORBIDDEN),
    ] {
        let token = JwtTestUtils::create_test_token(user, &secret, Some(1));
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/{}", prescription_id))
                    .header("Authorization", format!("Bearer {}", token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), expected, "role {}", user.role);
    }
}

#[tokio::test]
async fn test_patient_listing_is_role_gated() {
    let server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&server.uri());
    let doctor = TestUser::doctor("doc@example.com");
    let token = JwtTestUtils::create_test_token(&doctor, &config.supabase_jwt_secret, Some(1));

    let response = prescription_routes(Arc::new(config))
        .oneshot(
            Request::builder()
                .uri("/patient")
                .header("Authorization", format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(server.received_requests().await.unwrap().is_empty());
}
