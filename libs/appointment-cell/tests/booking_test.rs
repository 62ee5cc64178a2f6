use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    response::Response,
};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::{MockServer, Mock, ResponseTemplate};
use wiremock::matchers::{method, path, query_param};

use appointment_cell::appointment_routes;
use shared_utils::test_utils::{TestConfig, TestUser, JwtTestUtils, MockSupabaseResponses};

struct Fixture {
    server: MockServer,
    app: axum::Router,
    doctor_id: String,
    jwt_secret: String,
}

impl Fixture {
    async fn new(doctor_status: &str) -> Self {
        let server = MockServer::start().await;
        let config = TestConfig::with_supabase_url(&server.uri());
        let doctor_id = Uuid::new_v4().to_string();

        Mock::given(method("GET"))
            .and(path("/rest/v1/users"))
            .and(query_param("id", format!("eq.{}", doctor_id)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                MockSupabaseResponses::doctor_row(&doctor_id, doctor_status)
            ])))
            .mount(&server)
            .await;

        Self {
            jwt_secret: config.supabase_jwt_secret.clone(),
            app: appointment_routes(Arc::new(config)),
            server,
            doctor_id,
        }
    }

    fn token_for(&self, user: &TestUser) -> String {
        JwtTestUtils::create_test_token(user, &self.jwt_secret, Some(1))
    }

    async fn book(&self, user: &TestUser, body: Value) -> Response {
        self.app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/book")
                    .header("Authorization", format!("Bearer {}", self.token_for(user)))
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap()
    }

    fn booking_body(&self) -> Value {
        json!({
            "doctorId": self.doctor_id,
            "appointmentDate": "2025-12-05",
            "appointmentTime": "10:00"
        })
    }

    async fn mount_slot_query(&self, held_times: Value, expected_calls: u64) {
        Mock::given(method("GET"))
            .and(path("/rest/v1/appointments"))
            .and(query_param("select", "appointment_time"))
            .and(query_param("doctor_id", format!("eq.{}", self.doctor_id)))
            .and(query_param("appointment_date", "eq.2025-12-05"))
            .and(query_param("status", "in.(pending,approved)"))
            .respond_with(ResponseTemplate::new(200).set_body_json(held_times))
            .expect(expected_calls)
            .mount(&self.server)
            .await;
    }

    async fn count_requests(&self, verb: &str, route: &str) -> usize {
        self.server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .filter(|r| r.method.as_str() == verb && r.url.path() == route)
            .count()
    }
}

async fn json_body(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_first_booking_is_pending_and_notifies_doctor_once() {
    let fixture = Fixture::new("approved").await;
    let patient = TestUser::patient("first@example.com");
    let appointment_id = Uuid::new_v4().to_string();

    fixture.mount_slot_query(json!([]), 1).await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockSupabaseResponses::appointment_row(&appointment_id, &patient.id, &fixture.doctor_id, "pending", None)
        ])))
        .expect(1)
        .mount(&fixture.server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/notifications"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockSupabaseResponses::notification_row(&fixture.doctor_id, "appointment", Some(&appointment_id))
        ])))
        .expect(1)
        .mount(&fixture.server)
        .await;

    let response = fixture.book(&patient, fixture.booking_body()).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["appointment"]["status"], "pending");
    assert_eq!(body["appointment"]["payment_screenshot_url"], Value::Null);
    assert_eq!(body["appointment"]["appointment_time"], "10:00");

    let requests = fixture.server.received_requests().await.unwrap();
    let insert = requests
        .iter()
        .find(|r| r.method.as_str() == "POST" && r.url.path() == "/rest/v1/appointments")
        .unwrap();
    let row: Value = serde_json::from_slice(&insert.body).unwrap();
    assert_eq!(row["status"], "pending");
    assert_eq!(row["patient_id"], patient.id);
    assert_eq!(row["appointment_time"], "10:00:00");

    let notification = requests
        .iter()
        .find(|r| r.url.path() == "/rest/v1/notifications")
        .unwrap();
    let sent: Value = serde_json::from_slice(&notification.body).unwrap();
    assert_eq!(sent["user_id"], fixture.doctor_id);
    assert_eq!(sent["related_id"], appointment_id);
    assert_eq!(sent["type"], "appointment");
}

#[tokio::test]
async fn test_second_patient_on_held_slot_gets_conflict() {
    let fixture = Fixture::new("approved").await;
    let second = TestUser::patient("second@example.com");

    fixture.mount_slot_query(json!([{ "appointment_time": "10:00:00" }]), 1).await;

    let response = fixture.book(&second, fixture.booking_body()).await;

    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(fixture.count_requests("POST", "/rest/v1/appointments").await, 0);
    assert_eq!(fixture.count_requests("POST", "/rest/v1/notifications").await, 0);
}

#[tokio::test]
async fn test_store_uniqueness_violation_maps_to_conflict() {
    let fixture = Fixture::new("approved").await;
    let patient = TestUser::patient("racer@example.com");

    // Both requests passed the read check; the partial unique index rejects ours
    fixture.mount_slot_query(json!([]), 1).await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(409).set_body_json(
            MockSupabaseResponses::error_response(
                "duplicate key value violates unique constraint \"appointments_active_slot_key\"",
                "23505",
            ),
        ))
        .mount(&fixture.server)
        .await;

    let response = fixture.book(&patient, fixture.booking_body()).await;

    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(fixture.count_requests("POST", "/rest/v1/notifications").await, 0);
}

#[tokio::test]
async fn test_unapproved_doctor_is_never_bookable() {
    for status in ["pending", "rejected"] {
        let fixture = Fixture::new(status).await;
        let patient = TestUser::patient("pat@example.com");

        fixture.mount_slot_query(json!([]), 0).await;

        let response = fixture.book(&patient, fixture.booking_body()).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "doctor status {}", status);
        let body = json_body(response).await;
        assert!(body["error"].as_str().unwrap().contains("not approved"));
    }
}

#[tokio::test]
async fn test_unknown_doctor_is_not_found() {
    let fixture = Fixture::new("approved").await;
    let patient = TestUser::patient("pat@example.com");

    Mock::given(method("GET"))
        .and(path("/rest/v1/users"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&fixture.server)
        .await;

    let response = fixture
        .book(&patient, json!({
            "doctorId": Uuid::new_v4(),
            "appointmentDate": "2025-12-05",
            "appointmentTime": "10:00"
        }))
        .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_missing_fields_are_reported_before_role() {
    let fixture = Fixture::new("approved").await;
    let doctor = TestUser::doctor("doc@example.com");

    let response = fixture
        .book(&doctor, json!({ "doctorId": fixture.doctor_id, "appointmentDate": "2025-12-05" }))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = fixture.book(&doctor, fixture.booking_body()).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    assert!(fixture.server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_booked_slots_use_the_same_status_filter() {
    let fixture = Fixture::new("approved").await;
    let patient = TestUser::patient("pat@example.com");

    fixture
        .mount_slot_query(json!([{ "appointment_time": "09:00:00" }, { "appointment_time": "10:30:00" }]), 1)
        .await;

    let response = fixture
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/doctor/{}/booked-slots?date=2025-12-05", fixture.doctor_id))
                .header("Authorization", format!("Bearer {}", fixture.token_for(&patient)))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["bookedSlots"], json!(["09:00", "10:30"]));
}

#[tokio::test]
async fn test_booked_slots_require_a_date() {
    let fixture = Fixture::new("approved").await;
    let patient = TestUser::patient("pat@example.com");

    let response = fixture
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/doctor/{}/booked-slots", fixture.doctor_id))
                .header("Authorization", format!("Bearer {}", fixture.token_for(&patient)))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_appointment_is_hidden_from_other_patients() {
    let fixture = Fixture::new("approved").await;
    let owner = TestUser::patient("owner@example.com");
    let stranger = TestUser::patient("stranger@example.com");
    let appointment_id = Uuid::new_v4().to_string();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", appointment_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::appointment_row(&appointment_id, &owner.id, &fixture.doctor_id, "pending", None)
        ])))
        .mount(&fixture.server)
        .await;

    let get = |user: &TestUser| {
        Request::builder()
            .uri(format!("/{}", appointment_id))
            .header("Authorization", format!("Bearer {}", fixture.token_for(user)))
            .body(Body::empty())
            .unwrap()
    };

    let response = fixture.app.clone().oneshot(get(&stranger)).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = fixture.app.clone().oneshot(get(&owner)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let admin = TestUser::admin("admin@example.com");
    let response = fixture.app.clone().oneshot(get(&admin)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
