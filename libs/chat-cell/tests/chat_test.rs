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

use chat_cell::{chat_routes, ChatError, ChatService, SendMessageRequest};
use shared_utils::test_utils::{TestConfig, TestUser, JwtTestUtils, MockSupabaseResponses};

fn request_to(receiver: &str, content: &str) -> SendMessageRequest {
    SendMessageRequest {
        receiver_id: Some(Uuid::parse_str(receiver).unwrap()),
        content: Some(content.to_string()),
    }
}

async fn mount_user(server: &MockServer, row: Value) {
    let id = row["id"].as_str().unwrap().to_string();
    Mock::given(method("GET"))
        .and(path("/rest/v1/users"))
        .and(query_param("id", format!("eq.{}", id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([row])))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_patient_messages_doctor_and_doctor_is_notified() {
    let server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&server.uri());
    let patient = TestUser::patient("pat@example.com");
    let doctor_id = Uuid::new_v4().to_string();

    mount_user(&server, MockSupabaseResponses::doctor_row(&doctor_id, "approved")).await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/messages"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockSupabaseResponses::message_row(&patient.id, &doctor_id, "Is fasting needed?")
        ])))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/notifications"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockSupabaseResponses::notification_row(&doctor_id, "message", None)
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let message = ChatService::new(&config)
        .send(&patient.to_user(), request_to(&doctor_id, "  Is fasting needed?  "), "patient-token")
        .await
        .unwrap();

    assert_eq!(message.receiver_id.to_string(), doctor_id);

    let requests = server.received_requests().await.unwrap();
    let insert = requests.iter().find(|r| r.url.path() == "/rest/v1/messages").unwrap();
    let row: Value = serde_json::from_slice(&insert.body).unwrap();
    assert_eq!(row["content"], "Is fasting needed?");
    assert_eq!(row["sender_id"], patient.id);

    let notification = requests.iter().find(|r| r.url.path() == "/rest/v1/notifications").unwrap();
    let sent: Value = serde_json::from_slice(&notification.body).unwrap();
    assert_eq!(sent["type"], "message");
    assert_eq!(sent["user_id"], doctor_id);
}

#[tokio::test]
async fn test_patients_cannot_message_each_other() {
    let server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&server.uri());
    let sender = TestUser::patient("a@example.com");
    let other_id = Uuid::new_v4().to_string();

    mount_user(&server, MockSupabaseResponses::user_row(&other_id, "b@example.com", "patient")).await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/messages"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let result = ChatService::new(&config)
        .send(&sender.to_user(), request_to(&other_id, "hi"), "token")
        .await;

    assert_matches!(result, Err(ChatError::Forbidden(_)));
}

#[tokio::test]
async fn test_admin_cannot_chat_and_unknown_receiver_is_not_found() {
    let server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&server.uri());
    let service = ChatService::new(&config);

    let admin = TestUser::admin("admin@example.com").to_user();
    let result = service.send(&admin, request_to(&Uuid::new_v4().to_string(), "hi"), "token").await;
    assert_matches!(result, Err(ChatError::Forbidden(_)));

    Mock::given(method("GET"))
        .and(path("/rest/v1/users"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let doctor = TestUser::doctor("doc@example.com").to_user();
    let result = service.send(&doctor, request_to(&Uuid::new_v4().to_string(), "hi"), "token").await;
    assert_matches!(result, Err(ChatError::RecipientNotFound));
}

#[tokio::test]
async fn test_invalid_messages_are_rejected_before_any_lookup() {
    let server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&server.uri());
    let service = ChatService::new(&config);
    let patient = TestUser::patient("pat@example.com");
    let user = patient.to_user();

    let result = service.send(&user, SendMessageRequest::default(), "token").await;
    assert_matches!(result, Err(ChatError::ValidationError(_)));

    let result = service.send(&user, request_to(&Uuid::new_v4().to_string(), &"x".repeat(4001)), "token").await;
    assert_matches!(result, Err(ChatError::ValidationError(_)));

    let result = service.send(&user, request_to(&patient.id, "note to self"), "token").await;
    assert_matches!(result, Err(ChatError::ValidationError(_)));

    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_conversation_route_returns_both_directions() {
    let server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&server.uri());
    let doctor = TestUser::doctor("doc@example.com");
    let patient_id = Uuid::new_v4().to_string();
    let token = JwtTestUtils::create_test_token(&doctor, &config.supabase_jwt_secret, Some(1));

    Mock::given(method("GET"))
        .and(path("/rest/v1/messages"))
        .and(query_param(
            "or",
            format!(
                "(and(sender_id.eq.{d},receiver_id.eq.{p}),and(sender_id.eq.{p},receiver_id.eq.{d}))",
                d = doctor.id,
                p = patient_id
            ),
        ))
        .and(query_param("order", "created_at.asc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::message_row(&patient_id, &doctor.id, "Hello doctor"),
            MockSupabaseResponses::message_row(&doctor.id, &patient_id, "Hello, how can I help?")
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let response = chat_routes(Arc::new(config))
        .oneshot(
            Request::builder()
                .uri(format!("/conversations/{}", patient_id))
                .header("Authorization", format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["messages"].as_array().unwrap().len(), 2);
    assert_eq!(body["messages"][0]["content"], "Hello doctor");
}

#[tokio::test]
async fn test_mark_read_only_touches_incoming_messages() {
    let server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&server.uri());
    let caller = Uuid::new_v4();
    let other = Uuid::new_v4();

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/messages"))
        .and(query_param("sender_id", format!("eq.{}", other)))
        .and(query_param("receiver_id", format!("eq.{}", caller)))
        .and(query_param("is_read", "eq.false"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::message_row(&other.to_string(), &caller.to_string(), "one"),
            MockSupabaseResponses::message_row(&other.to_string(), &caller.to_string(), "two")
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let updated = ChatService::new(&config).mark_read(caller, other, "token").await.unwrap();
    assert_eq!(updated, 2);
}
