use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use hmac::{Hmac, Mac};
use messenger_relay::completion::FALLBACK_REPLY;
use messenger_relay::signature::SIGNATURE_HEADER;
use messenger_relay::{router, server, Config};
use serde_json::json;
use sha2::Sha256;
use tower::ServiceExt;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const APP_SECRET: &str = "app-secret";

fn app(server: &MockServer, app_secret: Option<&str>) -> Router {
    let mut vars = HashMap::from([
        ("PAGE_ACCESS_TOKEN".to_string(), "page-token".to_string()),
        ("VERIFY_TOKEN".to_string(), "verify-me".to_string()),
        ("OPENAI_KEY".to_string(), "sk-test".to_string()),
        ("SEND_API_URL".to_string(), format!("{}/me/messages", server.uri())),
        (
            "COMPLETION_API_URL".to_string(),
            format!("{}/v1/chat/completions", server.uri()),
        ),
    ]);
    if let Some(secret) = app_secret {
        vars.insert("APP_SECRET".to_string(), secret.to_string());
    }
    let config = Config::from_lookup(|key| vars.get(key).cloned());
    router(Arc::new(server::build_bridge(&config)))
}

fn sign(app_secret: &str, body: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(app_secret.as_bytes()).unwrap();
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn delivery(text: &str) -> String {
    json!({
        "object": "page",
        "entry": [{
            "id": "PAGE",
            "time": 1458692752478u64,
            "messaging": [{
                "sender": {"id": "U1"},
                "recipient": {"id": "PAGE"},
                "timestamp": 1458692752478u64,
                "message": {"mid": "mid.1", "text": text}
            }]
        }]
    })
    .to_string()
}

fn post(body: String, signature: Option<String>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/webhook")
        .header("content-type", "application/json");
    if let Some(signature) = signature {
        builder = builder.header(SIGNATURE_HEADER, signature);
    }
    builder.body(Body::from(body)).unwrap()
}

async fn mount_completion(server: &MockServer, reply: &str) {
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": reply}}]
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn verification_handshake() {
    let server = MockServer::start().await;
    let app = app(&server, None);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/webhook?hub.mode=subscribe&hub.verify_token=verify-me&hub.challenge=c123")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "c123");

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/webhook?hub.mode=subscribe&hub.verify_token=wrong&hub.challenge=c123")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .oneshot(Request::builder().uri("/webhook").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn message_is_answered_through_both_apis() {
    let server = MockServer::start().await;
    mount_completion(&server, " hello back ").await;
    Mock::given(method("POST"))
        .and(path("/me/messages"))
        .and(query_param("access_token", "page-token"))
        .and(body_partial_json(json!({
            "recipient": {"id": "U1"},
            "message": {"text": "hello back"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "recipient_id": "U1",
            "message_id": "m_1"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let response = app(&server, None)
        .oneshot(post(delivery("hi"), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "EVENT_RECEIVED");
}

#[tokio::test]
async fn completion_failure_sends_fallback() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_string("quota exceeded"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/me/messages"))
        .and(body_partial_json(json!({"message": {"text": FALLBACK_REPLY}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let response = app(&server, None)
        .oneshot(post(delivery("hi"), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn send_failure_is_still_acknowledged() {
    let server = MockServer::start().await;
    mount_completion(&server, "hello back").await;
    Mock::given(method("POST"))
        .and(path("/me/messages"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {"message": "(#100) No matching user found", "code": 100}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let response = app(&server, None)
        .oneshot(post(delivery("hi"), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "EVENT_RECEIVED");
}

#[tokio::test]
async fn malformed_delivery_is_internal_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let response = app(&server, None)
        .oneshot(post("{not json".to_string(), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_text(response).await, "Internal server error");
}

#[tokio::test]
async fn signed_deliveries_are_checked() {
    let server = MockServer::start().await;
    mount_completion(&server, "hello back").await;
    Mock::given(method("POST"))
        .and(path("/me/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let app = app(&server, Some(APP_SECRET));
    let body = delivery("hi");

    let response = app
        .clone()
        .oneshot(post(body.clone(), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .clone()
        .oneshot(post(body.clone(), Some(sign("wrong-secret", body.as_bytes()))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let signature = sign(APP_SECRET, body.as_bytes());
    let response = app.oneshot(post(body, Some(signature))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn health_route() {
    let server = MockServer::start().await;
    let response = app(&server, None)
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "OK");
}
