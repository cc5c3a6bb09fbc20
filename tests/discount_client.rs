//! Integration tests for the discount verification client.
//!
//! Each test talks to an Axum stub of the portal's discount endpoint bound to
//! a random port.

use std::time::Duration;

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use tokio::net::TcpListener;
use tokio::time::timeout;

use survey_bot::config::DiscountConfig;
use survey_bot::discount::{
    DiscountVerifier, HttpDiscountClient, VERIFICATION_FAILED, VerificationOutcome,
};
use survey_bot::error::DiscountError;

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(serde::Deserialize)]
struct DiscountRequest {
    email: String,
}

/// Replies with a JSON string built from the posted email.
async fn echo(Json(req): Json<DiscountRequest>) -> impl IntoResponse {
    Json(format!("discount for {}", req.email))
}

async fn plain_text() -> impl IntoResponse {
    "Скидка 5%"
}

async fn server_error() -> impl IntoResponse {
    (StatusCode::INTERNAL_SERVER_ERROR, "boom")
}

async fn object() -> impl IntoResponse {
    Json(serde_json::json!({ "discount": 10 }))
}

async fn slow() -> impl IntoResponse {
    tokio::time::sleep(Duration::from_secs(3)).await;
    Json("too late")
}

/// Start the stub on a random port and return its base URL.
async fn start_stub() -> String {
    let app = Router::new()
        .route("/echo", post(echo))
        .route("/text", post(plain_text))
        .route("/error", post(server_error))
        .route("/object", post(object))
        .route("/slow", post(slow));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://127.0.0.1:{port}")
}

fn client(url: String, timeout: Duration) -> HttpDiscountClient {
    HttpDiscountClient::new(&DiscountConfig {
        api_url: url,
        timeout,
    })
}

#[tokio::test]
async fn posts_email_and_unwraps_json_string() {
    timeout(TEST_TIMEOUT, async {
        let base = start_stub().await;
        let client = client(format!("{base}/echo"), Duration::from_secs(2));

        assert_eq!(
            client.verify("jane@example.com").await,
            "discount for jane@example.com"
        );
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn empty_and_oversized_emails_are_sent_as_is() {
    timeout(TEST_TIMEOUT, async {
        let base = start_stub().await;
        let client = client(format!("{base}/echo"), Duration::from_secs(2));

        assert_eq!(client.verify("").await, "discount for ");

        let huge = "x".repeat(100_000);
        assert_eq!(client.verify(&huge).await, format!("discount for {huge}"));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn plain_text_body_is_returned_verbatim() {
    timeout(TEST_TIMEOUT, async {
        let base = start_stub().await;
        let client = client(format!("{base}/text"), Duration::from_secs(2));
        assert_eq!(client.verify("jane@example.com").await, "Скидка 5%");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn error_status_becomes_sentinel() {
    timeout(TEST_TIMEOUT, async {
        let base = start_stub().await;
        let client = client(format!("{base}/error"), Duration::from_secs(2));

        assert!(matches!(
            client.check("jane@example.com").await,
            VerificationOutcome::Failure(DiscountError::Status { status: 500 })
        ));
        assert_eq!(client.verify("jane@example.com").await, VERIFICATION_FAILED);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn missing_route_becomes_sentinel() {
    timeout(TEST_TIMEOUT, async {
        let base = start_stub().await;
        let client = client(format!("{base}/missing"), Duration::from_secs(2));
        assert_eq!(client.verify("jane@example.com").await, VERIFICATION_FAILED);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn json_object_is_malformed() {
    timeout(TEST_TIMEOUT, async {
        let base = start_stub().await;
        let client = client(format!("{base}/object"), Duration::from_secs(2));

        assert!(matches!(
            client.check("jane@example.com").await,
            VerificationOutcome::Failure(DiscountError::Malformed(_))
        ));
        assert_eq!(client.verify("jane@example.com").await, VERIFICATION_FAILED);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn slow_service_times_out_into_sentinel() {
    timeout(TEST_TIMEOUT, async {
        let base = start_stub().await;
        let client = client(format!("{base}/slow"), Duration::from_millis(200));

        assert!(matches!(
            client.check("jane@example.com").await,
            VerificationOutcome::Failure(DiscountError::Timeout(_))
        ));
        assert_eq!(client.verify("jane@example.com").await, VERIFICATION_FAILED);
    })
    .await
    .expect("test timed out");
}
