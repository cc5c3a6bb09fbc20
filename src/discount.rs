//! Discount verification — asks the portal whether an email qualifies for a
//! discount.
//!
//! The client is total: whatever happens on the wire, the caller gets a
//! status string back. Failures are kept typed ([`VerificationOutcome`])
//! until the [`DiscountVerifier`] boundary, where they collapse into
//! [`VERIFICATION_FAILED`].

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::config::DiscountConfig;
use crate::error::DiscountError;

/// Status string returned for every failed verification.
pub const VERIFICATION_FAILED: &str = "Ошибка при проверке скидки";

/// Whether a status string denotes a failed verification.
pub fn is_failure(status: &str) -> bool {
    status == VERIFICATION_FAILED
}

/// Typed result of one verification call.
#[derive(Debug)]
pub enum VerificationOutcome {
    /// The service's reply, to be shown to the user as-is.
    Success(String),
    Failure(DiscountError),
}

impl VerificationOutcome {
    /// Collapse into the user-facing status string.
    pub fn into_status(self) -> String {
        match self {
            Self::Success(status) => status,
            Self::Failure(_) => VERIFICATION_FAILED.to_string(),
        }
    }
}

/// Anything that can check an email for a discount.
#[async_trait]
pub trait DiscountVerifier: Send + Sync {
    /// Never fails: errors come back as [`VERIFICATION_FAILED`].
    async fn verify(&self, email: &str) -> String;
}

#[derive(Serialize)]
struct DiscountRequest<'a> {
    email: &'a str,
}

/// HTTP client for the portal's discount endpoint.
pub struct HttpDiscountClient {
    client: reqwest::Client,
    api_url: String,
    timeout: Duration,
}

impl HttpDiscountClient {
    pub fn new(config: &DiscountConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: config.api_url.clone(),
            timeout: config.timeout,
        }
    }

    /// POST the email and classify the reply.
    ///
    /// No email syntax check happens here or anywhere else.
    pub async fn check(&self, email: &str) -> VerificationOutcome {
        match tokio::time::timeout(self.timeout, self.request(email)).await {
            Ok(Ok(status)) => VerificationOutcome::Success(status),
            Ok(Err(e)) => VerificationOutcome::Failure(e),
            Err(_) => VerificationOutcome::Failure(DiscountError::Timeout(self.timeout)),
        }
    }

    async fn request(&self, email: &str) -> Result<String, DiscountError> {
        let resp = self
            .client
            .post(&self.api_url)
            .json(&DiscountRequest { email })
            .send()
            .await
            .map_err(|e| DiscountError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(DiscountError::Status {
                status: status.as_u16(),
            });
        }

        let body = resp
            .text()
            .await
            .map_err(|e| DiscountError::Transport(e.to_string()))?;
        parse_body(&body)
    }
}

#[async_trait]
impl DiscountVerifier for HttpDiscountClient {
    async fn verify(&self, email: &str) -> String {
        let outcome = self.check(email).await;
        match &outcome {
            VerificationOutcome::Success(status) => {
                tracing::info!(status = %status, "Discount verification succeeded");
            }
            VerificationOutcome::Failure(e) => {
                tracing::warn!(error = %e, url = %self.api_url, "Discount verification failed");
            }
        }
        outcome.into_status()
    }
}

/// Extract the status text from a 2xx response body.
///
/// A JSON string is unwrapped; JSON numbers and booleans use their textual
/// form; a body that is not JSON at all is taken verbatim. Objects, arrays,
/// `null` and blank bodies are malformed.
fn parse_body(body: &str) -> Result<String, DiscountError> {
    if body.trim().is_empty() {
        return Err(DiscountError::Malformed("empty body".into()));
    }

    let status = match serde_json::from_str::<serde_json::Value>(body) {
        Ok(serde_json::Value::String(s)) => s,
        Ok(v @ (serde_json::Value::Number(_) | serde_json::Value::Bool(_))) => v.to_string(),
        Ok(other) => {
            let kind = match other {
                serde_json::Value::Null => "null",
                serde_json::Value::Array(_) => "array",
                _ => "object",
            };
            return Err(DiscountError::Malformed(format!(
                "expected a string, got {kind}"
            )));
        }
        Err(_) => body.to_string(),
    };

    if status.trim().is_empty() {
        return Err(DiscountError::Malformed("blank status".into()));
    }
    Ok(status)
}
