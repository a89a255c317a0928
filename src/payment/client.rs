use async_trait::async_trait;
use failsafe::futures::CircuitBreaker as FuturesCircuitBreaker;
use failsafe::{backoff, failure_policy, Config, Error as FailsafeError, StateMachine};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::ports::{GatewayError, PaymentGateway, PaymentReceipt};

const DUPLICATE_MARKER: &str = "external id already exists";

#[derive(Debug, Serialize)]
struct PaymentRequest<'a> {
    amount: i64,
    external_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct PaymentResponse {
    data: PaymentData,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PaymentData {
    id: String,
    external_id: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
}

/// HTTP client for the payment provider's disbursement API.
#[derive(Clone)]
pub struct PaymentClient {
    client: Client,
    base_url: String,
    circuit_breaker: StateMachine<failure_policy::ConsecutiveFailures<backoff::EqualJittered>, ()>,
}

impl PaymentClient {
    pub fn new(base_url: String, timeout: Duration) -> Self {
        Self::with_circuit_breaker(base_url, timeout, 3, 60)
    }

    pub fn with_circuit_breaker(
        base_url: String,
        timeout: Duration,
        failure_threshold: u32,
        reset_timeout_secs: u64,
    ) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();

        let backoff = backoff::equal_jittered(
            Duration::from_secs(reset_timeout_secs),
            Duration::from_secs(reset_timeout_secs * 2),
        );
        let policy = failure_policy::consecutive_failures(failure_threshold, backoff);
        let circuit_breaker = Config::new().failure_policy(policy).build();

        PaymentClient {
            client,
            base_url,
            circuit_breaker,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the current state of the circuit breaker
    pub fn circuit_state(&self) -> String {
        if self.circuit_breaker.is_call_permitted() {
            "closed".to_string()
        } else {
            "open".to_string()
        }
    }

    async fn post_payment(
        client: Client,
        url: String,
        amount: i64,
        external_id: String,
    ) -> Result<PaymentReceipt, GatewayError> {
        let response = client
            .post(&url)
            .json(&PaymentRequest {
                amount,
                external_id: &external_id,
            })
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorBody>(&body)
                .ok()
                .and_then(|b| b.message)
                .unwrap_or(body);

            if status == StatusCode::CONFLICT
                || message.to_ascii_lowercase().contains(DUPLICATE_MARKER)
            {
                return Err(GatewayError::DuplicateSubmission(message));
            }
            return Err(GatewayError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: PaymentResponse = serde_json::from_str(&body)
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;

        Ok(PaymentReceipt {
            provider_id: parsed.data.id,
            external_id: parsed.data.external_id,
            status: parsed.data.status,
            message: parsed.message,
        })
    }
}

/// Only provider outages trip the breaker; business rejections do not.
fn counts_as_failure(err: &GatewayError) -> bool {
    match err {
        GatewayError::Transport(_) => true,
        GatewayError::Rejected { status, .. } => *status >= 500,
        _ => false,
    }
}

#[async_trait]
impl PaymentGateway for PaymentClient {
    async fn settle(
        &self,
        amount: i64,
        idempotency_token: &str,
    ) -> Result<PaymentReceipt, GatewayError> {
        let url = format!("{}/v1/payments", self.base_url.trim_end_matches('/'));
        let client = self.client.clone();
        let external_id = idempotency_token.to_string();

        let result = self
            .circuit_breaker
            .call_with(
                counts_as_failure,
                Self::post_payment(client, url, amount, external_id),
            )
            .await;

        match result {
            Ok(receipt) => Ok(receipt),
            Err(FailsafeError::Rejected) => Err(GatewayError::CircuitOpen(
                "payment provider circuit breaker is open".to_string(),
            )),
            Err(FailsafeError::Inner(e)) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn client_for(server: &mockito::ServerGuard) -> PaymentClient {
        PaymentClient::new(server.url(), Duration::from_secs(5))
    }

    #[test]
    fn test_payment_client_creation() {
        let client = PaymentClient::new(
            "https://pay.example.com/".to_string(),
            Duration::from_secs(30),
        );
        assert_eq!(client.base_url(), "https://pay.example.com/");
        assert_eq!(client.circuit_state(), "closed");
    }

    #[tokio::test]
    async fn test_settle_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/payments")
            .match_body(Matcher::Json(serde_json::json!({
                "amount": 500000,
                "external_id": "tok-1"
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"data":{"id":"pay_1","external_id":"tok-1","status":"success"}}"#)
            .create_async()
            .await;

        let receipt = client_for(&server).settle(500_000, "tok-1").await.unwrap();

        mock.assert_async().await;
        assert!(receipt.is_success());
        assert_eq!(receipt.provider_id, "pay_1");
        assert_eq!(receipt.external_id, "tok-1");
    }

    #[tokio::test]
    async fn test_settle_conflict_is_duplicate() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/payments")
            .with_status(409)
            .with_body(r#"{"message":"conflict"}"#)
            .create_async()
            .await;

        let err = client_for(&server)
            .settle(500_000, "tok-2")
            .await
            .unwrap_err();
        assert!(err.is_duplicate_submission());
    }

    #[tokio::test]
    async fn test_settle_duplicate_message_is_duplicate() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/payments")
            .with_status(400)
            .with_body(r#"{"message":"External ID already exists"}"#)
            .create_async()
            .await;

        let err = client_for(&server)
            .settle(500_000, "tok-3")
            .await
            .unwrap_err();
        assert!(err.is_duplicate_submission());
    }

    #[tokio::test]
    async fn test_settle_rejection() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/payments")
            .with_status(422)
            .with_body(r#"{"message":"insufficient balance"}"#)
            .create_async()
            .await;

        let err = client_for(&server)
            .settle(500_000, "tok-4")
            .await
            .unwrap_err();
        match err {
            GatewayError::Rejected { status, message } => {
                assert_eq!(status, 422);
                assert_eq!(message, "insufficient balance");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_settle_non_success_status_is_reported() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/payments")
            .with_status(200)
            .with_body(
                serde_json::json!({
                    "data": {"id": "pay_5", "external_id": "tok-5", "status": "failed"},
                    "message": "declined"
                })
                .to_string(),
            )
            .create_async()
            .await;

        let receipt = client_for(&server).settle(500_000, "tok-5").await.unwrap();
        assert!(!receipt.is_success());
        assert_eq!(receipt.message.as_deref(), Some("declined"));
    }

    #[tokio::test]
    async fn test_settle_garbled_body() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/payments")
            .with_status(200)
            .with_body("not json")
            .create_async()
            .await;

        let err = client_for(&server)
            .settle(500_000, "tok-6")
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_server_errors_open_the_breaker() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/payments")
            .with_status(503)
            .expect_at_least(2)
            .create_async()
            .await;

        let client =
            PaymentClient::with_circuit_breaker(server.url(), Duration::from_secs(5), 2, 60);
        for _ in 0..2 {
            let err = client.settle(500_000, "tok").await.unwrap_err();
            assert!(matches!(err, GatewayError::Rejected { status: 503, .. }));
        }

        assert_eq!(client.circuit_state(), "open");
        let err = client.settle(500_000, "tok").await.unwrap_err();
        assert!(matches!(err, GatewayError::CircuitOpen(_)));
    }
}
