//! Payment gateway client.
//!
//! The gateway is an external collaborator: the settlement workflow only
//! needs "create a charge" and "confirm the charge succeeded". The trait
//! keeps the workflow testable with a mock; [`HttpGateway`] talks to a
//! Zarinpal-style JSON API. No retries happen here; retry policy belongs to
//! the caller offering the user a manual try-again.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

/// Gateways respond within this window or the call is reported as failed.
const GATEWAY_TIMEOUT: Duration = Duration::from_secs(15);

/// Response code the gateway uses for an accepted request.
const CODE_OK: i64 = 100;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("gateway request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("gateway rejected the payment (code {0})")]
    Rejected(i64),

    #[error("gateway returned a malformed response: {0}")]
    Malformed(&'static str),
}

#[derive(Debug, Clone)]
pub struct ChargeSession {
    pub authority: String,
    pub payment_url: String,
}

#[derive(Debug, Clone)]
pub struct VerifiedPayment {
    pub ref_id: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn request_payment(
        &self,
        amount: i64,
        description: &str,
        callback_url: &str,
    ) -> Result<ChargeSession, GatewayError>;

    async fn verify_payment(
        &self,
        authority: &str,
        amount: i64,
    ) -> Result<VerifiedPayment, GatewayError>;
}

pub struct HttpGateway {
    client: reqwest::Client,
    base_url: String,
    merchant_id: String,
}

impl HttpGateway {
    pub fn new(base_url: &str, merchant_id: &str) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(GATEWAY_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            merchant_id: merchant_id.to_string(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct RequestResponse {
    code: i64,
    authority: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    code: i64,
    ref_id: Option<i64>,
}

#[async_trait]
impl PaymentGateway for HttpGateway {
    async fn request_payment(
        &self,
        amount: i64,
        description: &str,
        callback_url: &str,
    ) -> Result<ChargeSession, GatewayError> {
        let response = self
            .client
            .post(format!("{}/payment/request.json", self.base_url))
            .json(&serde_json::json!({
                "merchant_id": self.merchant_id,
                "amount": amount,
                "description": description,
                "callback_url": callback_url,
            }))
            .send()
            .await?
            .error_for_status()?;
        let body: RequestResponse = response.json().await?;
        if body.code != CODE_OK {
            return Err(GatewayError::Rejected(body.code));
        }
        let authority = body.authority.ok_or(GatewayError::Malformed("missing authority"))?;
        let payment_url = format!("{}/payment/start/{authority}", self.base_url);
        Ok(ChargeSession {
            authority,
            payment_url,
        })
    }

    async fn verify_payment(
        &self,
        authority: &str,
        amount: i64,
    ) -> Result<VerifiedPayment, GatewayError> {
        let response = self
            .client
            .post(format!("{}/payment/verify.json", self.base_url))
            .json(&serde_json::json!({
                "merchant_id": self.merchant_id,
                "authority": authority,
                "amount": amount,
            }))
            .send()
            .await?
            .error_for_status()?;
        let body: VerifyResponse = response.json().await?;
        if body.code != CODE_OK {
            return Err(GatewayError::Rejected(body.code));
        }
        let ref_id = body.ref_id.ok_or(GatewayError::Malformed("missing ref_id"))?;
        Ok(VerifiedPayment {
            ref_id: ref_id.to_string(),
        })
    }
}
