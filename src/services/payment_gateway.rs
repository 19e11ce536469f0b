//! Hosted-payment gateway boundary.
//!
//! [`PaymentGateway`] is what the order engine and the confirmation path talk
//! to; [`PaystackClient`] is the production implementation.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use metrics::counter;
use rust_decimal::{prelude::ToPrimitive, Decimal, RoundingStrategy};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sha2::Sha512;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use utoipa::ToSchema;

use crate::config::AppConfig;
use crate::errors::ServiceError;

type HmacSha512 = Hmac<Sha512>;

/// Header carrying the hex HMAC-SHA512 of the raw webhook body.
pub const PAYSTACK_SIGNATURE_HEADER: &str = "x-paystack-signature";

/// Converts a decimal amount to integer minor units (pesewas), rounding half
/// away from zero.
pub fn to_minor_units(amount: Decimal) -> Result<i64, ServiceError> {
    (amount * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .ok_or_else(|| ServiceError::ValidationError(format!("amount {} is out of range", amount)))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InitializePaymentRequest {
    pub email: String,
    pub amount_minor_units: i64,
    pub reference: String,
    pub metadata: serde_json::Value,
}

/// Hosted checkout page handed back to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSession {
    pub authorization_url: String,
    pub reference: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Success,
    Failed,
    Pending,
}

impl PaymentStatus {
    /// Maps a raw Paystack transaction status.
    pub fn from_gateway(status: &str) -> Self {
        match status {
            "success" => PaymentStatus::Success,
            "failed" | "abandoned" | "reversed" => PaymentStatus::Failed,
            _ => PaymentStatus::Pending,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PaymentVerification {
    pub status: PaymentStatus,
    pub amount_minor_units: i64,
    pub reference: String,
    /// Status string exactly as the gateway reported it
    pub gateway_status: String,
    pub currency: Option<String>,
    pub channel: Option<String>,
    pub paid_at: Option<String>,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn initialize_payment(
        &self,
        request: InitializePaymentRequest,
    ) -> Result<PaymentSession, ServiceError>;

    async fn verify_payment(&self, reference: &str) -> Result<PaymentVerification, ServiceError>;

    /// Constant-time check of `signature` against the raw request body.
    fn verify_webhook_signature(&self, raw_body: &[u8], signature: &str) -> bool;
}

/// hex(HMAC-SHA512(secret, body)) compared in constant time.
pub fn verify_hmac_sha512(secret: &str, raw_body: &[u8], signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha512::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(raw_body);
    mac.verify_slice(&expected).is_ok()
}

/// Hex signature the gateway would send for `raw_body`.
pub fn sign_hmac_sha512(secret: &str, raw_body: &[u8]) -> Result<String, ServiceError> {
    let mut mac = HmacSha512::new_from_slice(secret.as_bytes())
        .map_err(|e| ServiceError::InternalError(e.to_string()))?;
    mac.update(raw_body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Paystack references are limited to this alphabet.
pub fn is_valid_reference(reference: &str) -> bool {
    !reference.is_empty()
        && reference.len() <= 100
        && reference
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '='))
}

#[derive(Debug, Clone)]
pub struct PaystackConfig {
    pub base_url: String,
    pub secret_key: String,
    pub currency: String,
    pub callback_url: Option<String>,
    pub timeout: Duration,
}

impl From<&AppConfig> for PaystackConfig {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            base_url: cfg.paystack_base_url.clone(),
            secret_key: cfg.paystack_secret_key.clone(),
            currency: cfg.currency.clone(),
            callback_url: cfg.paystack_callback_url.clone(),
            timeout: cfg.gateway_timeout(),
        }
    }
}

#[derive(Debug, Serialize)]
struct PaystackInitializeBody<'a> {
    email: &'a str,
    amount: i64,
    reference: &'a str,
    currency: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    callback_url: Option<&'a str>,
    metadata: &'a serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct PaystackEnvelope<T> {
    status: bool,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct PaystackInitializeData {
    authorization_url: String,
    reference: String,
}

#[derive(Debug, Deserialize)]
struct PaystackVerifyData {
    status: String,
    reference: String,
    amount: i64,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    paid_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PaystackErrorBody {
    #[serde(default)]
    message: String,
}

/// Paystack REST client.
#[derive(Debug, Clone)]
pub struct PaystackClient {
    http: reqwest::Client,
    config: PaystackConfig,
}

impl PaystackClient {
    pub fn new(config: PaystackConfig) -> Result<Self, ServiceError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ServiceError::InternalError(format!("http client: {}", e)))?;
        Ok(Self { http, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn read_envelope<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        response: reqwest::Response,
    ) -> Result<T, ServiceError> {
        let status = response.status();
        let body = response.text().await.map_err(|e| {
            counter!("storefront.paystack.requests", 1, "op" => operation, "outcome" => "transport_error");
            ServiceError::ExternalServiceError(format!("paystack {}: {}", operation, e))
        })?;

        if !status.is_success() {
            counter!("storefront.paystack.requests", 1, "op" => operation, "outcome" => "rejected");
            let message = serde_json::from_str::<PaystackErrorBody>(&body)
                .map(|b| b.message)
                .unwrap_or_default();
            warn!(operation, status = status.as_u16(), %message, "paystack rejected request");
            return Err(ServiceError::PaymentGateway(if message.is_empty() {
                format!("paystack {} failed with status {}", operation, status.as_u16())
            } else {
                message
            }));
        }

        let envelope: PaystackEnvelope<T> = serde_json::from_str(&body).map_err(|e| {
            counter!("storefront.paystack.requests", 1, "op" => operation, "outcome" => "invalid_response");
            ServiceError::ExternalServiceError(format!(
                "paystack {} returned an unreadable body: {}",
                operation, e
            ))
        })?;

        match envelope {
            PaystackEnvelope {
                status: true,
                data: Some(data),
                ..
            } => {
                counter!("storefront.paystack.requests", 1, "op" => operation, "outcome" => "ok");
                Ok(data)
            }
            PaystackEnvelope { message, .. } => {
                counter!("storefront.paystack.requests", 1, "op" => operation, "outcome" => "rejected");
                Err(ServiceError::PaymentGateway(if message.is_empty() {
                    format!("paystack {} was not accepted", operation)
                } else {
                    message
                }))
            }
        }
    }

    fn transport_error(operation: &'static str, err: reqwest::Error) -> ServiceError {
        counter!("storefront.paystack.requests", 1, "op" => operation, "outcome" => "transport_error");
        ServiceError::ExternalServiceError(format!("paystack {}: {}", operation, err))
    }
}

#[async_trait]
impl PaymentGateway for PaystackClient {
    #[instrument(skip(self, request), fields(reference = %request.reference, amount = request.amount_minor_units))]
    async fn initialize_payment(
        &self,
        request: InitializePaymentRequest,
    ) -> Result<PaymentSession, ServiceError> {
        let body = PaystackInitializeBody {
            email: &request.email,
            amount: request.amount_minor_units,
            reference: &request.reference,
            currency: &self.config.currency,
            callback_url: self.config.callback_url.as_deref(),
            metadata: &request.metadata,
        };

        let response = self
            .http
            .post(self.url("/transaction/initialize"))
            .bearer_auth(&self.config.secret_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Self::transport_error("initialize", e))?;

        let data: PaystackInitializeData = self.read_envelope("initialize", response).await?;
        debug!("payment session created");
        Ok(PaymentSession {
            authorization_url: data.authorization_url,
            reference: data.reference,
        })
    }

    #[instrument(skip(self))]
    async fn verify_payment(&self, reference: &str) -> Result<PaymentVerification, ServiceError> {
        if !is_valid_reference(reference) {
            return Err(ServiceError::PaymentGateway(format!(
                "invalid payment reference {}",
                reference
            )));
        }

        let response = self
            .http
            .get(self.url(&format!("/transaction/verify/{}", reference)))
            .bearer_auth(&self.config.secret_key)
            .send()
            .await
            .map_err(|e| Self::transport_error("verify", e))?;

        let data: PaystackVerifyData = self.read_envelope("verify", response).await?;
        Ok(PaymentVerification {
            status: PaymentStatus::from_gateway(&data.status),
            amount_minor_units: data.amount,
            reference: data.reference,
            gateway_status: data.status,
            currency: data.currency,
            channel: data.channel,
            paid_at: data.paid_at,
        })
    }

    fn verify_webhook_signature(&self, raw_body: &[u8], signature: &str) -> bool {
        verify_hmac_sha512(&self.config.secret_key, raw_body, signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    #[rstest]
    #[case(dec!(120), 12_000)]
    #[case(dec!(0.005), 1)]
    #[case(dec!(19.994), 1_999)]
    #[case(dec!(19.995), 2_000)]
    #[case(dec!(-0.005), -1)]
    fn minor_units_round_half_away_from_zero(#[case] amount: Decimal, #[case] expected: i64) {
        assert_eq!(to_minor_units(amount).unwrap(), expected);
    }

    #[rstest]
    #[case("success", PaymentStatus::Success)]
    #[case("failed", PaymentStatus::Failed)]
    #[case("abandoned", PaymentStatus::Failed)]
    #[case("reversed", PaymentStatus::Failed)]
    #[case("ongoing", PaymentStatus::Pending)]
    #[case("", PaymentStatus::Pending)]
    fn gateway_status_mapping(#[case] raw: &str, #[case] expected: PaymentStatus) {
        assert_eq!(PaymentStatus::from_gateway(raw), expected);
    }

    #[test]
    fn signature_round_trip_and_tamper() {
        let body = br#"{"event":"charge.success","data":{"reference":"SW-1-ABC"}}"#;
        let signature = sign_hmac_sha512("sk_test_secret", body).unwrap();
        assert!(verify_hmac_sha512("sk_test_secret", body, &signature));
        assert!(!verify_hmac_sha512("sk_test_other", body, &signature));
        assert!(!verify_hmac_sha512("sk_test_secret", b"{}", &signature));
        assert!(!verify_hmac_sha512("sk_test_secret", body, "not-hex"));
        assert!(!verify_hmac_sha512("sk_test_secret", body, ""));
    }

    #[test]
    fn reference_alphabet() {
        assert!(is_valid_reference("SW-1718000000000-AB12CD34EF"));
        assert!(!is_valid_reference(""));
        assert!(!is_valid_reference("../admin"));
        assert!(!is_valid_reference("SW 1"));
    }
}
