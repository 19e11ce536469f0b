use std::time::Duration;

use assert_matches::assert_matches;
use serde_json::json;
use storefront_api::{
    errors::ServiceError,
    services::payment_gateway::{
        sign_hmac_sha512, InitializePaymentRequest, PaymentGateway, PaymentStatus, PaystackClient,
        PaystackConfig,
    },
};
use wiremock::{
    matchers::{body_partial_json, header, method, path},
    Mock, MockServer, ResponseTemplate,
};

const SECRET: &str = "sk_test_wiremock";

fn client(server: &MockServer) -> PaystackClient {
    PaystackClient::new(PaystackConfig {
        base_url: server.uri(),
        secret_key: SECRET.to_string(),
        currency: "GHS".to_string(),
        callback_url: Some("https://shop.test/checkout/return".to_string()),
        timeout: Duration::from_secs(5),
    })
    .expect("client")
}

#[tokio::test]
async fn initialize_sends_minor_units_and_returns_session() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/transaction/initialize"))
        .and(header("authorization", format!("Bearer {SECRET}").as_str()))
        .and(body_partial_json(json!({
            "email": "ama@example.com",
            "amount": 12000,
            "reference": "SW-1-ABCDEFGHIJ",
            "currency": "GHS",
            "callback_url": "https://shop.test/checkout/return"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": true,
            "message": "Authorization URL created",
            "data": {
                "authorization_url": "https://checkout.paystack.com/abc123",
                "access_code": "abc123",
                "reference": "SW-1-ABCDEFGHIJ"
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let session = client(&server)
        .initialize_payment(InitializePaymentRequest {
            email: "ama@example.com".into(),
            amount_minor_units: 12_000,
            reference: "SW-1-ABCDEFGHIJ".into(),
            metadata: json!({ "orderId": "7f0c" }),
        })
        .await
        .expect("session");

    assert_eq!(session.authorization_url, "https://checkout.paystack.com/abc123");
    assert_eq!(session.reference, "SW-1-ABCDEFGHIJ");
}

#[tokio::test]
async fn initialize_rejection_surfaces_gateway_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/transaction/initialize"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "status": false,
            "message": "Duplicate Transaction Reference"
        })))
        .mount(&server)
        .await;

    let err = client(&server)
        .initialize_payment(InitializePaymentRequest {
            email: "ama@example.com".into(),
            amount_minor_units: 100,
            reference: "SW-1-DUPLICATE0".into(),
            metadata: json!({}),
        })
        .await
        .unwrap_err();

    assert_matches!(err, ServiceError::PaymentGateway(msg) if msg == "Duplicate Transaction Reference");
}

#[tokio::test]
async fn verify_maps_status_and_amount() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/transaction/verify/SW-1-PAID000001"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": true,
            "message": "Verification successful",
            "data": {
                "status": "success",
                "reference": "SW-1-PAID000001",
                "amount": 20000,
                "currency": "GHS",
                "channel": "mobile_money",
                "paid_at": "2026-10-19T09:12:44.000Z"
            }
        })))
        .mount(&server)
        .await;

    let verification = client(&server)
        .verify_payment("SW-1-PAID000001")
        .await
        .expect("verification");

    assert_eq!(verification.status, PaymentStatus::Success);
    assert_eq!(verification.amount_minor_units, 20_000);
    assert_eq!(verification.channel.as_deref(), Some("mobile_money"));
    assert_eq!(verification.gateway_status, "success");
}

#[tokio::test]
async fn verify_abandoned_payment_counts_as_failed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/transaction/verify/SW-1-ABANDONED1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": true,
            "message": "Verification successful",
            "data": { "status": "abandoned", "reference": "SW-1-ABANDONED1", "amount": 5000 }
        })))
        .mount(&server)
        .await;

    let verification = client(&server)
        .verify_payment("SW-1-ABANDONED1")
        .await
        .expect("verification");
    assert_eq!(verification.status, PaymentStatus::Failed);
}

#[tokio::test]
async fn verify_unknown_reference_is_gateway_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/transaction/verify/SW-1-UNKNOWN001"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "status": false,
            "message": "Transaction reference not found"
        })))
        .mount(&server)
        .await;

    let err = client(&server)
        .verify_payment("SW-1-UNKNOWN001")
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::PaymentGateway(_));
}

#[tokio::test]
async fn verify_rejects_malformed_reference_without_calling_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let err = client(&server)
        .verify_payment("../../balance")
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::PaymentGateway(_));
}

#[tokio::test]
async fn unreadable_body_is_external_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/transaction/verify/SW-1-GARBAGE001"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>bad gateway</html>"))
        .mount(&server)
        .await;

    let err = client(&server)
        .verify_payment("SW-1-GARBAGE001")
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ExternalServiceError(_));
}

#[tokio::test]
async fn unreachable_gateway_is_external_error() {
    let server = MockServer::start().await;
    let uri = server.uri();
    drop(server);

    let client = PaystackClient::new(PaystackConfig {
        base_url: uri,
        secret_key: SECRET.to_string(),
        currency: "GHS".to_string(),
        callback_url: None,
        timeout: Duration::from_secs(2),
    })
    .expect("client");

    let err = client.verify_payment("SW-1-OFFLINE0001").await.unwrap_err();
    assert_matches!(err, ServiceError::ExternalServiceError(_));
}

#[tokio::test]
async fn webhook_signature_uses_secret_key() {
    let server = MockServer::start().await;
    let client = client(&server);
    let body = br#"{"event":"charge.success","data":{"reference":"SW-1-ABCDEFGHIJ"}}"#;

    let good = sign_hmac_sha512(SECRET, body).expect("sign");
    let other = sign_hmac_sha512("sk_test_someone_else", body).expect("sign");

    assert!(client.verify_webhook_signature(body, &good));
    assert!(!client.verify_webhook_signature(body, &other));
    assert!(!client.verify_webhook_signature(b"{}", &good));
}
