use axum::{extract::State, http::HeaderMap, Json};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    errors::ServiceError,
    services::{payment_gateway::PAYSTACK_SIGNATURE_HEADER, payments::ConfirmationOutcome},
    AppState,
};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct WebhookAck {
    pub received: bool,
    pub outcome: ConfirmationOutcome,
}

// POST /api/v1/orders/verify
#[utoipa::path(
    post,
    path = "/api/v1/orders/verify",
    summary = "Paystack webhook",
    description = "Signed with hex HMAC-SHA512 of the raw body in x-paystack-signature. The reference is re-verified with Paystack before any order changes.",
    request_body = String,
    responses(
        (status = 200, description = "Webhook accepted", body = WebhookAck),
        (status = 401, description = "Invalid signature", body = crate::errors::ErrorResponse),
        (status = 400, description = "Invalid payload", body = crate::errors::ErrorResponse)
    ),
    tag = "payments"
)]
pub async fn paystack_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, ServiceError> {
    let signature = headers
        .get(PAYSTACK_SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    let result = state
        .payment_service
        .handle_webhook(&body, signature)
        .await?;

    Ok(Json(WebhookAck {
        received: true,
        outcome: result.outcome,
    }))
}
