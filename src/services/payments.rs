//! Applies verified payment results to orders.
//!
//! Every path here re-verifies the reference with the gateway before touching
//! an order, and every status change is a compare-and-set, so replays of the
//! same webhook are harmless.

use metrics::counter;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    errors::ServiceError,
    models::OrderStatus,
    notifications::OrderNotifier,
    services::{
        orders::cancel_and_restock,
        payment_gateway::{to_minor_units, PaymentGateway, PaymentStatus, PaymentVerification},
    },
    store::{run_in_unit_of_work, OrderRecord, OrderStore},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationOutcome {
    Paid,
    Cancelled,
    /// The order had already left PENDING; nothing changed
    AlreadyProcessed,
    /// Gateway still reports the payment as in progress
    StillPending,
    /// Gateway reports success for less than the order total
    AmountMismatch,
    UnknownReference,
    /// Event carried nothing to act on
    Ignored,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationResult {
    pub outcome: ConfirmationOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<OrderStatus>,
}

impl ConfirmationResult {
    fn ignored() -> Self {
        Self {
            outcome: ConfirmationOutcome::Ignored,
            reference: None,
            order_id: None,
            status: None,
        }
    }

    fn for_order(outcome: ConfirmationOutcome, order: &OrderRecord, status: OrderStatus) -> Self {
        Self {
            outcome,
            reference: Some(order.payment_ref.clone()),
            order_id: Some(order.id),
            status: Some(status),
        }
    }
}

#[derive(Debug, Deserialize)]
struct WebhookEvent {
    event: String,
    #[serde(default)]
    data: Option<WebhookEventData>,
}

#[derive(Debug, Deserialize)]
struct WebhookEventData {
    #[serde(default)]
    reference: Option<String>,
}

/// Statuses a successful payment may move an order out of.
const PAYABLE: [OrderStatus; 2] = [OrderStatus::Pending, OrderStatus::AwaitingConfirmation];

#[derive(Clone)]
pub struct PaymentConfirmationService {
    store: Arc<dyn OrderStore>,
    gateway: Arc<dyn PaymentGateway>,
    notifier: OrderNotifier,
}

impl PaymentConfirmationService {
    pub fn new(
        store: Arc<dyn OrderStore>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: OrderNotifier,
    ) -> Self {
        Self {
            store,
            gateway,
            notifier,
        }
    }

    /// Entry point for the gateway webhook. Nothing is processed unless the
    /// signature matches the raw body.
    #[instrument(skip(self, raw_body, signature), fields(body_len = raw_body.len()))]
    pub async fn handle_webhook(
        &self,
        raw_body: &[u8],
        signature: Option<&str>,
    ) -> Result<ConfirmationResult, ServiceError> {
        let signature = signature.unwrap_or_default();
        if signature.is_empty() || !self.gateway.verify_webhook_signature(raw_body, signature) {
            counter!("storefront.webhooks", 1, "outcome" => "bad_signature");
            warn!("rejected webhook with invalid signature");
            return Err(ServiceError::Unauthorized("invalid webhook signature".into()));
        }

        let event: WebhookEvent = serde_json::from_slice(raw_body)
            .map_err(|e| ServiceError::ValidationError(format!("malformed webhook payload: {}", e)))?;

        if !event.event.starts_with("charge.") {
            debug!(event = %event.event, "ignoring non-charge webhook");
            return Ok(ConfirmationResult::ignored());
        }

        let Some(reference) = event
            .data
            .and_then(|d| d.reference)
            .filter(|r| !r.trim().is_empty())
        else {
            debug!(event = %event.event, "webhook without reference");
            return Ok(ConfirmationResult::ignored());
        };

        let result = self.confirm_reference(&reference).await?;
        counter!("storefront.webhooks", 1, "outcome" => outcome_label(result.outcome));
        Ok(result)
    }

    /// Re-verifies `reference` with the gateway and applies the result.
    #[instrument(skip(self))]
    pub async fn confirm_reference(
        &self,
        reference: &str,
    ) -> Result<ConfirmationResult, ServiceError> {
        let Some(order) = self.find_by_reference(reference).await? else {
            info!("payment reference does not match any order");
            return Ok(ConfirmationResult {
                outcome: ConfirmationOutcome::UnknownReference,
                reference: Some(reference.to_string()),
                order_id: None,
                status: None,
            });
        };

        if !PAYABLE.contains(&order.status) {
            debug!(order_id = %order.id, status = %order.status, "order already settled");
            return Ok(ConfirmationResult::for_order(
                ConfirmationOutcome::AlreadyProcessed,
                &order,
                order.status,
            ));
        }

        let verification = self.gateway.verify_payment(reference).await?;
        if verification.reference != reference {
            return Err(ServiceError::PaymentGateway(format!(
                "gateway verified {} when asked for {}",
                verification.reference, reference
            )));
        }

        match verification.status {
            PaymentStatus::Success => self.apply_success(order, &verification).await,
            PaymentStatus::Failed => self.apply_failure(order).await,
            PaymentStatus::Pending => {
                debug!(order_id = %order.id, gateway_status = %verification.gateway_status, "payment still pending");
                Ok(ConfirmationResult::for_order(
                    ConfirmationOutcome::StillPending,
                    &order,
                    order.status,
                ))
            }
        }
    }

    /// Settles an online-payment order that stayed PENDING past its deadline:
    /// confirmed payments are applied, everything else is cancelled and its
    /// stock returned. Transport errors are returned so the caller can retry.
    #[instrument(skip(self, order), fields(order_id = %order.id))]
    pub async fn expire_order(&self, order: OrderRecord) -> Result<ConfirmationResult, ServiceError> {
        match self.gateway.verify_payment(&order.payment_ref).await {
            Ok(verification) if verification.status == PaymentStatus::Success => {
                self.apply_success(order, &verification).await
            }
            Ok(_) => self.apply_failure(order).await,
            Err(ServiceError::PaymentGateway(reason)) => {
                debug!(%reason, "gateway does not know the payment, expiring order");
                self.apply_failure(order).await
            }
            Err(err) => Err(err),
        }
    }

    async fn apply_success(
        &self,
        order: OrderRecord,
        verification: &PaymentVerification,
    ) -> Result<ConfirmationResult, ServiceError> {
        let expected = to_minor_units(order.total_amount)?;
        if verification.amount_minor_units < expected {
            let order_id = order.id;
            let flagged = run_in_unit_of_work(self.store.as_ref(), move |tx| {
                Box::pin(async move { tx.flag_for_review(order_id).await })
            })
            .await?;
            if flagged {
                counter!("storefront.payments.amount_mismatch", 1);
            }
            warn!(
                %order_id,
                expected,
                paid = verification.amount_minor_units,
                "payment amount below order total, order held for review"
            );
            return Ok(ConfirmationResult::for_order(
                ConfirmationOutcome::AmountMismatch,
                &order,
                order.status,
            ));
        }

        let order_id = order.id;
        let applied = run_in_unit_of_work(self.store.as_ref(), move |tx| {
            Box::pin(async move {
                tx.transition_status(order_id, &PAYABLE, OrderStatus::Paid)
                    .await
            })
        })
        .await?;

        if !applied {
            let current = self.current_status(order_id).await?;
            if current == Some(OrderStatus::Cancelled) {
                warn!(%order_id, "payment succeeded for a cancelled order, refund required");
            }
            return Ok(ConfirmationResult::for_order(
                ConfirmationOutcome::AlreadyProcessed,
                &order,
                current.unwrap_or(order.status),
            ));
        }

        counter!("storefront.payments.confirmed", 1);
        info!(%order_id, "payment confirmed");
        let paid = OrderRecord {
            status: OrderStatus::Paid,
            ..order
        };
        self.notifier.order_confirmed(&paid).await;
        Ok(ConfirmationResult::for_order(
            ConfirmationOutcome::Paid,
            &paid,
            OrderStatus::Paid,
        ))
    }

    async fn apply_failure(&self, order: OrderRecord) -> Result<ConfirmationResult, ServiceError> {
        let order_id = order.id;
        let cancelled = run_in_unit_of_work(self.store.as_ref(), move |tx| {
            Box::pin(async move { cancel_and_restock(tx, order_id, &[OrderStatus::Pending]).await })
        })
        .await?;

        match cancelled {
            Some(cancelled) => {
                counter!("storefront.payments.failed", 1);
                info!(%order_id, "payment failed, order cancelled and stock restored");
                Ok(ConfirmationResult::for_order(
                    ConfirmationOutcome::Cancelled,
                    &cancelled,
                    OrderStatus::Cancelled,
                ))
            }
            None => {
                let current = self.current_status(order_id).await?;
                Ok(ConfirmationResult::for_order(
                    ConfirmationOutcome::AlreadyProcessed,
                    &order,
                    current.unwrap_or(order.status),
                ))
            }
        }
    }

    async fn find_by_reference(&self, reference: &str) -> Result<Option<OrderRecord>, ServiceError> {
        let reference = reference.to_string();
        run_in_unit_of_work(self.store.as_ref(), move |tx| {
            Box::pin(async move { tx.find_order_by_payment_ref(&reference).await })
        })
        .await
    }

    async fn current_status(&self, order_id: Uuid) -> Result<Option<OrderStatus>, ServiceError> {
        let order = run_in_unit_of_work(self.store.as_ref(), move |tx| {
            Box::pin(async move { tx.find_order(order_id).await })
        })
        .await?;
        Ok(order.map(|o| o.status))
    }
}

fn outcome_label(outcome: ConfirmationOutcome) -> &'static str {
    match outcome {
        ConfirmationOutcome::Paid => "paid",
        ConfirmationOutcome::Cancelled => "cancelled",
        ConfirmationOutcome::AlreadyProcessed => "already_processed",
        ConfirmationOutcome::StillPending => "still_pending",
        ConfirmationOutcome::AmountMismatch => "amount_mismatch",
        ConfirmationOutcome::UnknownReference => "unknown_reference",
        ConfirmationOutcome::Ignored => "ignored",
    }
}
