//! Best-effort order emails.
//!
//! Delivery failures never propagate to the caller: a paid order stays paid
//! even when the relay is down.

use async_trait::async_trait;
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::config::AppConfig;
use crate::store::OrderRecord;

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Mail relay request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Mail relay rejected message with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub text: String,
    /// Relay-side template tag, e.g. `order_confirmed`
    pub tag: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: EmailMessage) -> Result<(), NotificationError>;
}

/// Posts messages as JSON to a transactional mail relay.
#[derive(Debug, Clone)]
pub struct HttpRelayMailer {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl HttpRelayMailer {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, NotificationError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotificationError::Internal(e.to_string()))?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl Mailer for HttpRelayMailer {
    async fn send(&self, message: EmailMessage) -> Result<(), NotificationError> {
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&message)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotificationError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

/// Logs messages instead of sending them. Used when no relay is configured.
#[derive(Debug, Clone, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: EmailMessage) -> Result<(), NotificationError> {
        info!(to = %message.to, subject = %message.subject, tag = %message.tag, "email (log only)");
        Ok(())
    }
}

/// Picks the relay mailer when one is configured, the log mailer otherwise.
pub fn mailer_from_config(cfg: &AppConfig) -> Result<Arc<dyn Mailer>, NotificationError> {
    match (&cfg.mail_relay_url, &cfg.mail_relay_api_key) {
        (Some(url), Some(key)) => Ok(Arc::new(HttpRelayMailer::new(
            url.clone(),
            key.clone(),
            cfg.gateway_timeout(),
        )?)),
        _ => Ok(Arc::new(LogMailer)),
    }
}

#[derive(Clone)]
pub struct OrderNotifier {
    mailer: Arc<dyn Mailer>,
    from: String,
}

impl OrderNotifier {
    pub fn new(mailer: Arc<dyn Mailer>, from: impl Into<String>) -> Self {
        Self {
            mailer,
            from: from.into(),
        }
    }

    #[instrument(skip(self, order), fields(order_id = %order.id))]
    pub async fn order_confirmed(&self, order: &OrderRecord) {
        let subject = format!("Your order {} is confirmed", order.payment_ref);
        let text = format!(
            "Thanks for your order!\n\n{}\nDelivery fee: GHS {}\nTotal paid: GHS {}\n\nWe will let you know when it ships.",
            item_lines(order),
            order.delivery_fee.round_dp(2),
            order.total_amount.round_dp(2),
        );
        self.deliver(order, "order_confirmed", subject, text).await;
    }

    #[instrument(skip(self, order), fields(order_id = %order.id))]
    pub async fn order_shipped(&self, order: &OrderRecord) {
        let subject = format!("Your order {} is on its way", order.payment_ref);
        let mut text = format!(
            "Good news, your order has shipped to {}, {}.",
            order.shipping_address.street, order.shipping_address.city
        );
        if let (Some(date), Some(window)) = (order.scheduled_date, &order.time_window) {
            text.push_str(&format!("\nScheduled delivery: {} ({})", date, window));
        }
        self.deliver(order, "order_shipped", subject, text).await;
    }

    async fn deliver(&self, order: &OrderRecord, tag: &'static str, subject: String, text: String) {
        let Some(to) = order.customer_email.clone() else {
            debug!(tag, "order has no email address, skipping");
            return;
        };

        let message = EmailMessage {
            from: self.from.clone(),
            to,
            subject,
            text,
            tag: tag.to_string(),
        };

        match self.mailer.send(message).await {
            Ok(()) => {
                counter!("storefront.emails", 1, "tag" => tag, "outcome" => "sent");
            }
            Err(err) => {
                counter!("storefront.emails", 1, "tag" => tag, "outcome" => "failed");
                warn!(error = %err, tag, "order email failed");
            }
        }
    }
}

fn item_lines(order: &OrderRecord) -> String {
    order
        .items
        .iter()
        .map(|item| {
            format!(
                "- {} x {} @ GHS {}",
                item.quantity,
                item.variant_id,
                item.price_at_purchase.round_dp(2)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
