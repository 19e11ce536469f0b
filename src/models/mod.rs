//! Domain types shared by the order engine, the stores and the HTTP layer.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Order lifecycle states.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    ToSchema,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Online payment started, not yet confirmed by the gateway
    Pending,
    /// Cash on delivery, waiting for staff confirmation
    AwaitingConfirmation,
    Paid,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    /// Whether `self -> next` is a legal edge of the order state machine.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Paid)
                | (Pending, Cancelled)
                | (AwaitingConfirmation, Paid)
                | (AwaitingConfirmation, Shipped)
                | (AwaitingConfirmation, Cancelled)
                | (Paid, Shipped)
                | (Paid, Cancelled)
                | (Shipped, Delivered)
        )
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PaymentMethod {
    #[default]
    Cod,
    Paystack,
}

impl PaymentMethod {
    /// Status a freshly placed order starts in.
    pub fn initial_status(self) -> OrderStatus {
        match self {
            PaymentMethod::Cod => OrderStatus::AwaitingConfirmation,
            PaymentMethod::Paystack => OrderStatus::Pending,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

/// Delivery address stored as JSON on the order row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ShippingAddress {
    #[validate(length(min = 1, message = "street is required"))]
    pub street: String,
    #[validate(length(min = 1, message = "city is required"))]
    pub city: String,
    /// Region code used for the delivery fee, e.g. `greater-accra`
    #[validate(length(min = 1, message = "region is required"))]
    pub region: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directions: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Coordinates>,
}

/// One requested cart line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub variant_id: Uuid,
    #[validate(range(min = 1, message = "quantity must be at least 1"))]
    pub quantity: i32,
}

/// A cart line that cannot be fulfilled, with what is actually available.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StockShortfall {
    pub variant_id: Uuid,
    pub product_title: String,
    pub size: String,
    pub color: String,
    pub requested: i32,
    pub available: i32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn status_wire_names() {
        assert_eq!(OrderStatus::AwaitingConfirmation.as_ref(), "AWAITING_CONFIRMATION");
        assert_eq!(
            OrderStatus::from_str("CANCELLED").unwrap(),
            OrderStatus::Cancelled
        );
        assert_eq!(
            serde_json::to_string(&OrderStatus::Paid).unwrap(),
            "\"PAID\""
        );
        assert_eq!(PaymentMethod::from_str("paystack").unwrap(), PaymentMethod::Paystack);
    }

    #[test]
    fn terminal_states_have_no_outgoing_edges() {
        for next in [
            OrderStatus::Pending,
            OrderStatus::Paid,
            OrderStatus::Shipped,
            OrderStatus::Delivered,
            OrderStatus::Cancelled,
        ] {
            assert!(!OrderStatus::Delivered.can_transition_to(next));
            assert!(!OrderStatus::Cancelled.can_transition_to(next));
        }
    }

    #[test]
    fn cod_skips_pending() {
        assert_eq!(PaymentMethod::default(), PaymentMethod::Cod);
        assert_eq!(
            PaymentMethod::Cod.initial_status(),
            OrderStatus::AwaitingConfirmation
        );
        assert_eq!(PaymentMethod::Paystack.initial_status(), OrderStatus::Pending);
    }
}
