use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Storefront API",
        version = "0.3.0",
        description = r#"
# Storefront Orders API

Checkout backend for a streetwear storefront.

## Features

- **Order placement**: signed-in and guest checkout with per-region delivery fees
- **Stock reservation**: stock is decremented atomically when an order is placed, never oversold
- **Paystack payments**: hosted checkout, signed webhooks and return-URL verification
- **Cash on delivery**: orders wait for confirmation instead of payment

## Authentication

Customer and admin endpoints take a JWT issued by the storefront identity provider:

```
Authorization: Bearer <your-jwt-token>
```

Guest checkout, guest lookup, cart validation and payment endpoints are public.

## Error Handling

```json
{
  "error": "Bad Request",
  "message": "Validation error: quantity must be at least 1",
  "request_id": "6f1c...",
  "timestamp": "2026-01-01T00:00:00Z"
}
```

Stock failures use a dedicated body listing every line that cannot be fulfilled:

```json
{ "error": "INVENTORY_ERROR", "items": [ ... ] }
```
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "orders", description = "Checkout, lookup and order administration"),
        (name = "payments", description = "Paystack webhook and payment verification"),
    ),
    paths(
        crate::handlers::orders::create_order,
        crate::handlers::orders::create_guest_order,
        crate::handlers::orders::validate_cart,
        crate::handlers::orders::lookup_order,
        crate::handlers::orders::my_orders,
        crate::handlers::orders::get_order,
        crate::handlers::orders::update_order_status,
        crate::handlers::orders::verify_payment,
        crate::handlers::payment_webhooks::paystack_webhook,
    ),
    components(
        schemas(
            crate::handlers::orders::CreateOrderRequest,
            crate::handlers::orders::GuestOrderRequest,
            crate::handlers::orders::PlacementResponse,
            crate::handlers::orders::GuestOrderResponse,
            crate::handlers::orders::ValidateCartRequest,
            crate::handlers::orders::ValidateCartResponse,
            crate::handlers::orders::OrderListResponse,
            crate::handlers::orders::UpdateStatusRequest,
            crate::handlers::payment_webhooks::WebhookAck,

            crate::models::OrderStatus,
            crate::models::PaymentMethod,
            crate::models::ShippingAddress,
            crate::models::Coordinates,
            crate::models::CartLine,
            crate::models::StockShortfall,
            crate::store::OrderRecord,
            crate::store::OrderItemRecord,
            crate::services::payment_gateway::PaymentSession,
            crate::services::payments::ConfirmationOutcome,
            crate::services::payments::ConfirmationResult,

            crate::errors::ErrorResponse,
            crate::errors::InventoryErrorResponse
        )
    ),
    modifiers(&BearerAuth)
)]
pub struct ApiDocV1;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "Bearer",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_lists_order_and_payment_paths() {
        let openapi = ApiDocV1::openapi();
        let json = serde_json::to_string_pretty(&openapi).unwrap();
        assert!(json.contains("Storefront API"));
        assert!(json.contains("/api/v1/orders/guest"));
        assert!(json.contains("/api/v1/orders/payments/{reference}/verify"));
        assert!(json.contains("INVENTORY_ERROR") || json.contains("InventoryErrorResponse"));
        assert!(json.contains("\"Bearer\""));
    }
}
