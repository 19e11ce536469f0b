use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::{AdminUser, AuthUser},
    errors::ServiceError,
    models::{CartLine, OrderStatus, PaymentMethod, ShippingAddress, StockShortfall},
    services::{
        orders::{Customer, OrderPlacement, PlaceOrderInput},
        payment_gateway::{is_valid_reference, PaymentSession},
        payments::ConfirmationResult,
    },
    store::OrderRecord,
    AppState,
};

/// Checkout request for a signed-in customer
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    #[validate(length(min = 1, message = "at least one item is required"))]
    pub items: Vec<CartLine>,
    pub shipping_address: ShippingAddress,
    #[serde(default)]
    pub scheduled_date: Option<NaiveDate>,
    #[serde(default)]
    pub time_window: Option<String>,
    #[serde(default)]
    pub payment_method: PaymentMethod,
}

/// Checkout request without an account
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GuestOrderRequest {
    #[validate(length(min = 1, max = 120, message = "customerName is required"))]
    pub customer_name: String,
    #[validate(length(min = 1, max = 32, message = "customerPhone is required"))]
    pub customer_phone: String,
    #[serde(default)]
    #[validate(email(message = "customerEmail must be a valid email address"))]
    pub customer_email: Option<String>,
    #[validate(length(min = 1, message = "at least one item is required"))]
    pub items: Vec<CartLine>,
    pub shipping_address: ShippingAddress,
    #[serde(default)]
    pub scheduled_date: Option<NaiveDate>,
    #[serde(default)]
    pub time_window: Option<String>,
    #[serde(default)]
    pub payment_method: PaymentMethod,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PlacementResponse {
    pub order: OrderRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment: Option<PaymentSession>,
}

impl From<OrderPlacement> for PlacementResponse {
    fn from(placement: OrderPlacement) -> Self {
        Self {
            order: placement.order,
            payment: placement.payment,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GuestOrderResponse {
    pub order_id: Uuid,
    pub status: OrderStatus,
    pub scheduled_date: Option<NaiveDate>,
    pub time_window: Option<String>,
    #[serde(with = "rust_decimal::serde::float")]
    #[schema(value_type = f64, example = 120.0)]
    pub total_amount: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    #[schema(value_type = f64, example = 20.0)]
    pub delivery_fee: Decimal,
    pub payment_method: PaymentMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_url: Option<String>,
}

impl From<OrderPlacement> for GuestOrderResponse {
    fn from(placement: OrderPlacement) -> Self {
        let order = placement.order;
        Self {
            order_id: order.id,
            status: order.status,
            scheduled_date: order.scheduled_date,
            time_window: order.time_window,
            total_amount: order.total_amount,
            delivery_fee: order.delivery_fee,
            payment_method: order.payment_method,
            payment_url: placement.payment.map(|p| p.authorization_url),
        }
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ValidateCartRequest {
    #[validate(length(min = 1, message = "at least one item is required"))]
    pub items: Vec<CartLine>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ValidateCartResponse {
    pub valid: bool,
    pub items: Vec<StockShortfall>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct LookupQuery {
    pub order_id: Uuid,
    pub phone: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderListResponse {
    pub orders: Vec<OrderRecord>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateStatusRequest {
    pub status: OrderStatus,
}

#[utoipa::path(
    post,
    path = "/api/v1/orders",
    summary = "Place order",
    description = "Reserve stock and place an order for the signed-in customer. Online payment returns a hosted checkout URL.",
    request_body = CreateOrderRequest,
    responses(
        (status = 201, description = "Order placed", body = PlacementResponse),
        (status = 400, description = "Validation, stock or payment gateway error", body = crate::errors::InventoryErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Variant not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn create_order(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<PlacementResponse>), ServiceError> {
    request.validate()?;

    let placement = state
        .order_service
        .create_order(PlaceOrderInput {
            customer: Customer::Authenticated {
                user_id: user.user_id,
                email: user.email,
            },
            items: request.items,
            shipping_address: request.shipping_address,
            scheduled_date: request.scheduled_date,
            time_window: request.time_window,
            payment_method: request.payment_method,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(placement.into())))
}

#[utoipa::path(
    post,
    path = "/api/v1/orders/guest",
    summary = "Place guest order",
    request_body = GuestOrderRequest,
    responses(
        (status = 201, description = "Order placed", body = GuestOrderResponse),
        (status = 400, description = "Validation, stock or payment gateway error", body = crate::errors::InventoryErrorResponse),
        (status = 404, description = "Variant not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    tag = "orders"
)]
pub async fn create_guest_order(
    State(state): State<AppState>,
    Json(request): Json<GuestOrderRequest>,
) -> Result<(StatusCode, Json<GuestOrderResponse>), ServiceError> {
    request.validate()?;

    let placement = state
        .order_service
        .create_order(PlaceOrderInput {
            customer: Customer::Guest {
                name: request.customer_name,
                phone: request.customer_phone,
                email: request.customer_email,
            },
            items: request.items,
            shipping_address: request.shipping_address,
            scheduled_date: request.scheduled_date,
            time_window: request.time_window,
            payment_method: request.payment_method,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(placement.into())))
}

#[utoipa::path(
    post,
    path = "/api/v1/orders/validate",
    summary = "Check cart availability",
    description = "Read-only stock check. Placing the order re-checks under a transaction.",
    request_body = ValidateCartRequest,
    responses(
        (status = 200, description = "Availability per unfulfillable line", body = ValidateCartResponse),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
    ),
    tag = "orders"
)]
pub async fn validate_cart(
    State(state): State<AppState>,
    Json(request): Json<ValidateCartRequest>,
) -> Result<Json<ValidateCartResponse>, ServiceError> {
    request.validate()?;
    for line in &request.items {
        line.validate()?;
    }

    let items = state
        .inventory_service
        .validate_inventory(&request.items)
        .await?;
    Ok(Json(ValidateCartResponse {
        valid: items.is_empty(),
        items,
    }))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders/lookup",
    summary = "Guest order lookup",
    params(LookupQuery),
    responses(
        (status = 200, description = "Order found", body = OrderRecord),
        (status = 404, description = "No order with that id and phone", body = crate::errors::ErrorResponse),
    ),
    tag = "orders"
)]
pub async fn lookup_order(
    State(state): State<AppState>,
    Query(query): Query<LookupQuery>,
) -> Result<Json<OrderRecord>, ServiceError> {
    let order = state
        .order_service
        .lookup_guest_order(query.order_id, &query.phone)
        .await?;
    Ok(Json(order))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders/mine",
    summary = "My orders",
    responses(
        (status = 200, description = "Orders of the caller, newest first", body = OrderListResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn my_orders(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<OrderListResponse>, ServiceError> {
    let orders = state.order_service.orders_for_user(user.user_id).await?;
    Ok(Json(OrderListResponse { orders }))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    summary = "Get order",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order", body = OrderRecord),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    user: AuthUser,
) -> Result<Json<OrderRecord>, ServiceError> {
    let order = state
        .order_service
        .get_order_for_user(order_id, user.user_id, user.is_admin())
        .await?;
    Ok(Json(order))
}

#[utoipa::path(
    patch,
    path = "/api/v1/orders/{id}/status",
    summary = "Update order status",
    description = "Admin only. Cancelling restores stock; shipping emails the customer.",
    params(("id" = Uuid, Path, description = "Order id")),
    request_body = UpdateStatusRequest,
    responses(
        (status = 200, description = "Order updated", body = OrderRecord),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Admin role required", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Transition not allowed", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn update_order_status(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    AdminUser(_admin): AdminUser,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<OrderRecord>, ServiceError> {
    let order = state
        .order_service
        .update_status(order_id, request.status)
        .await?;
    Ok(Json(order))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders/payments/{reference}/verify",
    summary = "Verify payment",
    description = "Called when the customer returns from the hosted payment page.",
    params(("reference" = String, Path, description = "Payment reference")),
    responses(
        (status = 200, description = "Confirmation outcome", body = ConfirmationResult),
        (status = 400, description = "Invalid reference or gateway error", body = crate::errors::ErrorResponse),
        (status = 502, description = "Gateway unreachable", body = crate::errors::ErrorResponse),
    ),
    tag = "payments"
)]
pub async fn verify_payment(
    State(state): State<AppState>,
    Path(reference): Path<String>,
) -> Result<Json<ConfirmationResult>, ServiceError> {
    if !is_valid_reference(&reference) {
        return Err(ServiceError::ValidationError(
            "invalid payment reference".into(),
        ));
    }
    let result = state.payment_service.confirm_reference(&reference).await?;
    Ok(Json(result))
}
