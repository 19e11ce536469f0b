use chrono::{NaiveDate, Utc};
use metrics::counter;
use rand::{distributions::Alphanumeric, Rng};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{
    errors::ServiceError,
    models::{CartLine, OrderStatus, PaymentMethod, ShippingAddress, StockShortfall},
    notifications::OrderNotifier,
    services::{
        delivery_fee::calculate_delivery_fee,
        inventory::distinct_variant_ids,
        payment_gateway::{to_minor_units, InitializePaymentRequest, PaymentGateway, PaymentSession},
    },
    store::{
        run_in_unit_of_work, NewOrder, NewOrderItem, OrderRecord, OrderStore, OrderTx,
        VariantSnapshot,
    },
};

/// Prefix of every payment reference issued by this service.
pub const PAYMENT_REF_PREFIX: &str = "SW";
const PAYMENT_REF_SUFFIX_LEN: usize = 10;

/// Who is placing the order.
#[derive(Debug, Clone, PartialEq)]
pub enum Customer {
    Authenticated {
        user_id: Uuid,
        email: Option<String>,
    },
    Guest {
        name: String,
        phone: String,
        email: Option<String>,
    },
}

impl Customer {
    pub fn email(&self) -> Option<&str> {
        match self {
            Customer::Authenticated { email, .. } | Customer::Guest { email, .. } => {
                email.as_deref().filter(|e| !e.trim().is_empty())
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct PlaceOrderInput {
    pub customer: Customer,
    pub items: Vec<CartLine>,
    pub shipping_address: ShippingAddress,
    pub scheduled_date: Option<NaiveDate>,
    pub time_window: Option<String>,
    pub payment_method: PaymentMethod,
}

impl PlaceOrderInput {
    fn validate_input(&self) -> Result<(), ServiceError> {
        if self.items.is_empty() {
            return Err(ServiceError::ValidationError(
                "at least one item is required".into(),
            ));
        }
        for line in &self.items {
            line.validate()?;
        }
        self.shipping_address.validate()?;

        if let Customer::Guest { name, phone, .. } = &self.customer {
            if name.trim().is_empty() {
                return Err(ServiceError::ValidationError(
                    "customerName is required".into(),
                ));
            }
            if phone_digits(phone).is_empty() {
                return Err(ServiceError::ValidationError(
                    "customerPhone is required".into(),
                ));
            }
        }

        if self.payment_method == PaymentMethod::Paystack && self.customer.email().is_none() {
            return Err(ServiceError::ValidationError(
                "an email address is required for online payment".into(),
            ));
        }
        Ok(())
    }
}

/// Result of a successful checkout.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderPlacement {
    pub order: OrderRecord,
    /// Present for online payment only
    pub payment: Option<PaymentSession>,
}

/// Order placement, status administration and order queries.
#[derive(Clone)]
pub struct OrderService {
    store: Arc<dyn OrderStore>,
    gateway: Arc<dyn PaymentGateway>,
    notifier: OrderNotifier,
}

impl OrderService {
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

    /// Places an order: stock check, stock decrement, pricing and persistence
    /// in one unit of work, then payment initialization outside of it.
    #[instrument(skip(self, input), fields(lines = input.items.len(), method = %input.payment_method))]
    pub async fn create_order(&self, input: PlaceOrderInput) -> Result<OrderPlacement, ServiceError> {
        input.validate_input()?;

        let delivery_fee = calculate_delivery_fee(&input.shipping_address.region);
        let payment_method = input.payment_method;
        let email = input.customer.email().map(str::to_string);

        let result = run_in_unit_of_work(self.store.as_ref(), move |tx| {
            Box::pin(async move { reserve_and_persist(tx, input, delivery_fee).await })
        })
        .await;

        let order = match result {
            Ok(order) => order,
            Err(ServiceError::InsufficientStock(shortfalls)) => {
                counter!("storefront.orders.rejected", 1, "reason" => "insufficient_stock");
                info!(items = shortfalls.len(), "order rejected for insufficient stock");
                return Err(ServiceError::InsufficientStock(shortfalls));
            }
            Err(err) => return Err(err),
        };

        counter!("storefront.orders.created", 1, "payment_method" => payment_method.as_ref().to_string());
        info!(order_id = %order.id, total = %order.total_amount, "order placed");

        if payment_method != PaymentMethod::Paystack {
            return Ok(OrderPlacement {
                order,
                payment: None,
            });
        }

        let email = email.ok_or_else(|| {
            ServiceError::ValidationError("an email address is required for online payment".into())
        })?;
        let request = InitializePaymentRequest {
            email,
            amount_minor_units: to_minor_units(order.total_amount)?,
            reference: order.payment_ref.clone(),
            metadata: serde_json::json!({ "orderId": order.id }),
        };

        match self.gateway.initialize_payment(request).await {
            Ok(session) => Ok(OrderPlacement {
                order,
                payment: Some(session),
            }),
            Err(err) => {
                // The order stays PENDING; the sweeper releases its stock.
                counter!("storefront.orders.payment_init_failed", 1);
                warn!(order_id = %order.id, error = %err, "payment initialization failed");
                Err(match err {
                    ServiceError::PaymentGateway(msg) => ServiceError::PaymentGateway(msg),
                    other => ServiceError::PaymentGateway(format!(
                        "payment could not be started: {}",
                        other.response_message()
                    )),
                })
            }
        }
    }

    /// Admin status change along the order state machine.
    #[instrument(skip(self))]
    pub async fn update_status(
        &self,
        order_id: Uuid,
        to: OrderStatus,
    ) -> Result<OrderRecord, ServiceError> {
        let order = run_in_unit_of_work(self.store.as_ref(), move |tx| {
            Box::pin(async move {
                let order = tx
                    .find_order(order_id)
                    .await?
                    .ok_or_else(|| ServiceError::NotFound(format!("order {}", order_id)))?;
                let from = order.status;
                if !from.can_transition_to(to) {
                    return Err(ServiceError::InvalidTransition { from, to });
                }

                if to == OrderStatus::Cancelled {
                    return cancel_and_restock(tx, order_id, &[from])
                        .await?
                        .ok_or(ServiceError::InvalidTransition { from, to });
                }

                if !tx.transition_status(order_id, &[from], to).await? {
                    return Err(ServiceError::InvalidTransition { from, to });
                }
                Ok(OrderRecord {
                    status: to,
                    updated_at: Utc::now(),
                    ..order
                })
            })
        })
        .await?;

        counter!("storefront.orders.status_changed", 1, "to" => to.as_ref().to_string());
        info!(order_id = %order.id, status = %order.status, "order status updated");

        match to {
            OrderStatus::Shipped => self.notifier.order_shipped(&order).await,
            OrderStatus::Paid => self.notifier.order_confirmed(&order).await,
            _ => {}
        }
        Ok(order)
    }

    /// Guest lookup. A wrong phone number reads as a missing order.
    #[instrument(skip(self, phone))]
    pub async fn lookup_guest_order(
        &self,
        order_id: Uuid,
        phone: &str,
    ) -> Result<OrderRecord, ServiceError> {
        let order = self.find_order(order_id).await?;
        let wanted = phone_digits(phone);
        let matches = order
            .customer_phone
            .as_deref()
            .map(phone_digits)
            .is_some_and(|stored| !stored.is_empty() && stored == wanted);

        if matches {
            Ok(order)
        } else {
            Err(ServiceError::NotFound(format!("order {}", order_id)))
        }
    }

    #[instrument(skip(self))]
    pub async fn orders_for_user(&self, user_id: Uuid) -> Result<Vec<OrderRecord>, ServiceError> {
        run_in_unit_of_work(self.store.as_ref(), move |tx| {
            Box::pin(async move { tx.list_orders_for_user(user_id).await })
        })
        .await
    }

    /// Owner or admin only; anyone else sees a missing order.
    #[instrument(skip(self))]
    pub async fn get_order_for_user(
        &self,
        order_id: Uuid,
        user_id: Uuid,
        is_admin: bool,
    ) -> Result<OrderRecord, ServiceError> {
        let order = self.find_order(order_id).await?;
        if is_admin || order.user_id == Some(user_id) {
            Ok(order)
        } else {
            Err(ServiceError::NotFound(format!("order {}", order_id)))
        }
    }

    async fn find_order(&self, order_id: Uuid) -> Result<OrderRecord, ServiceError> {
        run_in_unit_of_work(self.store.as_ref(), move |tx| {
            Box::pin(async move { tx.find_order(order_id).await })
        })
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("order {}", order_id)))
    }
}

async fn reserve_and_persist(
    tx: &mut dyn OrderTx,
    input: PlaceOrderInput,
    delivery_fee: Decimal,
) -> Result<OrderRecord, ServiceError> {
    let ids = distinct_variant_ids(&input.items);
    let snapshots = tx.load_variants(&ids).await?;
    if snapshots.len() < ids.len() {
        let missing: Vec<String> = ids
            .iter()
            .filter(|id| !snapshots.iter().any(|s| s.variant_id == **id))
            .map(Uuid::to_string)
            .collect();
        return Err(ServiceError::NotFound(format!(
            "variant not found: {}",
            missing.join(", ")
        )));
    }

    let by_id: HashMap<Uuid, VariantSnapshot> =
        snapshots.into_iter().map(|s| (s.variant_id, s)).collect();
    let mut remaining: HashMap<Uuid, i32> = by_id
        .values()
        .map(|s| (s.variant_id, s.stock_quantity))
        .collect();

    let mut subtotal = Decimal::ZERO;
    let mut items = Vec::with_capacity(input.items.len());
    let mut shortfalls = Vec::new();

    for line in &input.items {
        let variant = by_id
            .get(&line.variant_id)
            .ok_or_else(|| ServiceError::NotFound(format!("variant not found: {}", line.variant_id)))?;

        if !variant.product_active {
            return Err(ServiceError::ProductUnavailable(format!(
                "{} is no longer available",
                variant.product_title
            )));
        }

        let available = remaining.get(&line.variant_id).copied().unwrap_or(0);
        if available < line.quantity {
            shortfalls.push(shortfall(variant, line, available));
            continue;
        }

        if !tx.reserve_stock(line.variant_id, line.quantity).await? {
            // A concurrent checkout drained the row after our read.
            let fresh = tx
                .load_variants(&[line.variant_id])
                .await?
                .first()
                .map(|s| s.stock_quantity)
                .unwrap_or(0);
            remaining.insert(line.variant_id, fresh);
            shortfalls.push(shortfall(variant, line, fresh));
            continue;
        }
        remaining.insert(line.variant_id, available - line.quantity);

        let price = variant.unit_price();
        subtotal += price * Decimal::from(line.quantity);
        items.push(NewOrderItem {
            variant_id: line.variant_id,
            quantity: line.quantity,
            price_at_purchase: price,
        });
    }

    if !shortfalls.is_empty() {
        return Err(ServiceError::InsufficientStock(shortfalls));
    }

    let (user_id, customer_name, customer_phone, customer_email) = match input.customer {
        Customer::Authenticated { user_id, email } => (Some(user_id), None, None, email),
        Customer::Guest { name, phone, email } => (None, Some(name), Some(phone), email),
    };

    let order = NewOrder {
        id: Uuid::new_v4(),
        user_id,
        total_amount: subtotal + delivery_fee,
        delivery_fee,
        payment_ref: generate_payment_ref(),
        payment_method: input.payment_method,
        status: input.payment_method.initial_status(),
        shipping_address: input.shipping_address,
        scheduled_date: input.scheduled_date,
        time_window: input.time_window,
        customer_name,
        customer_phone,
        customer_email,
        items,
        created_at: Utc::now(),
    };
    tx.insert_order(order).await
}

fn shortfall(variant: &VariantSnapshot, line: &CartLine, available: i32) -> StockShortfall {
    StockShortfall {
        variant_id: line.variant_id,
        product_title: variant.product_title.clone(),
        size: variant.size.clone(),
        color: variant.color.clone(),
        requested: line.quantity,
        available: available.max(0),
    }
}

/// Moves the order to CANCELLED if its status is one of `from`, restoring
/// stock for every item. Returns the cancelled order, or `None` when the
/// compare-and-set did not apply.
pub(crate) async fn cancel_and_restock(
    tx: &mut dyn OrderTx,
    order_id: Uuid,
    from: &[OrderStatus],
) -> Result<Option<OrderRecord>, ServiceError> {
    let Some(order) = tx.find_order(order_id).await? else {
        return Ok(None);
    };
    if !tx
        .transition_status(order_id, from, OrderStatus::Cancelled)
        .await?
    {
        return Ok(None);
    }
    for item in &order.items {
        tx.release_stock(item.variant_id, item.quantity).await?;
    }
    counter!("storefront.orders.cancelled", 1);
    Ok(Some(OrderRecord {
        status: OrderStatus::Cancelled,
        updated_at: Utc::now(),
        ..order
    }))
}

/// `SW-<unix millis>-<10 uppercase alphanumerics>`
pub fn generate_payment_ref() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(PAYMENT_REF_SUFFIX_LEN)
        .map(|b| char::from(b).to_ascii_uppercase())
        .collect();
    format!(
        "{}-{}-{}",
        PAYMENT_REF_PREFIX,
        Utc::now().timestamp_millis(),
        suffix
    )
}

/// Digits only, so `024-123-4567` and `024 123 4567` compare equal.
pub fn phone_digits(phone: &str) -> String {
    phone.chars().filter(char::is_ascii_digit).collect()
}
