//! Transactional access to variants and orders.
//!
//! The order engine, the payment confirmation path and the admin status path
//! all go through an [`OrderStore`]: `begin` hands out an [`OrderTx`] whose
//! writes become visible only on `commit`. [`run_in_unit_of_work`] wraps the
//! begin/commit/rollback dance so callers only write the body.

pub mod memory;
pub mod sea_orm_store;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use futures::future::BoxFuture;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::models::{OrderStatus, PaymentMethod, ShippingAddress};

pub use memory::InMemoryStore;
pub use sea_orm_store::SeaOrmStore;

/// A variant joined with the product fields the engine prices and gates on.
#[derive(Debug, Clone, PartialEq)]
pub struct VariantSnapshot {
    pub variant_id: Uuid,
    pub product_id: Uuid,
    pub product_title: String,
    pub size: String,
    pub color: String,
    pub stock_quantity: i32,
    pub price_override: Option<Decimal>,
    pub base_price: Decimal,
    pub product_active: bool,
}

impl VariantSnapshot {
    /// Variant override when set, product base price otherwise.
    pub fn unit_price(&self) -> Decimal {
        self.price_override.unwrap_or(self.base_price)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewOrderItem {
    pub variant_id: Uuid,
    pub quantity: i32,
    pub price_at_purchase: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewOrder {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub total_amount: Decimal,
    pub delivery_fee: Decimal,
    pub payment_ref: String,
    pub payment_method: PaymentMethod,
    pub status: OrderStatus,
    pub shipping_address: ShippingAddress,
    pub scheduled_date: Option<NaiveDate>,
    pub time_window: Option<String>,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub customer_email: Option<String>,
    pub items: Vec<NewOrderItem>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemRecord {
    pub id: Uuid,
    pub variant_id: Uuid,
    pub quantity: i32,
    #[serde(with = "rust_decimal::serde::float")]
    #[schema(value_type = f64, example = 50.0)]
    pub price_at_purchase: Decimal,
}

/// A persisted order with its items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderRecord {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    #[serde(with = "rust_decimal::serde::float")]
    #[schema(value_type = f64, example = 120.0)]
    pub total_amount: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    #[schema(value_type = f64, example = 20.0)]
    pub delivery_fee: Decimal,
    pub payment_ref: String,
    pub payment_method: PaymentMethod,
    pub status: OrderStatus,
    pub shipping_address: ShippingAddress,
    pub scheduled_date: Option<NaiveDate>,
    pub time_window: Option<String>,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub customer_email: Option<String>,
    /// Held back from automatic payment reconciliation
    pub needs_review: bool,
    pub items: Vec<OrderItemRecord>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderRecord {
    pub(crate) fn from_new(order: NewOrder, item_ids: impl IntoIterator<Item = Uuid>) -> Self {
        let items = order
            .items
            .into_iter()
            .zip(item_ids)
            .map(|(item, id)| OrderItemRecord {
                id,
                variant_id: item.variant_id,
                quantity: item.quantity,
                price_at_purchase: item.price_at_purchase,
            })
            .collect();

        Self {
            id: order.id,
            user_id: order.user_id,
            total_amount: order.total_amount,
            delivery_fee: order.delivery_fee,
            payment_ref: order.payment_ref,
            payment_method: order.payment_method,
            status: order.status,
            shipping_address: order.shipping_address,
            scheduled_date: order.scheduled_date,
            time_window: order.time_window,
            customer_name: order.customer_name,
            customer_phone: order.customer_phone,
            customer_email: order.customer_email,
            needs_review: false,
            items,
            created_at: order.created_at,
            updated_at: order.created_at,
        }
    }
}

/// One open unit of work. Dropping it without `commit` discards its writes.
#[async_trait]
pub trait OrderTx: Send {
    /// Variants for the given ids joined with their products. Missing ids are
    /// simply absent from the result.
    async fn load_variants(&mut self, ids: &[Uuid]) -> Result<Vec<VariantSnapshot>, ServiceError>;

    /// Decrements stock by `quantity` only if at least that much is on hand.
    /// Returns false when the guard did not hold.
    async fn reserve_stock(&mut self, variant_id: Uuid, quantity: i32)
        -> Result<bool, ServiceError>;

    async fn release_stock(&mut self, variant_id: Uuid, quantity: i32)
        -> Result<(), ServiceError>;

    async fn insert_order(&mut self, order: NewOrder) -> Result<OrderRecord, ServiceError>;

    async fn find_order(&mut self, order_id: Uuid) -> Result<Option<OrderRecord>, ServiceError>;

    async fn find_order_by_payment_ref(
        &mut self,
        payment_ref: &str,
    ) -> Result<Option<OrderRecord>, ServiceError>;

    /// Compare-and-set on status: moves the order to `to` only if its current
    /// status is one of `from`. Returns whether the row changed.
    async fn transition_status(
        &mut self,
        order_id: Uuid,
        from: &[OrderStatus],
        to: OrderStatus,
    ) -> Result<bool, ServiceError>;

    /// Newest first.
    async fn list_orders_for_user(&mut self, user_id: Uuid)
        -> Result<Vec<OrderRecord>, ServiceError>;

    /// Flags a PENDING order for manual review. Returns whether the row changed.
    async fn flag_for_review(&mut self, order_id: Uuid) -> Result<bool, ServiceError>;

    /// PENDING orders of `method` created before `older_than` and not flagged
    /// for review, oldest first.
    async fn stale_pending_orders(
        &mut self,
        method: PaymentMethod,
        older_than: DateTime<Utc>,
        limit: u64,
    ) -> Result<Vec<OrderRecord>, ServiceError>;

    async fn commit(self: Box<Self>) -> Result<(), ServiceError>;

    async fn rollback(self: Box<Self>) -> Result<(), ServiceError>;
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn OrderTx>, ServiceError>;
}

/// Runs `f` inside a fresh unit of work: commit on `Ok`, rollback on `Err`.
///
/// A failed rollback is logged and the original error is returned.
///
/// ```rust,ignore
/// let order = run_in_unit_of_work(store.as_ref(), move |tx| {
///     Box::pin(async move { tx.find_order(order_id).await })
/// })
/// .await?;
/// ```
pub async fn run_in_unit_of_work<T, F>(store: &dyn OrderStore, f: F) -> Result<T, ServiceError>
where
    T: Send,
    F: for<'a> FnOnce(&'a mut dyn OrderTx) -> BoxFuture<'a, Result<T, ServiceError>> + Send,
{
    let mut tx = store.begin().await?;
    match f(tx.as_mut()).await {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                error!(error = %rollback_err, original = %err, "rollback failed");
            }
            Err(err)
        }
    }
}
