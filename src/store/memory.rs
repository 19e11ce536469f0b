use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{NewOrder, OrderRecord, OrderStore, OrderTx, VariantSnapshot};
use crate::errors::ServiceError;
use crate::models::{OrderStatus, PaymentMethod};

#[derive(Debug, Clone)]
struct ProductRow {
    title: String,
    base_price: Decimal,
    is_active: bool,
}

#[derive(Debug, Clone)]
struct VariantRow {
    product_id: Uuid,
    size: String,
    color: String,
    stock_quantity: i32,
    price_override: Option<Decimal>,
}

#[derive(Debug, Clone, Default)]
struct State {
    products: HashMap<Uuid, ProductRow>,
    variants: HashMap<Uuid, VariantRow>,
    orders: HashMap<Uuid, OrderRecord>,
}

/// Process-local store with the same contract as the database one.
///
/// Units of work are serialized by an async mutex; each works on a copy of
/// the state that replaces the shared state on commit.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_product(&self, title: &str, base_price: Decimal, is_active: bool) -> Uuid {
        let id = Uuid::new_v4();
        self.state.lock().await.products.insert(
            id,
            ProductRow {
                title: title.to_string(),
                base_price,
                is_active,
            },
        );
        id
    }

    pub async fn add_variant(
        &self,
        product_id: Uuid,
        size: &str,
        color: &str,
        stock_quantity: i32,
        price_override: Option<Decimal>,
    ) -> Uuid {
        let id = Uuid::new_v4();
        self.state.lock().await.variants.insert(
            id,
            VariantRow {
                product_id,
                size: size.to_string(),
                color: color.to_string(),
                stock_quantity,
                price_override,
            },
        );
        id
    }

    pub async fn stock_of(&self, variant_id: Uuid) -> Option<i32> {
        self.state
            .lock()
            .await
            .variants
            .get(&variant_id)
            .map(|v| v.stock_quantity)
    }

    pub async fn order(&self, order_id: Uuid) -> Option<OrderRecord> {
        self.state.lock().await.orders.get(&order_id).cloned()
    }

    pub async fn order_count(&self) -> usize {
        self.state.lock().await.orders.len()
    }
}

#[async_trait]
impl OrderStore for InMemoryStore {
    async fn begin(&self) -> Result<Box<dyn OrderTx>, ServiceError> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(InMemoryTx { guard, working }))
    }
}

struct InMemoryTx {
    guard: OwnedMutexGuard<State>,
    working: State,
}

#[async_trait]
impl OrderTx for InMemoryTx {
    async fn load_variants(&mut self, ids: &[Uuid]) -> Result<Vec<VariantSnapshot>, ServiceError> {
        let snapshots = ids
            .iter()
            .filter_map(|id| {
                let variant = self.working.variants.get(id)?;
                let product = self.working.products.get(&variant.product_id)?;
                Some(VariantSnapshot {
                    variant_id: *id,
                    product_id: variant.product_id,
                    product_title: product.title.clone(),
                    size: variant.size.clone(),
                    color: variant.color.clone(),
                    stock_quantity: variant.stock_quantity,
                    price_override: variant.price_override,
                    base_price: product.base_price,
                    product_active: product.is_active,
                })
            })
            .collect();
        Ok(snapshots)
    }

    async fn reserve_stock(
        &mut self,
        variant_id: Uuid,
        quantity: i32,
    ) -> Result<bool, ServiceError> {
        match self.working.variants.get_mut(&variant_id) {
            Some(variant) if variant.stock_quantity >= quantity => {
                variant.stock_quantity -= quantity;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release_stock(&mut self, variant_id: Uuid, quantity: i32) -> Result<(), ServiceError> {
        let variant = self
            .working
            .variants
            .get_mut(&variant_id)
            .ok_or_else(|| ServiceError::NotFound(format!("variant {}", variant_id)))?;
        variant.stock_quantity += quantity;
        Ok(())
    }

    async fn insert_order(&mut self, order: NewOrder) -> Result<OrderRecord, ServiceError> {
        if self
            .working
            .orders
            .values()
            .any(|existing| existing.payment_ref == order.payment_ref)
        {
            return Err(ServiceError::InternalError(format!(
                "duplicate payment reference {}",
                order.payment_ref
            )));
        }
        let item_ids: Vec<Uuid> = order.items.iter().map(|_| Uuid::new_v4()).collect();
        let record = OrderRecord::from_new(order, item_ids);
        self.working.orders.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_order(&mut self, order_id: Uuid) -> Result<Option<OrderRecord>, ServiceError> {
        Ok(self.working.orders.get(&order_id).cloned())
    }

    async fn find_order_by_payment_ref(
        &mut self,
        payment_ref: &str,
    ) -> Result<Option<OrderRecord>, ServiceError> {
        Ok(self
            .working
            .orders
            .values()
            .find(|o| o.payment_ref == payment_ref)
            .cloned())
    }

    async fn transition_status(
        &mut self,
        order_id: Uuid,
        from: &[OrderStatus],
        to: OrderStatus,
    ) -> Result<bool, ServiceError> {
        match self.working.orders.get_mut(&order_id) {
            Some(order) if from.contains(&order.status) => {
                order.status = to;
                order.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn flag_for_review(&mut self, order_id: Uuid) -> Result<bool, ServiceError> {
        match self.working.orders.get_mut(&order_id) {
            Some(order) if order.status == OrderStatus::Pending && !order.needs_review => {
                order.needs_review = true;
                order.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_orders_for_user(
        &mut self,
        user_id: Uuid,
    ) -> Result<Vec<OrderRecord>, ServiceError> {
        let mut orders: Vec<OrderRecord> = self
            .working
            .orders
            .values()
            .filter(|o| o.user_id == Some(user_id))
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn stale_pending_orders(
        &mut self,
        method: PaymentMethod,
        older_than: DateTime<Utc>,
        limit: u64,
    ) -> Result<Vec<OrderRecord>, ServiceError> {
        let mut orders: Vec<OrderRecord> = self
            .working
            .orders
            .values()
            .filter(|o| {
                o.status == OrderStatus::Pending
                    && !o.needs_review
                    && o.payment_method == method
                    && o.created_at < older_than
            })
            .cloned()
            .collect();
        orders.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        orders.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(orders)
    }

    async fn commit(self: Box<Self>) -> Result<(), ServiceError> {
        let InMemoryTx { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), ServiceError> {
        Ok(())
    }
}
