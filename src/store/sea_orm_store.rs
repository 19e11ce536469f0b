use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    sea_query::Expr, ActiveValue::Set, ColumnTrait, DatabaseConnection, DatabaseTransaction,
    EntityTrait, QueryFilter, QueryOrder, QuerySelect, TransactionTrait,
};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use super::{NewOrder, OrderItemRecord, OrderRecord, OrderStore, OrderTx, VariantSnapshot};
use crate::entities::{order, order_item, product, product_variant};
use crate::errors::ServiceError;
use crate::models::{OrderStatus, PaymentMethod, ShippingAddress};

/// Relational store backed by a SeaORM connection pool.
#[derive(Debug, Clone)]
pub struct SeaOrmStore {
    db: Arc<DatabaseConnection>,
}

impl SeaOrmStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl OrderStore for SeaOrmStore {
    async fn begin(&self) -> Result<Box<dyn OrderTx>, ServiceError> {
        let txn = self.db.begin().await?;
        Ok(Box::new(SeaOrmTx { txn }))
    }
}

struct SeaOrmTx {
    txn: DatabaseTransaction,
}

impl SeaOrmTx {
    async fn with_items(
        &self,
        orders: Vec<order::Model>,
    ) -> Result<Vec<OrderRecord>, ServiceError> {
        if orders.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();
        let mut items_by_order: HashMap<Uuid, Vec<OrderItemRecord>> = HashMap::new();
        for item in order_item::Entity::find()
            .filter(order_item::Column::OrderId.is_in(ids))
            .order_by_asc(order_item::Column::Position)
            .order_by_asc(order_item::Column::Id)
            .all(&self.txn)
            .await?
        {
            items_by_order
                .entry(item.order_id)
                .or_default()
                .push(OrderItemRecord {
                    id: item.id,
                    variant_id: item.variant_id,
                    quantity: item.quantity,
                    price_at_purchase: item.price_at_purchase,
                });
        }

        orders
            .into_iter()
            .map(|model| {
                let items = items_by_order.remove(&model.id).unwrap_or_default();
                order_record(model, items)
            })
            .collect()
    }

    async fn load_one(&self, model: Option<order::Model>) -> Result<Option<OrderRecord>, ServiceError> {
        match model {
            Some(model) => Ok(self.with_items(vec![model]).await?.pop()),
            None => Ok(None),
        }
    }
}

fn order_record(
    model: order::Model,
    items: Vec<OrderItemRecord>,
) -> Result<OrderRecord, ServiceError> {
    let status = OrderStatus::from_str(&model.status).map_err(|_| {
        ServiceError::InternalError(format!(
            "order {} has unknown status {}",
            model.id, model.status
        ))
    })?;
    let payment_method = PaymentMethod::from_str(&model.payment_method).map_err(|_| {
        ServiceError::InternalError(format!(
            "order {} has unknown payment method {}",
            model.id, model.payment_method
        ))
    })?;
    let shipping_address: ShippingAddress = serde_json::from_value(model.shipping_address)
        .map_err(|e| {
            ServiceError::InternalError(format!(
                "order {} has a malformed shipping address: {}",
                model.id, e
            ))
        })?;

    Ok(OrderRecord {
        id: model.id,
        user_id: model.user_id,
        total_amount: model.total_amount,
        delivery_fee: model.delivery_fee,
        payment_ref: model.payment_ref,
        payment_method,
        status,
        shipping_address,
        scheduled_date: model.scheduled_date,
        time_window: model.time_window,
        customer_name: model.customer_name,
        customer_phone: model.customer_phone,
        customer_email: model.customer_email,
        needs_review: model.needs_review,
        items,
        created_at: model.created_at,
        updated_at: model.updated_at,
    })
}

#[async_trait]
impl OrderTx for SeaOrmTx {
    async fn load_variants(&mut self, ids: &[Uuid]) -> Result<Vec<VariantSnapshot>, ServiceError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = product_variant::Entity::find()
            .filter(product_variant::Column::Id.is_in(ids.to_vec()))
            .find_also_related(product::Entity)
            .all(&self.txn)
            .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(variant, product)| {
                let product = product?;
                Some(VariantSnapshot {
                    variant_id: variant.id,
                    product_id: product.id,
                    product_title: product.title,
                    size: variant.size,
                    color: variant.color,
                    stock_quantity: variant.stock_quantity,
                    price_override: variant.price_override,
                    base_price: product.base_price,
                    product_active: product.is_active,
                })
            })
            .collect())
    }

    async fn reserve_stock(
        &mut self,
        variant_id: Uuid,
        quantity: i32,
    ) -> Result<bool, ServiceError> {
        let result = product_variant::Entity::update_many()
            .col_expr(
                product_variant::Column::StockQuantity,
                Expr::col(product_variant::Column::StockQuantity).sub(quantity),
            )
            .col_expr(product_variant::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(product_variant::Column::Id.eq(variant_id))
            .filter(product_variant::Column::StockQuantity.gte(quantity))
            .exec(&self.txn)
            .await?;
        Ok(result.rows_affected == 1)
    }

    async fn release_stock(&mut self, variant_id: Uuid, quantity: i32) -> Result<(), ServiceError> {
        let result = product_variant::Entity::update_many()
            .col_expr(
                product_variant::Column::StockQuantity,
                Expr::col(product_variant::Column::StockQuantity).add(quantity),
            )
            .col_expr(product_variant::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(product_variant::Column::Id.eq(variant_id))
            .exec(&self.txn)
            .await?;
        if result.rows_affected == 0 {
            warn!(%variant_id, quantity, "stock release matched no variant");
            return Err(ServiceError::NotFound(format!("variant {}", variant_id)));
        }
        Ok(())
    }

    async fn insert_order(&mut self, new_order: NewOrder) -> Result<OrderRecord, ServiceError> {
        let shipping_address = serde_json::to_value(&new_order.shipping_address)
            .map_err(|e| ServiceError::InternalError(e.to_string()))?;

        let model = order::ActiveModel {
            id: Set(new_order.id),
            user_id: Set(new_order.user_id),
            total_amount: Set(new_order.total_amount),
            delivery_fee: Set(new_order.delivery_fee),
            payment_ref: Set(new_order.payment_ref.clone()),
            payment_method: Set(new_order.payment_method.to_string()),
            status: Set(new_order.status.to_string()),
            shipping_address: Set(shipping_address),
            scheduled_date: Set(new_order.scheduled_date),
            time_window: Set(new_order.time_window.clone()),
            customer_name: Set(new_order.customer_name.clone()),
            customer_phone: Set(new_order.customer_phone.clone()),
            customer_email: Set(new_order.customer_email.clone()),
            needs_review: Set(false),
            created_at: Set(new_order.created_at),
            updated_at: Set(new_order.created_at),
        };
        order::Entity::insert(model)
            .exec_without_returning(&self.txn)
            .await?;

        let item_ids: Vec<Uuid> = new_order.items.iter().map(|_| Uuid::new_v4()).collect();
        let item_models: Vec<order_item::ActiveModel> = new_order
            .items
            .iter()
            .zip(&item_ids)
            .zip(0i32..)
            .map(|((item, id), position)| order_item::ActiveModel {
                id: Set(*id),
                order_id: Set(new_order.id),
                variant_id: Set(item.variant_id),
                quantity: Set(item.quantity),
                price_at_purchase: Set(item.price_at_purchase),
                position: Set(position),
                created_at: Set(new_order.created_at),
            })
            .collect();
        if !item_models.is_empty() {
            order_item::Entity::insert_many(item_models)
                .exec_without_returning(&self.txn)
                .await?;
        }

        Ok(OrderRecord::from_new(new_order, item_ids))
    }

    async fn find_order(&mut self, order_id: Uuid) -> Result<Option<OrderRecord>, ServiceError> {
        let model = order::Entity::find_by_id(order_id).one(&self.txn).await?;
        self.load_one(model).await
    }

    async fn find_order_by_payment_ref(
        &mut self,
        payment_ref: &str,
    ) -> Result<Option<OrderRecord>, ServiceError> {
        let model = order::Entity::find()
            .filter(order::Column::PaymentRef.eq(payment_ref))
            .one(&self.txn)
            .await?;
        self.load_one(model).await
    }

    async fn transition_status(
        &mut self,
        order_id: Uuid,
        from: &[OrderStatus],
        to: OrderStatus,
    ) -> Result<bool, ServiceError> {
        let from: Vec<String> = from.iter().map(ToString::to_string).collect();
        let result = order::Entity::update_many()
            .col_expr(order::Column::Status, Expr::value(to.to_string()))
            .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::Status.is_in(from))
            .exec(&self.txn)
            .await?;
        Ok(result.rows_affected == 1)
    }

    async fn flag_for_review(&mut self, order_id: Uuid) -> Result<bool, ServiceError> {
        let result = order::Entity::update_many()
            .col_expr(order::Column::NeedsReview, Expr::value(true))
            .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::Status.eq(OrderStatus::Pending.to_string()))
            .filter(order::Column::NeedsReview.eq(false))
            .exec(&self.txn)
            .await?;
        Ok(result.rows_affected == 1)
    }

    async fn list_orders_for_user(
        &mut self,
        user_id: Uuid,
    ) -> Result<Vec<OrderRecord>, ServiceError> {
        let models = order::Entity::find()
            .filter(order::Column::UserId.eq(user_id))
            .order_by_desc(order::Column::CreatedAt)
            .all(&self.txn)
            .await?;
        self.with_items(models).await
    }

    async fn stale_pending_orders(
        &mut self,
        method: PaymentMethod,
        older_than: DateTime<Utc>,
        limit: u64,
    ) -> Result<Vec<OrderRecord>, ServiceError> {
        let models = order::Entity::find()
            .filter(order::Column::Status.eq(OrderStatus::Pending.to_string()))
            .filter(order::Column::PaymentMethod.eq(method.to_string()))
            .filter(order::Column::NeedsReview.eq(false))
            .filter(order::Column::CreatedAt.lt(older_than))
            .order_by_asc(order::Column::CreatedAt)
            .order_by_asc(order::Column::Id)
            .limit(limit)
            .all(&self.txn)
            .await?;
        self.with_items(models).await
    }

    async fn commit(self: Box<Self>) -> Result<(), ServiceError> {
        self.txn.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), ServiceError> {
        self.txn.rollback().await?;
        Ok(())
    }
}
