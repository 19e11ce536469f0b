use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, instrument};
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::models::{CartLine, StockShortfall};
use crate::store::{run_in_unit_of_work, OrderStore};

/// Title reported for cart lines whose variant does not exist.
pub const UNKNOWN_PRODUCT_TITLE: &str = "Unknown Product";

/// Read-only pre-flight stock check for a cart.
///
/// Advisory only: the order engine repeats the check under its transaction.
#[derive(Clone)]
pub struct InventoryService {
    store: Arc<dyn OrderStore>,
}

impl InventoryService {
    pub fn new(store: Arc<dyn OrderStore>) -> Self {
        Self { store }
    }

    /// Returns one entry per cart line that cannot be fulfilled; empty when
    /// the whole cart is satisfiable. Repeated lines for a variant draw from
    /// the same stock.
    #[instrument(skip(self, items), fields(lines = items.len()))]
    pub async fn validate_inventory(
        &self,
        items: &[CartLine],
    ) -> Result<Vec<StockShortfall>, ServiceError> {
        let items = items.to_vec();
        let ids = distinct_variant_ids(&items);

        let snapshots = run_in_unit_of_work(self.store.as_ref(), move |tx| {
            Box::pin(async move { tx.load_variants(&ids).await })
        })
        .await?;

        let mut remaining: HashMap<Uuid, i32> = snapshots
            .iter()
            .map(|s| (s.variant_id, s.stock_quantity))
            .collect();
        let by_id: HashMap<Uuid, _> = snapshots.iter().map(|s| (s.variant_id, s)).collect();

        let mut shortfalls = Vec::new();
        for line in &items {
            let Some(variant) = by_id.get(&line.variant_id) else {
                shortfalls.push(StockShortfall {
                    variant_id: line.variant_id,
                    product_title: UNKNOWN_PRODUCT_TITLE.to_string(),
                    size: String::new(),
                    color: String::new(),
                    requested: line.quantity,
                    available: 0,
                });
                continue;
            };

            let available = if variant.product_active {
                remaining.get(&line.variant_id).copied().unwrap_or(0)
            } else {
                0
            };

            if available < line.quantity {
                shortfalls.push(StockShortfall {
                    variant_id: line.variant_id,
                    product_title: variant.product_title.clone(),
                    size: variant.size.clone(),
                    color: variant.color.clone(),
                    requested: line.quantity,
                    available,
                });
            } else if let Some(left) = remaining.get_mut(&line.variant_id) {
                *left -= line.quantity;
            }
        }

        debug!(shortfalls = shortfalls.len(), "inventory pre-flight complete");
        Ok(shortfalls)
    }
}

/// Requested variant ids in first-seen order, without duplicates.
pub(crate) fn distinct_variant_ids(items: &[CartLine]) -> Vec<Uuid> {
    let mut seen = std::collections::HashSet::new();
    items
        .iter()
        .map(|line| line.variant_id)
        .filter(|id| seen.insert(*id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn reports_every_unfulfillable_line() {
        let store = InMemoryStore::new();
        let hoodie = store.add_product("Heavyweight Hoodie", dec!(120), true).await;
        let retired = store.add_product("Retired Cap", dec!(40), false).await;
        let in_stock = store.add_variant(hoodie, "M", "Black", 10, None).await;
        let low = store.add_variant(hoodie, "L", "Black", 1, None).await;
        let inactive = store.add_variant(retired, "OS", "Red", 9, None).await;
        let missing = Uuid::new_v4();

        let service = InventoryService::new(Arc::new(store));
        let shortfalls = service
            .validate_inventory(&[
                CartLine { variant_id: in_stock, quantity: 2 },
                CartLine { variant_id: low, quantity: 3 },
                CartLine { variant_id: inactive, quantity: 1 },
                CartLine { variant_id: missing, quantity: 1 },
            ])
            .await
            .unwrap();

        assert_eq!(shortfalls.len(), 3);
        assert_eq!(shortfalls[0].variant_id, low);
        assert_eq!(shortfalls[0].available, 1);
        assert_eq!(shortfalls[1].variant_id, inactive);
        assert_eq!(shortfalls[1].available, 0);
        assert_eq!(shortfalls[2].product_title, UNKNOWN_PRODUCT_TITLE);
        assert_eq!(shortfalls[2].available, 0);
    }

    #[tokio::test]
    async fn repeated_lines_share_stock() {
        let store = InMemoryStore::new();
        let tee = store.add_product("Boxy Tee", dec!(50), true).await;
        let variant = store.add_variant(tee, "S", "White", 3, None).await;

        let service = InventoryService::new(Arc::new(store.clone()));
        let shortfalls = service
            .validate_inventory(&[
                CartLine { variant_id: variant, quantity: 2 },
                CartLine { variant_id: variant, quantity: 2 },
            ])
            .await
            .unwrap();

        assert_eq!(shortfalls.len(), 1);
        assert_eq!(shortfalls[0].requested, 2);
        assert_eq!(shortfalls[0].available, 1);
        // Read-only
        assert_eq!(store.stock_of(variant).await, Some(3));
    }

    #[test]
    fn distinct_ids_keep_first_seen_order() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let lines = [
            CartLine { variant_id: b, quantity: 1 },
            CartLine { variant_id: a, quantity: 1 },
            CartLine { variant_id: b, quantity: 4 },
        ];
        assert_eq!(distinct_variant_ids(&lines), vec![b, a]);
    }
}
