//! Property-based tests for pricing and stock reservation.
//!
//! The order engine runs against the in-memory store so each case is cheap.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use proptest::prelude::*;
use rust_decimal::{prelude::ToPrimitive, Decimal};
use storefront_api::{
    errors::ServiceError,
    models::{CartLine, PaymentMethod, ShippingAddress},
    notifications::{LogMailer, OrderNotifier},
    services::{
        delivery_fee::{calculate_delivery_fee, DEFAULT_DELIVERY_FEE, REGION_FEES},
        orders::{Customer, OrderService, PlaceOrderInput},
        payment_gateway::{
            to_minor_units, InitializePaymentRequest, PaymentGateway, PaymentSession,
            PaymentVerification,
        },
    },
    store::InMemoryStore,
};
use uuid::Uuid;

struct OfflineGateway;

#[async_trait]
impl PaymentGateway for OfflineGateway {
    async fn initialize_payment(
        &self,
        _request: InitializePaymentRequest,
    ) -> Result<PaymentSession, ServiceError> {
        Err(ServiceError::ExternalServiceError("offline".into()))
    }

    async fn verify_payment(&self, _reference: &str) -> Result<PaymentVerification, ServiceError> {
        Err(ServiceError::ExternalServiceError("offline".into()))
    }

    fn verify_webhook_signature(&self, _raw_body: &[u8], _signature: &str) -> bool {
        false
    }
}

fn region_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        (0..REGION_FEES.len()).prop_map(|i| REGION_FEES[i].0.to_string()),
        "[a-z]{3,12}",
    ]
}

/// (price in pesewas, optional override in pesewas, stock, requested quantity)
fn line_strategy() -> impl Strategy<Value = (i64, Option<i64>, i32, i32)> {
    (
        100i64..500_000,
        proptest::option::of(100i64..500_000),
        0i32..20,
        1i32..8,
    )
}

fn input(items: Vec<CartLine>, region: &str) -> PlaceOrderInput {
    PlaceOrderInput {
        customer: Customer::Guest {
            name: "Efua".into(),
            phone: "0209990000".into(),
            email: None,
        },
        items,
        shipping_address: ShippingAddress {
            street: "3 Castle Road".into(),
            city: "Cape Coast".into(),
            region: region.to_string(),
            directions: None,
            coordinates: None,
        },
        scheduled_date: None,
        time_window: None,
        payment_method: PaymentMethod::Cod,
    }
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn delivery_fee_is_table_value_or_default(region in region_strategy()) {
        let fee = calculate_delivery_fee(&region);
        let expected = REGION_FEES
            .iter()
            .find(|(code, _)| *code == region)
            .map(|(_, fee)| *fee)
            .unwrap_or(DEFAULT_DELIVERY_FEE);
        prop_assert_eq!(fee, Decimal::from(expected));
    }

    #[test]
    fn minor_units_stay_within_half_a_pesewa(cents in 0i64..10_000_000_000, extra in 0u32..10) {
        let amount = Decimal::new(cents * 10 + i64::from(extra), 3);
        let minor = to_minor_units(amount).unwrap();
        let exact = amount * Decimal::ONE_HUNDRED;
        prop_assert!((Decimal::from(minor) - exact).abs() <= Decimal::new(5, 1));
    }

    #[test]
    fn order_is_all_or_nothing_and_priced_exactly(
        lines in proptest::collection::vec(line_strategy(), 0..=20),
        region in region_strategy(),
    ) {
        let rt = runtime();
        rt.block_on(async {
            let store = InMemoryStore::new();
            let service = OrderService::new(
                Arc::new(store.clone()),
                Arc::new(OfflineGateway),
                OrderNotifier::new(Arc::new(LogMailer), "orders@test"),
            );

            let mut items = Vec::new();
            let mut initial = HashMap::new();
            let mut expected_subtotal = Decimal::ZERO;
            let mut fulfillable = true;
            for (price, override_price, stock, quantity) in &lines {
                let product = store.add_product("Tee", Decimal::new(*price, 2), true).await;
                let variant = store
                    .add_variant(product, "M", "White", *stock, override_price.map(|p| Decimal::new(p, 2)))
                    .await;
                initial.insert(variant, *stock);
                let unit = Decimal::new(override_price.unwrap_or(*price), 2);
                expected_subtotal += unit * Decimal::from(*quantity);
                fulfillable &= quantity <= stock;
                items.push(CartLine { variant_id: variant, quantity: *quantity });
            }

            let result = service.create_order(input(items.clone(), &region)).await;

            if lines.is_empty() {
                prop_assert!(matches!(result, Err(ServiceError::ValidationError(_))));
                return Ok(());
            }

            match result {
                Ok(placement) => {
                    prop_assert!(fulfillable);
                    let order = placement.order;
                    let fee = calculate_delivery_fee(&region);
                    prop_assert_eq!(order.delivery_fee, fee);
                    prop_assert_eq!(order.total_amount, expected_subtotal + fee);

                    let as_float = order.total_amount.to_f64().unwrap();
                    let expected_float = (expected_subtotal + fee).to_f64().unwrap();
                    prop_assert!((as_float - expected_float).abs() < 0.01);

                    for line in &items {
                        let left = store.stock_of(line.variant_id).await.unwrap();
                        prop_assert_eq!(left, initial[&line.variant_id] - line.quantity);
                        prop_assert!(left >= 0);
                    }
                    prop_assert_eq!(store.order_count().await, 1);
                }
                Err(ServiceError::InsufficientStock(shortfalls)) => {
                    prop_assert!(!fulfillable);
                    let short: Vec<Uuid> = items
                        .iter()
                        .filter(|l| l.quantity > initial[&l.variant_id])
                        .map(|l| l.variant_id)
                        .collect();
                    prop_assert_eq!(shortfalls.len(), short.len());
                    for line in &items {
                        prop_assert_eq!(
                            store.stock_of(line.variant_id).await.unwrap(),
                            initial[&line.variant_id]
                        );
                    }
                    prop_assert_eq!(store.order_count().await, 0);
                }
                Err(other) => prop_assert!(false, "unexpected error: {}", other),
            }
            Ok(())
        })?;
    }
}
