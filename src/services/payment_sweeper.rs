use chrono::{DateTime, Utc};
use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, instrument, warn};

use crate::{
    config::AppConfig,
    errors::ServiceError,
    models::PaymentMethod,
    services::payments::{ConfirmationOutcome, PaymentConfirmationService},
    store::{run_in_unit_of_work, OrderStore},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweeperSettings {
    /// Orders younger than this are left alone
    pub pending_ttl: Duration,
    pub interval: Duration,
    pub batch_size: u64,
}

impl From<&AppConfig> for SweeperSettings {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            pending_ttl: cfg.pending_payment_ttl(),
            interval: cfg.payment_sweep_interval(),
            batch_size: cfg.payment_sweep_batch_size,
        }
    }
}

/// Counts for one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub examined: usize,
    pub paid: usize,
    pub cancelled: usize,
    pub untouched: usize,
    /// Gateway unreachable; retried next sweep
    pub skipped: usize,
}

/// Reconciles online-payment orders stuck in PENDING, e.g. after a crash
/// between commit and payment initialization or a lost webhook.
#[derive(Clone)]
pub struct PendingPaymentSweeper {
    store: Arc<dyn OrderStore>,
    payments: PaymentConfirmationService,
    settings: SweeperSettings,
}

impl PendingPaymentSweeper {
    pub fn new(
        store: Arc<dyn OrderStore>,
        payments: PaymentConfirmationService,
        settings: SweeperSettings,
    ) -> Self {
        Self {
            store,
            payments,
            settings,
        }
    }

    pub async fn sweep_once(&self) -> Result<SweepReport, ServiceError> {
        self.sweep_at(Utc::now()).await
    }

    /// One bounded batch of orders created before `now - pending_ttl`.
    #[instrument(skip(self))]
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> Result<SweepReport, ServiceError> {
        let ttl = chrono::Duration::from_std(self.settings.pending_ttl)
            .map_err(|e| ServiceError::InternalError(format!("pending ttl: {}", e)))?;
        let cutoff = now - ttl;
        let limit = self.settings.batch_size;

        let stale = run_in_unit_of_work(self.store.as_ref(), move |tx| {
            Box::pin(async move {
                tx.stale_pending_orders(PaymentMethod::Paystack, cutoff, limit)
                    .await
            })
        })
        .await?;

        let mut report = SweepReport {
            examined: stale.len(),
            ..Default::default()
        };

        for order in stale {
            let order_id = order.id;
            match self.payments.expire_order(order).await {
                Ok(result) => match result.outcome {
                    ConfirmationOutcome::Paid => report.paid += 1,
                    ConfirmationOutcome::Cancelled => report.cancelled += 1,
                    _ => report.untouched += 1,
                },
                Err(err) => {
                    report.skipped += 1;
                    warn!(%order_id, error = %err, "could not reconcile pending order");
                }
            }
        }

        counter!("storefront.sweeper.cancelled", report.cancelled as u64);
        counter!("storefront.sweeper.paid", report.paid as u64);
        if report.examined > 0 {
            info!(
                examined = report.examined,
                paid = report.paid,
                cancelled = report.cancelled,
                skipped = report.skipped,
                "pending payment sweep finished"
            );
        }
        Ok(report)
    }

    /// Runs forever on the configured interval.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.settings.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(
                interval_secs = self.settings.interval.as_secs(),
                ttl_secs = self.settings.pending_ttl.as_secs(),
                "pending payment sweeper started"
            );
            loop {
                ticker.tick().await;
                if let Err(err) = self.sweep_once().await {
                    error!(error = %err, "pending payment sweep failed");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CartLine, OrderStatus, ShippingAddress};
    use crate::notifications::{LogMailer, OrderNotifier};
    use crate::services::orders::{Customer, OrderService, PlaceOrderInput};
    use crate::services::payment_gateway::{
        InitializePaymentRequest, PaymentGateway, PaymentSession, PaymentStatus,
        PaymentVerification,
    };
    use crate::store::InMemoryStore;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use uuid::Uuid;

    /// Accepts every payment; verification answers are scripted per reference.
    #[derive(Default)]
    struct ScriptedGateway {
        answers: Mutex<HashMap<String, (PaymentStatus, i64)>>,
    }

    impl ScriptedGateway {
        fn answer(&self, reference: &str, status: PaymentStatus, amount_minor_units: i64) {
            self.answers
                .lock()
                .unwrap()
                .insert(reference.to_string(), (status, amount_minor_units));
        }
    }

    #[async_trait]
    impl PaymentGateway for ScriptedGateway {
        async fn initialize_payment(
            &self,
            request: InitializePaymentRequest,
        ) -> Result<PaymentSession, ServiceError> {
            Ok(PaymentSession {
                authorization_url: format!("https://checkout.test/{}", request.reference),
                reference: request.reference,
            })
        }

        async fn verify_payment(&self, reference: &str) -> Result<PaymentVerification, ServiceError> {
            let (status, amount) = self
                .answers
                .lock()
                .unwrap()
                .get(reference)
                .copied()
                .unwrap_or((PaymentStatus::Pending, 0));
            Ok(PaymentVerification {
                status,
                amount_minor_units: amount,
                reference: reference.to_string(),
                gateway_status: "scripted".into(),
                currency: Some("GHS".into()),
                channel: None,
                paid_at: None,
            })
        }

        fn verify_webhook_signature(&self, _raw_body: &[u8], _signature: &str) -> bool {
            false
        }
    }

    struct Harness {
        store: InMemoryStore,
        gateway: Arc<ScriptedGateway>,
        orders: OrderService,
        sweeper: PendingPaymentSweeper,
    }

    fn harness(batch_size: u64) -> Harness {
        let store = InMemoryStore::new();
        let gateway = Arc::new(ScriptedGateway::default());
        let notifier = OrderNotifier::new(Arc::new(LogMailer), "orders@test");
        let orders = OrderService::new(Arc::new(store.clone()), gateway.clone(), notifier.clone());
        let payments =
            PaymentConfirmationService::new(Arc::new(store.clone()), gateway.clone(), notifier);
        let sweeper = PendingPaymentSweeper::new(
            Arc::new(store.clone()),
            payments,
            SweeperSettings {
                pending_ttl: Duration::from_secs(30 * 60),
                interval: Duration::from_secs(60),
                batch_size,
            },
        );
        Harness {
            store,
            gateway,
            orders,
            sweeper,
        }
    }

    async fn place_online_order(orders: &OrderService, variant_id: Uuid, quantity: i32) -> (Uuid, String) {
        let placement = orders
            .create_order(PlaceOrderInput {
                customer: Customer::Guest {
                    name: "Yaw".into(),
                    phone: "0201112222".into(),
                    email: Some("yaw@example.com".into()),
                },
                items: vec![CartLine { variant_id, quantity }],
                shipping_address: ShippingAddress {
                    street: "8 Liberation Road".into(),
                    city: "Accra".into(),
                    region: "greater-accra".into(),
                    directions: None,
                    coordinates: None,
                },
                scheduled_date: None,
                time_window: None,
                payment_method: PaymentMethod::Paystack,
            })
            .await
            .unwrap();
        (placement.order.id, placement.order.payment_ref)
    }

    #[tokio::test]
    async fn underpaid_orders_do_not_block_later_stale_orders() {
        let h = harness(1);
        let product = h.store.add_product("Coach Jacket", dec!(150), true).await;
        let variant = h.store.add_variant(product, "L", "Black", 5, None).await;

        let (underpaid, underpaid_ref) = place_online_order(&h.orders, variant, 1).await;
        let (abandoned, abandoned_ref) = place_online_order(&h.orders, variant, 1).await;
        assert_eq!(h.store.stock_of(variant).await, Some(3));

        h.gateway.answer(&underpaid_ref, PaymentStatus::Success, 100);
        h.gateway.answer(&abandoned_ref, PaymentStatus::Failed, 0);

        let later = Utc::now() + chrono::Duration::hours(1);
        let first = h.sweeper.sweep_at(later).await.unwrap();
        let second = h.sweeper.sweep_at(later).await.unwrap();

        assert_eq!(first.examined, 1);
        assert_eq!(second.examined, 1);
        assert_eq!(first.untouched + second.untouched, 1);
        assert_eq!(first.cancelled + second.cancelled, 1);

        let held = h.store.order(underpaid).await.unwrap();
        assert_eq!(held.status, OrderStatus::Pending);
        assert!(held.needs_review);
        assert_eq!(
            h.store.order(abandoned).await.unwrap().status,
            OrderStatus::Cancelled
        );
        assert_eq!(h.store.stock_of(variant).await, Some(4));

        let third = h.sweeper.sweep_at(later).await.unwrap();
        assert_eq!(third, SweepReport::default());
    }

    #[tokio::test]
    async fn fresh_orders_are_left_for_the_webhook() {
        let h = harness(10);
        let product = h.store.add_product("Beanie", dec!(40), true).await;
        let variant = h.store.add_variant(product, "OS", "Grey", 2, None).await;
        let (order_id, _) = place_online_order(&h.orders, variant, 1).await;

        let report = h.sweeper.sweep_at(Utc::now()).await.unwrap();
        assert_eq!(report.examined, 0);
        assert_eq!(
            h.store.order(order_id).await.unwrap().status,
            OrderStatus::Pending
        );
    }
}
