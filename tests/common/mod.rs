#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveValue::Set, DatabaseConnection, EntityTrait};
use serde_json::{json, Value};
use storefront_api::{
    app_router,
    config::AppConfig,
    db,
    entities::{product, product_variant, Order, Product, ProductVariant},
    errors::ServiceError,
    notifications::{EmailMessage, Mailer, NotificationError},
    services::payment_gateway::{
        sign_hmac_sha512, verify_hmac_sha512, InitializePaymentRequest, PaymentGateway,
        PaymentSession, PaymentStatus, PaymentVerification,
    },
    AppState,
};
use tower::ServiceExt;
use uuid::Uuid;

pub const JWT_SECRET: &str = "test_secret_key_for_storefront_orders_0123456789";
pub const PAYSTACK_SECRET: &str = "sk_test_storefront_webhook_secret";

/// Stand-in for Paystack. Verification answers come from `set_verification`
/// or from the amount recorded at initialization; unknown references fail
/// the way Paystack does.
#[derive(Default)]
pub struct FakeGateway {
    initialized: Mutex<Vec<InitializePaymentRequest>>,
    verifications: Mutex<HashMap<String, (PaymentStatus, i64)>>,
    fail_initialize: Mutex<bool>,
}

impl FakeGateway {
    pub fn set_verification(&self, reference: &str, status: PaymentStatus, amount_minor_units: i64) {
        self.verifications
            .lock()
            .unwrap()
            .insert(reference.to_string(), (status, amount_minor_units));
    }

    pub fn fail_initialize(&self, fail: bool) {
        *self.fail_initialize.lock().unwrap() = fail;
    }

    pub fn initialized(&self) -> Vec<InitializePaymentRequest> {
        self.initialized.lock().unwrap().clone()
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn initialize_payment(
        &self,
        request: InitializePaymentRequest,
    ) -> Result<PaymentSession, ServiceError> {
        if *self.fail_initialize.lock().unwrap() {
            return Err(ServiceError::ExternalServiceError("connection refused".into()));
        }
        self.verifications.lock().unwrap().insert(
            request.reference.clone(),
            (PaymentStatus::Pending, request.amount_minor_units),
        );
        let session = PaymentSession {
            authorization_url: format!("https://checkout.paystack.test/{}", request.reference),
            reference: request.reference.clone(),
        };
        self.initialized.lock().unwrap().push(request);
        Ok(session)
    }

    async fn verify_payment(&self, reference: &str) -> Result<PaymentVerification, ServiceError> {
        let known = self.verifications.lock().unwrap().get(reference).copied();
        let (status, amount) = known.ok_or_else(|| {
            ServiceError::PaymentGateway("Transaction reference not found".into())
        })?;
        Ok(PaymentVerification {
            status,
            amount_minor_units: amount,
            reference: reference.to_string(),
            gateway_status: match status {
                PaymentStatus::Success => "success",
                PaymentStatus::Failed => "failed",
                PaymentStatus::Pending => "ongoing",
            }
            .to_string(),
            currency: Some("GHS".into()),
            channel: Some("card".into()),
            paid_at: None,
        })
    }

    fn verify_webhook_signature(&self, raw_body: &[u8], signature: &str) -> bool {
        verify_hmac_sha512(PAYSTACK_SECRET, raw_body, signature)
    }
}

#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<EmailMessage>>,
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, message: EmailMessage) -> Result<(), NotificationError> {
        self.sent.lock().unwrap().push(message);
        Ok(())
    }
}

/// Application state and router over a fresh in-memory SQLite database.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub db: Arc<DatabaseConnection>,
    pub gateway: Arc<FakeGateway>,
    pub mailer: Arc<RecordingMailer>,
}

impl TestApp {
    pub async fn new() -> Self {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            JWT_SECRET.to_string(),
            PAYSTACK_SECRET.to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        // Every pooled connection to sqlite::memory: is its own database.
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let db = Arc::new(pool);
        let gateway = Arc::new(FakeGateway::default());
        let mailer = Arc::new(RecordingMailer::default());
        let state = AppState::new(cfg, db.clone(), gateway.clone(), mailer.clone());

        Self {
            router: app_router(state.clone()),
            state,
            db,
            gateway,
            mailer,
        }
    }

    /// Seeds an active product with one variant and returns the variant id.
    pub async fn seed_variant(&self, title: &str, price: Decimal, stock: i32) -> Uuid {
        let product_id = self.seed_product(title, price, true).await;
        self.seed_variant_for(product_id, "M", "Black", stock, None)
            .await
    }

    pub async fn seed_product(&self, title: &str, price: Decimal, is_active: bool) -> Uuid {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let model = product::ActiveModel {
            id: Set(id),
            title: Set(title.to_string()),
            slug: Set(format!("{}-{}", title.to_lowercase().replace(' ', "-"), id.simple())),
            description: Set(None),
            base_price: Set(price),
            is_active: Set(is_active),
            low_stock_threshold: Set(5),
            created_at: Set(now),
            updated_at: Set(now),
        };
        Product::insert(model)
            .exec_without_returning(self.db.as_ref())
            .await
            .expect("seed product");
        id
    }

    pub async fn seed_variant_for(
        &self,
        product_id: Uuid,
        size: &str,
        color: &str,
        stock: i32,
        price_override: Option<Decimal>,
    ) -> Uuid {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let model = product_variant::ActiveModel {
            id: Set(id),
            product_id: Set(product_id),
            size: Set(size.to_string()),
            color: Set(color.to_string()),
            stock_quantity: Set(stock),
            price_override: Set(price_override),
            sku: Set(format!("SKU-{}", id.simple())),
            created_at: Set(now),
            updated_at: Set(now),
        };
        ProductVariant::insert(model)
            .exec_without_returning(self.db.as_ref())
            .await
            .expect("seed variant");
        id
    }

    pub async fn stock_of(&self, variant_id: Uuid) -> i32 {
        ProductVariant::find_by_id(variant_id)
            .one(self.db.as_ref())
            .await
            .expect("load variant")
            .expect("variant exists")
            .stock_quantity
    }

    pub async fn order_status(&self, order_id: Uuid) -> String {
        Order::find_by_id(order_id)
            .one(self.db.as_ref())
            .await
            .expect("load order")
            .expect("order exists")
            .status
    }

    /// Places a guest Paystack order through the API; returns the order id
    /// and its payment reference.
    pub async fn place_paystack_order(&self, variant_id: Uuid, quantity: i32) -> (Uuid, String) {
        let (status, body) = self
            .request(
                Method::POST,
                "/api/v1/orders/guest",
                Some(guest_order(
                    json!([{ "variantId": variant_id, "quantity": quantity }]),
                    "paystack",
                    Some("ama@example.com"),
                )),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "body: {body}");
        let order_id = body["orderId"]
            .as_str()
            .and_then(|id| Uuid::parse_str(id).ok())
            .expect("order id");
        let reference = self
            .gateway
            .initialized()
            .last()
            .map(|init| init.reference.clone())
            .expect("payment initialized");
        (order_id, reference)
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("build request");
        self.send(request).await
    }

    /// Posts a raw webhook body, signed unless `signature` is given.
    pub async fn post_webhook(&self, body: &Value, signature: Option<&str>) -> (StatusCode, Value) {
        let raw = body.to_string();
        let signature = match signature {
            Some(sig) => sig.to_string(),
            None => sign_hmac_sha512(PAYSTACK_SECRET, raw.as_bytes()).expect("sign body"),
        };
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/v1/orders/verify")
            .header("content-type", "application/json")
            .header("x-paystack-signature", signature)
            .body(Body::from(raw))
            .expect("build request");
        self.send(request).await
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }
}

pub fn token_for(user_id: Uuid, email: &str, roles: &[&str]) -> String {
    let claims = json!({
        "sub": user_id.to_string(),
        "email": email,
        "roles": roles,
        "exp": (Utc::now() + chrono::Duration::hours(1)).timestamp(),
    });
    jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .expect("encode token")
}

pub fn address(region: &str) -> Value {
    json!({
        "street": "12 Oxford Street",
        "city": "Accra",
        "region": region,
        "directions": "Opposite the mall"
    })
}

pub fn guest_order(items: Value, method: &str, email: Option<&str>) -> Value {
    json!({
        "customerName": "Ama Mensah",
        "customerPhone": "+233 24 555 0101",
        "customerEmail": email,
        "items": items,
        "shippingAddress": address("greater-accra"),
        "scheduledDate": "2026-11-02",
        "timeWindow": "10:00-12:00",
        "paymentMethod": method,
    })
}

pub fn charge_event(event: &str, reference: &str) -> Value {
    json!({
        "event": event,
        "data": { "reference": reference, "status": "success" }
    })
}
