//! Storefront API Library
//!
//! Order placement, stock reservation and Paystack payment confirmation for
//! the storefront checkout.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod handlers;
pub mod middleware_helpers;
pub mod migrator;
pub mod models;
pub mod notifications;
pub mod openapi;
pub mod services;
pub mod store;
pub mod tracing;

use axum::{
    extract::State,
    http::{HeaderValue, StatusCode},
    response::Json,
    routing::{get, patch, post},
    Router,
};
use sea_orm::DatabaseConnection;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::{
    auth::JwtVerifier,
    config::AppConfig,
    notifications::{Mailer, OrderNotifier},
    services::{
        inventory::InventoryService, orders::OrderService, payment_gateway::PaymentGateway,
        payment_sweeper::{PendingPaymentSweeper, SweeperSettings},
        payments::PaymentConfirmationService,
    },
    store::{sea_orm_store::SeaOrmStore, OrderStore},
};

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: AppConfig,
    pub jwt: JwtVerifier,
    pub order_service: OrderService,
    pub inventory_service: InventoryService,
    pub payment_service: PaymentConfirmationService,
    store: Arc<dyn OrderStore>,
}

impl AppState {
    /// Wires every service on top of one database connection.
    pub fn new(
        config: AppConfig,
        db: Arc<DatabaseConnection>,
        gateway: Arc<dyn PaymentGateway>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        let store: Arc<dyn OrderStore> = Arc::new(SeaOrmStore::new(db.clone()));
        let notifier = OrderNotifier::new(mailer, config.mail_from.clone());

        Self {
            jwt: JwtVerifier::new(&config.jwt_secret),
            order_service: OrderService::new(store.clone(), gateway.clone(), notifier.clone()),
            inventory_service: InventoryService::new(store.clone()),
            payment_service: PaymentConfirmationService::new(store.clone(), gateway, notifier),
            store,
            db,
            config,
        }
    }

    /// Sweeper sharing this state's store and payment service.
    pub fn payment_sweeper(&self) -> PendingPaymentSweeper {
        PendingPaymentSweeper::new(
            self.store.clone(),
            self.payment_service.clone(),
            SweeperSettings::from(&self.config),
        )
    }
}

pub fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .route("/status", get(api_status))
        .route("/orders", post(handlers::orders::create_order))
        .route("/orders/guest", post(handlers::orders::create_guest_order))
        .route("/orders/validate", post(handlers::orders::validate_cart))
        .route("/orders/lookup", get(handlers::orders::lookup_order))
        .route("/orders/mine", get(handlers::orders::my_orders))
        .route(
            "/orders/verify",
            post(handlers::payment_webhooks::paystack_webhook),
        )
        .route(
            "/orders/payments/:reference/verify",
            get(handlers::orders::verify_payment),
        )
        .route("/orders/:id", get(handlers::orders::get_order))
        .route(
            "/orders/:id/status",
            patch(handlers::orders::update_order_status),
        )
}

/// Full application router without CORS, which depends on deployment config.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", api_v1_routes())
        .merge(openapi::swagger_ui())
        .layer(crate::tracing::configure_http_tracing())
        .layer(axum::middleware::from_fn(
            middleware_helpers::request_id_middleware,
        ))
        .with_state(state)
}

/// CORS from config. `None` means the config allows neither explicit origins
/// nor a permissive policy.
pub fn cors_layer(cfg: &AppConfig) -> Option<CorsLayer> {
    let configured_origins: Option<Vec<HeaderValue>> = cfg
        .cors_allowed_origins
        .as_ref()
        .map(|raw| {
            raw.split(',')
                .filter_map(|origin| {
                    let trimmed = origin.trim();
                    if trimmed.is_empty() {
                        None
                    } else {
                        HeaderValue::from_str(trimmed).ok()
                    }
                })
                .collect::<Vec<_>>()
        })
        .filter(|origins| !origins.is_empty());

    if let Some(origins) = configured_origins {
        Some(
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any),
        )
    } else if cfg.should_allow_permissive_cors() {
        ::tracing::info!(
            "Using permissive CORS because explicit origins were not configured ({})",
            if cfg.is_development() {
                "development environment"
            } else {
                "explicit override enabled"
            }
        );
        Some(CorsLayer::permissive())
    } else {
        None
    }
}

async fn api_status(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "git": option_env!("GIT_HASH").unwrap_or("unknown"),
        "service": "storefront-api",
        "environment": state.config.environment,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let db_status = match db::check_connection(&state.db).await {
        Ok(()) => "healthy",
        Err(err) => {
            ::tracing::warn!(error = %err, "health check: database unreachable");
            "unhealthy"
        }
    };
    let status = if db_status == "healthy" {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(json!({
            "status": db_status,
            "checks": { "database": db_status },
            "timestamp": chrono::Utc::now().to_rfc3339(),
        })),
    )
}
