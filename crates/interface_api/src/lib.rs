//! HTTP API Layer
//!
//! This crate provides the REST API for condominium payments using Axum.
//!
//! # Architecture
//!
//! - **Handlers**: Request handlers for checkout, manual payments,
//!   transactions, the catalog, and provider webhooks
//! - **Middleware**: Authentication, admin authorization, audit logging
//! - **DTOs**: Request/Response data transfer objects
//! - **Error Handling**: Consistent error responses
//!
//! Webhooks are public; providers authenticate with signatures, which the
//! gateway adapters verify.
//!
//! # Example
//!
//! ```rust,ignore
//! use interface_api::create_router;
//!
//! let app = create_router(service, config);
//! axum::serve(listener, app).await?;
//! ```

pub mod auth;
pub mod config;
pub mod dto;
pub mod error;
pub mod handlers;
pub mod middleware;

use std::sync::Arc;

use axum::{
    middleware as axum_middleware,
    routing::{get, post, put},
    Router,
};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use domain_payments::PaymentService;

use crate::config::ApiConfig;
use crate::handlers::{catalog, health, payments, transactions, webhooks};
use crate::middleware::{admin_middleware, audit_middleware, auth_middleware};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<PaymentService>,
    pub config: ApiConfig,
}

/// Creates the main API router
///
/// # Arguments
///
/// * `service` - Payment service over the configured store and gateways
/// * `config` - API configuration
///
/// # Returns
///
/// Configured Axum router with all routes and middleware
pub fn create_router(service: Arc<PaymentService>, config: ApiConfig) -> Router {
    let state = AppState { service, config };

    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/health", get(health::health_check))
        .route("/health/ready", get(health::readiness_check))
        .route("/webhooks/:gateway_type", post(webhooks::receive_webhook));

    // Administrator-only settlement of manual payments
    let admin_payment_routes = Router::new()
        .route("/verify-manual", post(payments::verify_manual))
        .route("/reject-manual", post(payments::reject_manual))
        .route_layer(axum_middleware::from_fn(admin_middleware));

    let payment_routes = Router::new()
        .route("/create-link", post(payments::create_link))
        .route("/manual", post(payments::register_manual))
        .merge(admin_payment_routes);

    // Catalog administration; listing stays open to every authenticated user
    let admin_method_routes = Router::new()
        .route("/payment-methods", post(catalog::create_payment_method))
        .route(
            "/payment-methods/:method_id",
            put(catalog::update_payment_method).delete(catalog::deactivate_payment_method),
        )
        .route_layer(axum_middleware::from_fn(admin_middleware));

    let transaction_routes = Router::new()
        .route("/", get(transactions::list_transactions))
        .route("/:transaction_id", get(transactions::get_transaction));

    // Protected API routes
    let api_routes = Router::new()
        .nest("/payments", payment_routes)
        .nest("/transactions", transaction_routes)
        .route("/payment-methods", get(catalog::list_payment_methods))
        .route("/payment-gateways", get(catalog::list_gateways))
        .route(
            "/payment-gateways/bank-transfer",
            get(catalog::bank_transfer_instructions),
        )
        .merge(admin_method_routes)
        .layer(axum_middleware::from_fn_with_state(state.clone(), audit_middleware))
        .layer(axum_middleware::from_fn_with_state(state.clone(), auth_middleware));

    // Combine all routes
    Router::new()
        .merge(public_routes)
        .nest("/api/v1", api_routes)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
