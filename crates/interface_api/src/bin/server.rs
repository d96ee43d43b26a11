//! Condominium Payments - API Server Binary
//!
//! This binary starts the HTTP API server for condominium payments.
//!
//! # Usage
//!
//! ```bash
//! # Run with default configuration
//! cargo run --bin payments-api
//!
//! # Run with environment variables
//! API_HOST=0.0.0.0 API_PORT=8080 DATABASE_URL=postgres://... cargo run --bin payments-api
//! ```
//!
//! # Environment Variables
//!
//! * `API_HOST` - Server host (default: 0.0.0.0)
//! * `API_PORT` - Server port (default: 8080)
//! * `API_JWT_SECRET` - JWT signing secret (required in production)
//! * `API_JWT_EXPIRATION_SECS` - JWT token expiration in seconds (default: 3600)
//! * `API_DATABASE_URL` / `DATABASE_URL` - PostgreSQL connection string
//! * `API_LOG_LEVEL` - Log level: trace, debug, info, warn, error (default: info)
//! * `API_BILLING_TIMEZONE` - IANA zone for quote due dates (default: America/Santiago)
//! * `API_LINK_TTL_HOURS` - Link lifetime for overdue quotes (default: 72)
//! * `API_BOOTSTRAP_CATALOG` - Create default methods and gateways (default: true)
//! * `API_MERCADOPAGO__ACCESS_TOKEN`, `API_MERCADOPAGO__WEBHOOK_SECRET`,
//!   `API_MERCADOPAGO__NOTIFICATION_URL` - MercadoPago credentials
//! * `API_STRIPE__SECRET_KEY`, `API_STRIPE__WEBHOOK_SECRET` - Stripe credentials

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use domain_payments::{GatewayRegistry, MercadoPagoAdapter, PaymentService, StripeAdapter};
use infra_db::{create_pool, run_migrations, DatabaseConfig, PostgresPaymentStore};
use interface_api::{config::ApiConfig, create_router};
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Main entry point for the API server.
///
/// Initializes logging, loads configuration, establishes database connection,
/// applies migrations, seeds the payment catalog, and starts the HTTP server.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (useful for local development)
    dotenvy::dotenv().ok();

    let config = load_config()?;

    init_tracing(&config.log_level);

    tracing::info!(
        host = %config.host,
        port = %config.port,
        "Starting Condominium Payments API Server"
    );

    tracing::info!("Connecting to database...");
    let pool = create_pool(DatabaseConfig::new(config.database_url.clone()))
        .await
        .context("failed to connect to database")?;

    tracing::info!("Running database migrations...");
    run_migrations(&pool)
        .await
        .context("failed to apply migrations")?;

    let service = build_service(&config, pool)?;

    if config.bootstrap_catalog {
        let report = service
            .bootstrap_catalog()
            .await
            .context("failed to bootstrap payment catalog")?;
        tracing::info!(
            methods = report.methods_created.len(),
            gateways = report.gateways_created.len(),
            "Payment catalog checked"
        );
    }

    let app = create_router(service, config.clone());

    let addr: SocketAddr = config
        .server_addr()
        .parse()
        .context("invalid server address")?;

    tracing::info!(%addr, "Server listening");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Loads API configuration from environment variables.
///
/// A plain `DATABASE_URL` is honored when `API_DATABASE_URL` is unset.
fn load_config() -> anyhow::Result<ApiConfig> {
    let mut config = ApiConfig::from_env().context("invalid API configuration")?;

    if std::env::var("API_DATABASE_URL").is_err() {
        if let Ok(url) = std::env::var("DATABASE_URL") {
            config.database_url = url;
        }
    }

    Ok(config)
}

/// Wires the store and gateway adapters into the payment service
fn build_service(config: &ApiConfig, pool: infra_db::DatabasePool) -> anyhow::Result<Arc<PaymentService>> {
    let store = Arc::new(PostgresPaymentStore::new(pool));

    let gateways = GatewayRegistry::new()
        .with_adapter(Arc::new(MercadoPagoAdapter::new(config.mercadopago.clone())))
        .with_adapter(Arc::new(StripeAdapter::new(config.stripe.clone())));

    let service_config = config
        .payment_service_config()
        .context("invalid payment settings")?;

    tracing::info!(
        gateways = ?gateways.supported_types(),
        billing_timezone = %service_config.billing_timezone,
        "Payment service configured"
    );

    Ok(Arc::new(
        PaymentService::new(store, gateways).with_config(service_config),
    ))
}

/// Initializes the tracing subscriber for structured logging.
///
/// # Arguments
///
/// * `log_level` - The minimum log level to output (trace, debug, info, warn, error)
fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
///
/// In-flight requests, including webhook deliveries, complete before the
/// process exits.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
