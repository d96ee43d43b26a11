//! API configuration
//!
//! Loaded from `API_*` environment variables. Nested gateway credentials use
//! a double underscore, e.g. `API_MERCADOPAGO__ACCESS_TOKEN` or
//! `API_STRIPE__WEBHOOK_SECRET`.

use chrono::Duration;
use chrono_tz::Tz;
use serde::Deserialize;

use domain_payments::{MercadoPagoConfig, PaymentServiceConfig, StripeConfig};

/// API configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// JWT secret for authentication
    pub jwt_secret: String,
    /// JWT expiration in seconds
    pub jwt_expiration_secs: u64,
    /// Database URL
    pub database_url: String,
    /// Log level
    pub log_level: String,
    /// IANA zone in which quote due dates end
    pub billing_timezone: String,
    /// Lifetime of payment links for quotes already past due
    pub link_ttl_hours: i64,
    /// Create the default payment methods and gateways on startup
    pub bootstrap_catalog: bool,
    pub mercadopago: MercadoPagoConfig,
    pub stripe: StripeConfig,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            jwt_secret: "change-me-in-production".to_string(),
            jwt_expiration_secs: 3600,
            database_url: "postgres://localhost/condominium".to_string(),
            log_level: "info".to_string(),
            billing_timezone: "America/Santiago".to_string(),
            link_ttl_hours: 72,
            bootstrap_catalog: true,
            mercadopago: MercadoPagoConfig::default(),
            stripe: StripeConfig::default(),
        }
    }
}

impl ApiConfig {
    /// Loads configuration from environment
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(
                config::Environment::with_prefix("API")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Returns the server address
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Settings for the payment service
    ///
    /// # Errors
    ///
    /// Returns an error if the billing timezone is not a known IANA zone or
    /// the link lifetime is not positive.
    pub fn payment_service_config(&self) -> Result<PaymentServiceConfig, config::ConfigError> {
        let billing_timezone: Tz = self.billing_timezone.parse().map_err(|_| {
            config::ConfigError::Message(format!(
                "Unknown billing timezone: {}",
                self.billing_timezone
            ))
        })?;
        if self.link_ttl_hours <= 0 {
            return Err(config::ConfigError::Message(
                "link_ttl_hours must be positive".to_string(),
            ));
        }
        Ok(PaymentServiceConfig {
            billing_timezone,
            link_ttl: Duration::hours(self.link_ttl_hours),
        })
    }
}
