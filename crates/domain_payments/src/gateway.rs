//! Payment gateway registry records
//!
//! A `PaymentGateway` holds the configuration of one provider account:
//! credentials and URLs in `config_data`, and for bank transfers the
//! account details residents need in `bank_info`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use core_kernel::PaymentGatewayId;

use crate::error::PaymentError;

/// Opaque JSON object stored as JSONB
pub type JsonMap = serde_json::Map<String, Value>;

/// Supported gateway providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GatewayType {
    #[serde(rename = "mercadopago")]
    MercadoPago,
    #[serde(rename = "stripe")]
    Stripe,
    #[serde(rename = "paypal")]
    PayPal,
    #[serde(rename = "bank_transfer")]
    BankTransfer,
}

impl GatewayType {
    pub const ALL: [GatewayType; 4] = [
        GatewayType::MercadoPago,
        GatewayType::Stripe,
        GatewayType::PayPal,
        GatewayType::BankTransfer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GatewayType::MercadoPago => "mercadopago",
            GatewayType::Stripe => "stripe",
            GatewayType::PayPal => "paypal",
            GatewayType::BankTransfer => "bank_transfer",
        }
    }

    /// Bank transfers are verified by an administrator, never by an adapter
    pub fn is_manual(&self) -> bool {
        matches!(self, GatewayType::BankTransfer)
    }

    /// Prefix used when generating transaction ids
    pub fn transaction_prefix(&self) -> &'static str {
        match self {
            GatewayType::MercadoPago => "MP",
            GatewayType::Stripe => "STRIPE",
            GatewayType::PayPal => "PAYPAL",
            GatewayType::BankTransfer => "BANK",
        }
    }
}

impl fmt::Display for GatewayType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GatewayType {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mercadopago" => Ok(GatewayType::MercadoPago),
            "stripe" => Ok(GatewayType::Stripe),
            "paypal" => Ok(GatewayType::PayPal),
            "bank_transfer" => Ok(GatewayType::BankTransfer),
            other => Err(PaymentError::validation(format!(
                "Unknown gateway type: {}",
                other
            ))),
        }
    }
}

/// A configured gateway account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentGateway {
    pub id: PaymentGatewayId,
    pub name: String,
    pub gateway_type: GatewayType,
    /// Credentials, URLs and provider options
    pub config_data: JsonMap,
    /// Only meaningful for bank transfers
    pub bank_info: JsonMap,
    pub is_test_mode: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentGateway {
    pub fn new(name: impl Into<String>, gateway_type: GatewayType) -> Self {
        let now = Utc::now();
        Self {
            id: PaymentGatewayId::new_v7(),
            name: name.into(),
            gateway_type,
            config_data: JsonMap::new(),
            bank_info: JsonMap::new(),
            is_test_mode: true,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set_config(key, value);
        self
    }

    pub fn with_bank_info(mut self, bank_info: JsonMap) -> Self {
        self.bank_info = bank_info;
        self
    }

    pub fn live(mut self) -> Self {
        self.is_test_mode = false;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    pub fn get_config(&self, key: &str) -> Option<&Value> {
        self.config_data.get(key)
    }

    /// Non-empty string config value
    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.config_data
            .get(key)
            .and_then(Value::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    pub fn set_config(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.config_data.insert(key.into(), value.into());
        self.updated_at = Utc::now();
    }

    pub fn is_manual(&self) -> bool {
        self.gateway_type.is_manual()
    }

    /// Client-safe view with credentials removed from `config_data`
    pub fn public_view(&self) -> PublicGateway {
        let public_config = self
            .config_data
            .iter()
            .filter(|(key, _)| !is_secret_key(key))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        PublicGateway {
            id: self.id,
            name: self.name.clone(),
            gateway_type: self.gateway_type,
            config: public_config,
            bank_info: self.bank_info.clone(),
            is_test_mode: self.is_test_mode,
        }
    }
}

/// Gateway as exposed to residents and frontends
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicGateway {
    pub id: PaymentGatewayId,
    pub name: String,
    pub gateway_type: GatewayType,
    pub config: JsonMap,
    pub bank_info: JsonMap,
    pub is_test_mode: bool,
}

fn is_secret_key(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    key.contains("secret")
        || key.contains("token")
        || key.contains("password")
        || key == "api_key"
        || key == "private_key"
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_gateway_type_parsing() {
        assert_eq!("mercadopago".parse::<GatewayType>().unwrap(), GatewayType::MercadoPago);
        assert_eq!("Stripe".parse::<GatewayType>().unwrap(), GatewayType::Stripe);
        assert_eq!("bank_transfer".parse::<GatewayType>().unwrap(), GatewayType::BankTransfer);
        assert!(matches!(
            "webpay".parse::<GatewayType>(),
            Err(PaymentError::Validation(_))
        ));
    }

    #[test]
    fn test_gateway_type_serde_matches_as_str() {
        for gateway_type in GatewayType::ALL {
            let json = serde_json::to_string(&gateway_type).unwrap();
            assert_eq!(json, format!("\"{}\"", gateway_type.as_str()));
        }
    }

    #[test]
    fn test_only_bank_transfer_is_manual() {
        assert!(GatewayType::BankTransfer.is_manual());
        assert!(!GatewayType::MercadoPago.is_manual());
        assert!(!GatewayType::Stripe.is_manual());
    }

    #[test]
    fn test_config_helpers() {
        let mut gateway = PaymentGateway::new("MercadoPago", GatewayType::MercadoPago)
            .with_config("access_token", "TEST-123")
            .with_config("public_key", "");

        assert_eq!(gateway.config_str("access_token"), Some("TEST-123"));
        assert_eq!(gateway.config_str("public_key"), None);
        assert!(gateway.get_config("public_key").is_some());

        gateway.set_config("webhook_url", "https://condo.example/webhooks/mercadopago");
        assert_eq!(
            gateway.get_config("webhook_url"),
            Some(&json!("https://condo.example/webhooks/mercadopago"))
        );
    }

    #[test]
    fn test_public_view_strips_credentials() {
        let gateway = PaymentGateway::new("Stripe", GatewayType::Stripe)
            .with_config("publishable_key", "pk_test_1")
            .with_config("secret_key", "sk_test_1")
            .with_config("webhook_secret", "whsec_1")
            .with_config("success_url", "https://condo.example/ok");

        let view = gateway.public_view();
        assert!(view.config.contains_key("publishable_key"));
        assert!(view.config.contains_key("success_url"));
        assert!(!view.config.contains_key("secret_key"));
        assert!(!view.config.contains_key("webhook_secret"));
    }
}
