//! Default payment catalog
//!
//! The four payment methods every condominium starts with, plus one gateway
//! record per provider. Card gateways start inactive until real credentials
//! are configured.

use serde::Serialize;
use serde_json::{json, Value};

use crate::gateway::{GatewayType, JsonMap, PaymentGateway};
use crate::method::PaymentMethod;

pub const CASH: &str = "Efectivo";
pub const BANK_TRANSFER: &str = "Transferencia Bancaria";
pub const CARD: &str = "Tarjeta de Crédito/Débito";
pub const DIGITAL_WALLET: &str = "Billetera Digital";

pub const BANK_GATEWAY: &str = "Banco Nacional - Condominio";
pub const MERCADOPAGO_GATEWAY: &str = "MercadoPago Test";
pub const STRIPE_GATEWAY: &str = "Stripe Test";

/// What a bootstrap run created
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BootstrapReport {
    pub methods_created: Vec<String>,
    pub gateways_created: Vec<String>,
}

impl BootstrapReport {
    pub fn is_noop(&self) -> bool {
        self.methods_created.is_empty() && self.gateways_created.is_empty()
    }
}

pub fn default_payment_methods() -> Vec<PaymentMethod> {
    vec![
        PaymentMethod::new(CASH, "Pago en efectivo directo al administrador", false, true),
        PaymentMethod::new(
            BANK_TRANSFER,
            "Transferencia a cuenta bancaria del condominio",
            true,
            true,
        ),
        PaymentMethod::new(CARD, "Pago con tarjeta a través de pasarela segura", true, false),
        PaymentMethod::new(
            DIGITAL_WALLET,
            "Pago mediante MercadoPago, PayPal u otra billetera",
            true,
            false,
        ),
    ]
}

pub fn default_gateways() -> Vec<PaymentGateway> {
    let bank = PaymentGateway::new(BANK_GATEWAY, GatewayType::BankTransfer)
        .with_config("requires_manual_verification", true)
        .with_config("instructions", "Enviar comprobante por WhatsApp o email")
        .with_bank_info(object(json!({
            "bank_name": "Banco Nacional",
            "account_number": "",
            "account_type": "Cuenta Corriente",
            "holder_name": "",
            "rut": "",
            "email": "",
            "whatsapp": "",
        })));

    let mercadopago = PaymentGateway::new(MERCADOPAGO_GATEWAY, GatewayType::MercadoPago)
        .with_config("access_token", "")
        .with_config("public_key", "")
        .with_config("webhook_secret", "")
        .with_config("webhook_url", "")
        .with_config("success_url", "")
        .with_config("failure_url", "")
        .with_config("pending_url", "")
        .inactive();

    let stripe = PaymentGateway::new(STRIPE_GATEWAY, GatewayType::Stripe)
        .with_config("publishable_key", "")
        .with_config("secret_key", "")
        .with_config("webhook_secret", "")
        .with_config("success_url", "")
        .with_config("cancel_url", "")
        .inactive();

    vec![bank, mercadopago, stripe]
}

fn object(value: Value) -> JsonMap {
    match value {
        Value::Object(map) => map,
        _ => JsonMap::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_methods_flags() {
        let methods = default_payment_methods();
        let by_name = |name: &str| methods.iter().find(|m| m.name == name).unwrap();

        assert!(!by_name(CASH).requires_gateway);
        assert!(by_name(CASH).manual_verification);
        assert!(by_name(BANK_TRANSFER).requires_gateway);
        assert!(by_name(BANK_TRANSFER).manual_verification);
        assert!(by_name(CARD).supports_checkout());
        assert!(by_name(DIGITAL_WALLET).supports_checkout());
    }

    #[test]
    fn test_only_bank_gateway_starts_active() {
        let gateways = default_gateways();
        let active: Vec<_> = gateways.iter().filter(|g| g.is_active).collect();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].gateway_type, GatewayType::BankTransfer);
        assert!(active[0].bank_info.contains_key("account_number"));
    }

    #[test]
    fn test_card_gateways_have_no_credentials() {
        for gateway in default_gateways() {
            assert_eq!(gateway.config_str("access_token"), None);
            assert_eq!(gateway.config_str("secret_key"), None);
        }
    }
}
