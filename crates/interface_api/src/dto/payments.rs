//! Payments DTOs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use domain_payments::{
    JsonMap, PaymentMethod, PaymentMethodChanges, PaymentTransaction, TransactionStatus,
};

#[derive(Debug, Deserialize, Validate)]
pub struct CreateLinkBody {
    pub quote_id: Uuid,
    /// Parsed by the handler so unknown providers get a domain error
    #[validate(length(min = 1, max = 50))]
    pub gateway_type: String,
    #[validate(email)]
    pub payer_email: String,
    pub payment_method_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ManualPaymentBody {
    pub quote_id: Uuid,
    pub payment_method_id: Uuid,
    #[validate(length(min = 1, max = 50))]
    pub gateway_type: Option<String>,
    #[validate(length(max = 255))]
    pub payment_reference: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct VerifyManualBody {
    #[validate(length(min = 1, max = 100))]
    pub transaction_id: String,
    #[validate(length(min = 1, max = 255))]
    pub payment_reference: String,
    #[validate(length(max = 2048))]
    pub payment_proof: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RejectManualBody {
    #[validate(length(min = 1, max = 100))]
    pub transaction_id: String,
    #[validate(length(min = 1, max = 500))]
    pub reason: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreatePaymentMethodBody {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[serde(default)]
    #[validate(length(max = 500))]
    pub description: String,
    #[serde(default)]
    pub requires_gateway: bool,
    #[serde(default)]
    pub manual_verification: bool,
}

impl From<CreatePaymentMethodBody> for PaymentMethod {
    fn from(body: CreatePaymentMethodBody) -> Self {
        PaymentMethod::new(
            body.name,
            body.description,
            body.requires_gateway,
            body.manual_verification,
        )
    }
}

/// Omitted fields keep their stored value
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdatePaymentMethodBody {
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
    #[validate(length(max = 500))]
    pub description: Option<String>,
    pub requires_gateway: Option<bool>,
    pub manual_verification: Option<bool>,
    pub is_active: Option<bool>,
}

impl From<UpdatePaymentMethodBody> for PaymentMethodChanges {
    fn from(body: UpdatePaymentMethodBody) -> Self {
        Self {
            name: body.name,
            description: body.description,
            requires_gateway: body.requires_gateway,
            manual_verification: body.manual_verification,
            is_active: body.is_active,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct TransactionQuery {
    pub quote_id: Option<Uuid>,
    pub status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct GatewayQuery {
    pub gateway_type: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TransactionResponse {
    pub id: Uuid,
    pub transaction_id: String,
    pub quote_id: Uuid,
    pub payment_method_id: Uuid,
    pub payment_gateway_id: Option<Uuid>,
    pub external_id: Option<String>,
    pub amount: Decimal,
    pub currency: String,
    pub status: TransactionStatus,
    pub payment_details: JsonMap,
    pub expires_at: Option<DateTime<Utc>>,
    pub processed_at: Option<DateTime<Utc>>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<PaymentTransaction> for TransactionResponse {
    fn from(tx: PaymentTransaction) -> Self {
        Self {
            id: *tx.id.as_uuid(),
            transaction_id: tx.transaction_id,
            quote_id: *tx.quote_id.as_uuid(),
            payment_method_id: *tx.payment_method_id.as_uuid(),
            payment_gateway_id: tx.payment_gateway_id.map(|id| *id.as_uuid()),
            external_id: tx.external_id,
            amount: tx.amount.amount(),
            currency: tx.amount.currency().code().to_string(),
            status: tx.status,
            payment_details: tx.payment_details,
            expires_at: tx.expires_at,
            processed_at: tx.processed_at,
            confirmed_at: tx.confirmed_at,
            created_at: tx.created_at,
            updated_at: tx.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PaymentMethodResponse {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub requires_gateway: bool,
    pub manual_verification: bool,
    pub is_active: bool,
}

impl From<PaymentMethod> for PaymentMethodResponse {
    fn from(method: PaymentMethod) -> Self {
        Self {
            id: *method.id.as_uuid(),
            name: method.name,
            description: method.description,
            requires_gateway: method.requires_gateway,
            manual_verification: method.manual_verification,
            is_active: method.is_active,
        }
    }
}

/// Webhook acknowledgement; always carries a `status`
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum WebhookAck {
    Handled(domain_payments::WebhookOutcome),
    Unknown { status: &'static str },
}

impl WebhookAck {
    pub fn unknown_transaction() -> Self {
        WebhookAck::Unknown {
            status: "unknown_transaction",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_create_link_body_validation() {
        let body: CreateLinkBody = serde_json::from_value(json!({
            "quote_id": Uuid::new_v4(),
            "gateway_type": "mercadopago",
            "payer_email": "not-an-email",
        }))
        .unwrap();
        let errors = body.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("payer_email"));
    }

    #[test]
    fn test_reject_body_requires_reason() {
        let body = RejectManualBody {
            transaction_id: "BANK_1".to_string(),
            reason: String::new(),
        };
        assert!(body.validate().is_err());
    }

    #[test]
    fn test_unknown_transaction_ack() {
        let value = serde_json::to_value(WebhookAck::unknown_transaction()).unwrap();
        assert_eq!(value, json!({"status": "unknown_transaction"}));
    }
}
