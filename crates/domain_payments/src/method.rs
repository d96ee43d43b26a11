//! Payment method catalog

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::PaymentMethodId;

use crate::error::PaymentError;

const MAX_NAME_LEN: usize = 100;

/// A category of payment offered to residents (cash, transfer, card, wallet)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentMethod {
    pub id: PaymentMethodId,
    /// Unique display name
    pub name: String,
    pub description: String,
    /// Payment goes through a gateway record
    pub requires_gateway: bool,
    /// An administrator must confirm the payment
    pub manual_verification: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentMethod {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        requires_gateway: bool,
        manual_verification: bool,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: PaymentMethodId::new_v7(),
            name: name.into(),
            description: description.into(),
            requires_gateway,
            manual_verification,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Trims the name and checks it fits the catalog column
    pub fn normalized_name(name: &str) -> Result<String, PaymentError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(PaymentError::validation("Payment method name is required"));
        }
        if name.chars().count() > MAX_NAME_LEN {
            return Err(PaymentError::validation(format!(
                "Payment method name exceeds {} characters",
                MAX_NAME_LEN
            )));
        }
        Ok(name.to_string())
    }

    /// Applies an administrator edit
    pub fn apply(&mut self, changes: PaymentMethodChanges, at: DateTime<Utc>) -> Result<(), PaymentError> {
        if let Some(name) = changes.name {
            self.name = Self::normalized_name(&name)?;
        }
        if let Some(description) = changes.description {
            self.description = description;
        }
        if let Some(requires_gateway) = changes.requires_gateway {
            self.requires_gateway = requires_gateway;
        }
        if let Some(manual_verification) = changes.manual_verification {
            self.manual_verification = manual_verification;
        }
        if let Some(is_active) = changes.is_active {
            self.is_active = is_active;
        }
        self.updated_at = at;
        Ok(())
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    /// Usable for a hosted checkout link (card, digital wallet)
    pub fn supports_checkout(&self) -> bool {
        self.is_active && self.requires_gateway && !self.manual_verification
    }

    /// Usable for a manually registered payment (cash, bank transfer)
    pub fn supports_manual_registration(&self) -> bool {
        self.is_active && self.manual_verification
    }
}

/// Partial edit of a payment method; `None` keeps the stored value
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaymentMethodChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub requires_gateway: Option<bool>,
    pub manual_verification: Option<bool>,
    pub is_active: Option<bool>,
}

impl PaymentMethodChanges {
    /// True when the edit switches an active method off
    pub fn deactivates(&self, method: &PaymentMethod) -> bool {
        method.is_active && self.is_active == Some(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_card_supports_checkout_only() {
        let card = PaymentMethod::new("Tarjeta", "Card payments", true, false);
        assert!(card.supports_checkout());
        assert!(!card.supports_manual_registration());
    }

    #[test]
    fn test_cash_supports_manual_only() {
        let cash = PaymentMethod::new("Efectivo", "Cash at the office", false, true);
        assert!(!cash.supports_checkout());
        assert!(cash.supports_manual_registration());
    }

    #[test]
    fn test_bank_transfer_needs_gateway_and_verification() {
        let transfer = PaymentMethod::new("Transferencia", "Bank transfer", true, true);
        assert!(!transfer.supports_checkout());
        assert!(transfer.supports_manual_registration());
    }

    #[test]
    fn test_inactive_method_supports_nothing() {
        let card = PaymentMethod::new("Tarjeta", "Card payments", true, false).inactive();
        assert!(!card.supports_checkout());
        assert!(!card.supports_manual_registration());
    }

    #[test]
    fn test_apply_changes_only_given_fields() {
        let mut cash = PaymentMethod::new("Efectivo", "Cash at the office", false, true);
        let created = cash.updated_at;
        let at = created + chrono::Duration::minutes(5);

        cash.apply(
            PaymentMethodChanges {
                name: Some("  Efectivo en conserjería ".to_string()),
                description: Some("Pago en conserjería".to_string()),
                ..Default::default()
            },
            at,
        )
        .unwrap();

        assert_eq!(cash.name, "Efectivo en conserjería");
        assert_eq!(cash.description, "Pago en conserjería");
        assert!(cash.manual_verification);
        assert!(cash.is_active);
        assert_eq!(cash.updated_at, at);
    }

    #[test]
    fn test_blank_name_is_refused() {
        let mut cash = PaymentMethod::new("Efectivo", "Cash at the office", false, true);
        let err = cash
            .apply(
                PaymentMethodChanges {
                    name: Some("   ".to_string()),
                    ..Default::default()
                },
                Utc::now(),
            )
            .unwrap_err();
        assert!(matches!(err, PaymentError::Validation(_)));
        assert_eq!(cash.name, "Efectivo");
        assert!(PaymentMethod::normalized_name(&"x".repeat(101)).is_err());
    }

    #[test]
    fn test_deactivates_only_active_methods() {
        let off = PaymentMethodChanges {
            is_active: Some(false),
            ..Default::default()
        };
        let cash = PaymentMethod::new("Efectivo", "Cash", false, true);
        assert!(off.deactivates(&cash));
        assert!(!off.deactivates(&cash.clone().inactive()));
        assert!(!PaymentMethodChanges::default().deactivates(&cash));
    }
}
