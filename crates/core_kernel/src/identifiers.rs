//! Typed identifiers for payment entities
//!
//! Each entity gets its own UUID newtype so a quote id can never be passed
//! where a gateway id is expected. Display form carries a short prefix
//! (`PTX-0190...`); parsing accepts the value with or without it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! define_id {
    ($name:ident, $prefix:literal) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Random (v4) identifier
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Time-ordered (v7) identifier, used for ledger rows
            pub fn new_v7() -> Self {
                Self(Uuid::now_v7())
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }

            pub fn prefix() -> &'static str {
                $prefix
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}-{}", $prefix, self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let raw = s.strip_prefix(concat!($prefix, "-")).unwrap_or(s);
                Uuid::parse_str(raw).map(Self)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Uuid {
                id.0
            }
        }
    };
}

// Billing collaborator
define_id!(QuoteId, "QUO");

// Payment catalog
define_id!(PaymentMethodId, "PMT");
define_id!(PaymentGatewayId, "GTW");

// Payment ledger
define_id!(PaymentTransactionId, "PTX");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_id_display() {
        let id = QuoteId::new();
        let display = id.to_string();
        assert!(display.starts_with("QUO-"));
    }

    #[test]
    fn test_id_parsing() {
        let original = PaymentTransactionId::new_v7();
        let parsed: PaymentTransactionId = original.to_string().parse().unwrap();
        assert_eq!(original, parsed);
    }

    #[test]
    fn test_parse_without_prefix() {
        let uuid = Uuid::new_v4();
        let parsed: PaymentMethodId = uuid.to_string().parse().unwrap();
        assert_eq!(*parsed.as_uuid(), uuid);
    }

    #[test]
    fn test_uuid_conversion() {
        let uuid = Uuid::new_v4();
        let gateway_id = PaymentGatewayId::from(uuid);
        let back: Uuid = gateway_id.into();
        assert_eq!(uuid, back);
    }
}
