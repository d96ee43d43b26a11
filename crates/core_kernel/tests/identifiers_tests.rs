//! Unit tests for the typed identifiers

use core_kernel::{PaymentGatewayId, PaymentMethodId, PaymentTransactionId, QuoteId};
use uuid::Uuid;

mod creation {
    use super::*;

    #[test]
    fn test_new_generates_unique_ids() {
        let id1 = QuoteId::new();
        let id2 = QuoteId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_new_v7_generates_time_ordered_ids() {
        let id1 = PaymentTransactionId::new_v7();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let id2 = PaymentTransactionId::new_v7();
        assert!(id1 < id2);
    }

    #[test]
    fn test_from_uuid() {
        let uuid = Uuid::new_v4();
        let id = PaymentGatewayId::from_uuid(uuid);
        assert_eq!(*id.as_uuid(), uuid);
    }
}

mod formatting {
    use super::*;

    #[test]
    fn test_prefixes() {
        assert_eq!(QuoteId::prefix(), "QUO");
        assert_eq!(PaymentMethodId::prefix(), "PMT");
        assert_eq!(PaymentGatewayId::prefix(), "GTW");
        assert_eq!(PaymentTransactionId::prefix(), "PTX");
    }

    #[test]
    fn test_display_format() {
        let id = PaymentMethodId::new();
        assert!(id.to_string().starts_with("PMT-"));
    }

    #[test]
    fn test_serializes_as_bare_uuid() {
        let uuid = Uuid::new_v4();
        let id = QuoteId::from_uuid(uuid);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", uuid));
    }
}

mod parsing {
    use super::*;

    #[test]
    fn test_from_str_with_prefix() {
        let original = QuoteId::new();
        let parsed: QuoteId = original.to_string().parse().unwrap();
        assert_eq!(original, parsed);
    }

    #[test]
    fn test_from_str_without_prefix() {
        let uuid = Uuid::new_v4();
        let parsed: PaymentGatewayId = uuid.to_string().parse().unwrap();
        assert_eq!(*parsed.as_uuid(), uuid);
    }

    #[test]
    fn test_from_str_rejects_garbage() {
        assert!("QUO-not-a-uuid".parse::<QuoteId>().is_err());
        assert!("".parse::<PaymentMethodId>().is_err());
    }

    #[test]
    fn test_foreign_prefix_is_rejected() {
        let gateway = PaymentGatewayId::new();
        assert!(gateway.to_string().parse::<QuoteId>().is_err());
    }
}
