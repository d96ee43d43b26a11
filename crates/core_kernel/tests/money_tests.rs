//! Unit tests for the Money module
//!
//! Focus is on the properties payments rely on: per-currency precision,
//! minor-unit conversion for card processors, and exact amount matching.

use core_kernel::{Currency, Money, MoneyError};
use rust_decimal_macros::dec;

mod creation {
    use super::*;

    #[test]
    fn test_new_rounds_to_currency_precision() {
        let usd = Money::new(dec!(100.126), Currency::USD);
        assert_eq!(usd.amount(), dec!(100.13));

        let clp = Money::new(dec!(45000.4), Currency::CLP);
        assert_eq!(clp.amount(), dec!(45000));
    }

    #[test]
    fn test_from_minor_converts_cents_correctly() {
        let m = Money::from_minor(10050, Currency::USD);
        assert_eq!(m.amount(), dec!(100.50));
    }

    #[test]
    fn test_from_minor_for_zero_decimal_currency() {
        let m = Money::from_minor(45000, Currency::CLP);
        assert_eq!(m.amount(), dec!(45000));
    }

    #[test]
    fn test_zero() {
        let m = Money::zero(Currency::ARS);
        assert!(m.is_zero());
        assert!(!m.is_positive());
        assert!(!m.is_negative());
    }
}

mod minor_units {
    use super::*;

    #[test]
    fn test_to_minor_for_two_decimal_currency() {
        assert_eq!(Money::new(dec!(1500.00), Currency::MXN).to_minor(), Ok(150000));
    }

    #[test]
    fn test_to_minor_for_clp_is_identity() {
        assert_eq!(Money::new(dec!(45000), Currency::CLP).to_minor(), Ok(45000));
    }

    #[test]
    fn test_to_minor_overflow() {
        let huge = Money::new(rust_decimal::Decimal::MAX, Currency::USD);
        assert_eq!(huge.to_minor(), Err(MoneyError::Overflow));
    }
}

mod arithmetic {
    use super::*;

    #[test]
    fn test_checked_add_same_currency() {
        let a = Money::new(dec!(10.00), Currency::USD);
        let b = Money::new(dec!(5.25), Currency::USD);
        assert_eq!(a.checked_add(&b).unwrap().amount(), dec!(15.25));
    }

    #[test]
    fn test_checked_sub_can_go_negative() {
        let a = Money::new(dec!(10), Currency::CLP);
        let b = Money::new(dec!(25), Currency::CLP);
        let diff = a.checked_sub(&b).unwrap();
        assert!(diff.is_negative());
    }

    #[test]
    fn test_checked_add_currency_mismatch() {
        let a = Money::new(dec!(10), Currency::CLP);
        let b = Money::new(dec!(10), Currency::USD);
        assert_eq!(
            a.checked_add(&b),
            Err(MoneyError::CurrencyMismatch("CLP".to_string(), "USD".to_string()))
        );
    }
}

mod matching {
    use super::*;

    #[test]
    fn test_matches_ignores_trailing_zeros() {
        let quoted = Money::new(dec!(45000), Currency::CLP);
        let reported = Money::new(dec!(45000.00), Currency::CLP);
        assert!(quoted.matches(&reported));
    }

    #[test]
    fn test_matches_detects_amount_difference() {
        let quoted = Money::new(dec!(45000), Currency::CLP);
        let reported = Money::new(dec!(44999), Currency::CLP);
        assert!(!quoted.matches(&reported));
    }

    #[test]
    fn test_matches_requires_same_currency() {
        let a = Money::new(dec!(100), Currency::USD);
        let b = Money::new(dec!(100), Currency::EUR);
        assert!(!a.matches(&b));
    }
}

mod currency {
    use super::*;

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("ars".parse::<Currency>(), Ok(Currency::ARS));
        assert_eq!(" USD ".parse::<Currency>(), Ok(Currency::USD));
    }

    #[test]
    fn test_parse_unknown() {
        assert_eq!(
            "JPY".parse::<Currency>(),
            Err(MoneyError::UnsupportedCurrency("JPY".to_string()))
        );
    }

    #[test]
    fn test_serde_uses_uppercase_code() {
        let json = serde_json::to_string(&Currency::CLP).unwrap();
        assert_eq!(json, "\"CLP\"");
        let back: Currency = serde_json::from_str("\"BRL\"").unwrap();
        assert_eq!(back, Currency::BRL);
    }

    #[test]
    fn test_display_money() {
        assert_eq!(Money::new(dec!(45000), Currency::CLP).to_string(), "CLP$ 45000");
    }
}
