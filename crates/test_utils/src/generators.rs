//! Property-Based Test Generators
//!
//! Provides proptest strategies for generating random test data
//! that maintains domain invariants.

use chrono::{Duration, NaiveDate};
use core_kernel::{Currency, Money, QuoteId};
use domain_payments::{GatewayType, NotificationOutcome, TransactionStatus};
use proptest::prelude::*;
use rust_decimal::Decimal;

/// Strategy for generating supported Currency values
pub fn currency_strategy() -> impl Strategy<Value = Currency> {
    prop_oneof![
        Just(Currency::CLP),
        Just(Currency::ARS),
        Just(Currency::MXN),
        Just(Currency::BRL),
        Just(Currency::COP),
        Just(Currency::PEN),
        Just(Currency::UYU),
        Just(Currency::USD),
        Just(Currency::EUR),
    ]
}

/// Strategy for generating valid positive amounts in minor units
pub fn positive_amount_minor_strategy() -> impl Strategy<Value = i64> {
    1i64..1_000_000_000i64
}

/// Strategy for generating positive Money values in any currency
pub fn positive_money_strategy() -> impl Strategy<Value = Money> {
    (positive_amount_minor_strategy(), currency_strategy())
        .prop_map(|(amount, currency)| Money::from_minor(amount, currency))
}

/// Strategy for monthly fees in Chilean pesos
pub fn clp_fee_strategy() -> impl Strategy<Value = Money> {
    (1_000i64..500_000i64).prop_map(|amount| Money::from_minor(amount, Currency::CLP))
}

/// Strategy for reported amounts that differ from `expected`
pub fn mismatched_amount_strategy(expected: Money) -> impl Strategy<Value = Decimal> {
    (1i64..10_000i64, any::<bool>()).prop_map(move |(delta, above)| {
        let delta = Decimal::new(delta, expected.currency().decimal_places());
        if above {
            expected.amount() + delta
        } else {
            expected.amount() - delta
        }
    })
}

pub fn transaction_status_strategy() -> impl Strategy<Value = TransactionStatus> {
    prop_oneof![
        Just(TransactionStatus::Pending),
        Just(TransactionStatus::Approved),
        Just(TransactionStatus::Rejected),
    ]
}

pub fn gateway_type_strategy() -> impl Strategy<Value = GatewayType> {
    prop::sample::select(GatewayType::ALL.to_vec())
}

/// Strategy for provider verdicts, including codes nobody acts on
pub fn notification_outcome_strategy() -> impl Strategy<Value = NotificationOutcome> {
    prop_oneof![
        Just(NotificationOutcome::Approved),
        "[a-z_]{3,20}".prop_map(|reason| NotificationOutcome::Rejected { reason }),
        Just(NotificationOutcome::Pending),
        "[a-z_]{3,12}".prop_map(NotificationOutcome::Unknown),
        Just(NotificationOutcome::Ignored),
    ]
}

/// Strategy for house codes such as `B-204`
pub fn house_code_strategy() -> impl Strategy<Value = String> {
    "[A-F]-[1-9][0-9]{2}"
}

/// Strategy for due dates within 2026
pub fn due_date_strategy() -> impl Strategy<Value = NaiveDate> {
    (0i64..365i64).prop_map(|days| {
        NaiveDate::from_ymd_opt(2026, 1, 1).unwrap() + Duration::days(days)
    })
}

/// Strategy for generating QuoteId
pub fn quote_id_strategy() -> impl Strategy<Value = QuoteId> {
    any::<[u8; 16]>().prop_map(|bytes| QuoteId::from_uuid(uuid::Uuid::from_bytes(bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn generated_fees_are_positive_whole_pesos(fee in clp_fee_strategy()) {
            prop_assert!(fee.is_positive());
            prop_assert_eq!(fee.amount().scale(), 0);
        }

        #[test]
        fn mismatched_amounts_never_equal_expected(
            (expected, reported) in positive_money_strategy()
                .prop_flat_map(|m| (Just(m), mismatched_amount_strategy(m)))
        ) {
            prop_assert_ne!(reported, expected.amount());
        }

        #[test]
        fn house_codes_match_format(code in house_code_strategy()) {
            prop_assert_eq!(code.len(), 5);
            prop_assert!(code.chars().nth(1) == Some('-'));
        }
    }
}
