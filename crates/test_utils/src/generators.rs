//! Property-Based Test Generators
//!
//! Proptest strategies for ledger data that respects the closing engine's
//! input invariants: dimension values never contain the key delimiter and
//! amounts stay within ledger precision.

use chrono::NaiveDate;
use domain_closing::dimension::{KEY_DELIMITER, STANDARD_DIMENSIONS};
use domain_closing::{BalanceRow, DimensionValues, GlEntry};
use proptest::prelude::*;
use rust_decimal::Decimal;

use crate::fixtures::{LedgerFixtures, PeriodFixtures};

/// Strategy for a single dimension value, without the key delimiter
pub fn dimension_value_strategy() -> impl Strategy<Value = String> {
    "[A-Za-z0-9_-]{1,12}"
}

/// Strategy for values of the standard dimensions, any subset present
pub fn dimension_values_strategy() -> impl Strategy<Value = DimensionValues> {
    proptest::collection::vec(proptest::option::of(dimension_value_strategy()), STANDARD_DIMENSIONS.len())
        .prop_map(|values| {
            STANDARD_DIMENSIONS
                .iter()
                .zip(values)
                .filter_map(|(name, value)| value.map(|v| (name.to_string(), v)))
                .collect()
        })
}

/// Strategy for non-negative amounts with two decimal places
pub fn amount_strategy() -> impl Strategy<Value = Decimal> {
    (0i64..10_000_000i64).prop_map(|minor| Decimal::new(minor, 2))
}

/// Strategy for dates in January 2024
pub fn january_date_strategy() -> impl Strategy<Value = NaiveDate> {
    (1u32..=31u32).prop_map(|day| PeriodFixtures::date(2024, 1, day))
}

/// Strategy for a one-sided ledger entry on one of the fixture P&L accounts
pub fn pl_entry_strategy() -> impl Strategy<Value = GlEntry> {
    (
        january_date_strategy(),
        prop_oneof![Just(LedgerFixtures::sales()), Just(LedgerFixtures::rent())],
        amount_strategy(),
        any::<bool>(),
        dimension_values_strategy(),
    )
        .prop_map(|(date, account, amount, is_debit, dimensions)| {
            let (debit, credit) = if is_debit {
                (amount, Decimal::ZERO)
            } else {
                (Decimal::ZERO, amount)
            };
            let mut entry = GlEntry::new(LedgerFixtures::company(), date, account, debit, credit);
            entry.dimensions = dimensions;
            entry
        })
}

/// Strategy for a grouped balance row with standard dimensions
pub fn balance_row_strategy() -> impl Strategy<Value = BalanceRow> {
    (
        prop_oneof![Just(LedgerFixtures::sales()), Just(LedgerFixtures::rent())],
        dimension_values_strategy(),
        amount_strategy(),
        amount_strategy(),
    )
        .prop_map(|(account, dimensions, debit, credit)| BalanceRow {
            account: account.to_string(),
            dimensions,
            debit,
            credit,
            debit_in_account_currency: debit,
            credit_in_account_currency: credit,
            account_currency: Some(LedgerFixtures::usd()),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn test_dimension_values_use_standard_names(values in dimension_values_strategy()) {
            for (name, value) in &values {
                prop_assert!(STANDARD_DIMENSIONS.contains(&name.as_str()));
                prop_assert!(!value.contains(KEY_DELIMITER));
            }
        }

        #[test]
        fn test_pl_entries_are_one_sided(entry in pl_entry_strategy()) {
            prop_assert!(entry.debit.is_zero() || entry.credit.is_zero());
        }
    }
}
