//! Amount normalization and currency codes
//!
//! Ledger amounts are carried as `rust_decimal::Decimal`. Before two balances
//! are compared or an amount is posted it is normalized to a fixed number of
//! decimal places, so that residues left by summing many rows never produce a
//! spurious non-zero balance.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Default number of decimal places used for posting amounts
pub const DEFAULT_PRECISION: u32 = 2;

/// Errors that can occur while handling amounts
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AmountError {
    #[error("Invalid currency code: {0}")]
    InvalidCurrency(String),

    #[error("Invalid precision: {0}")]
    InvalidPrecision(u32),
}

/// Fixed-point precision applied to ledger amounts
///
/// Rounds half away from zero, which matches how the ledger rounds amounts
/// when they are posted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Precision(u32);

impl Precision {
    /// Largest scale `rust_decimal` can represent
    pub const MAX: u32 = 28;

    /// Creates a precision, rejecting scales beyond what Decimal supports
    pub fn new(decimal_places: u32) -> Result<Self, AmountError> {
        if decimal_places > Self::MAX {
            return Err(AmountError::InvalidPrecision(decimal_places));
        }
        Ok(Self(decimal_places))
    }

    /// Returns the number of decimal places
    pub fn decimal_places(&self) -> u32 {
        self.0
    }

    /// Rounds an amount to this precision
    pub fn normalize(&self, amount: Decimal) -> Decimal {
        amount
            .round_dp_with_strategy(self.0, RoundingStrategy::MidpointAwayFromZero)
            .normalize()
    }

    /// Returns true if the amount rounds to zero at this precision
    pub fn is_zero(&self, amount: Decimal) -> bool {
        self.normalize(amount).is_zero()
    }

    /// Splits a signed balance into a `(debit, credit)` pair
    ///
    /// A positive balance is a debit, a negative one a credit. The returned
    /// amounts are normalized and never negative.
    pub fn split_balance(&self, balance: Decimal) -> (Decimal, Decimal) {
        let balance = self.normalize(balance);
        if balance.is_sign_positive() && !balance.is_zero() {
            (balance, Decimal::ZERO)
        } else if balance.is_sign_negative() && !balance.is_zero() {
            (Decimal::ZERO, balance.abs())
        } else {
            (Decimal::ZERO, Decimal::ZERO)
        }
    }
}

impl Default for Precision {
    fn default() -> Self {
        Self(DEFAULT_PRECISION)
    }
}

/// An ISO 4217 style currency code carried by accounts
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CurrencyCode(String);

impl CurrencyCode {
    /// Creates a currency code from three ASCII letters (case-insensitive)
    pub fn new(code: impl AsRef<str>) -> Result<Self, AmountError> {
        let code = code.as_ref().trim();
        if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(AmountError::InvalidCurrency(code.to_string()));
        }
        Ok(Self(code.to_ascii_uppercase()))
    }

    /// Returns the code
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for CurrencyCode {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for CurrencyCode {
    type Error = AmountError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<CurrencyCode> for String {
    fn from(code: CurrencyCode) -> String {
        code.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_normalize_rounds_half_away_from_zero() {
        let precision = Precision::default();
        assert_eq!(precision.normalize(dec!(10.005)), dec!(10.01));
        assert_eq!(precision.normalize(dec!(-10.005)), dec!(-10.01));
    }

    #[test]
    fn test_residue_is_zero() {
        let precision = Precision::default();
        assert!(precision.is_zero(dec!(0.0000001)));
        assert!(!precision.is_zero(dec!(0.01)));
    }

    #[test]
    fn test_split_balance() {
        let precision = Precision::default();
        assert_eq!(precision.split_balance(dec!(150)), (dec!(150), dec!(0)));
        assert_eq!(precision.split_balance(dec!(-75.5)), (dec!(0), dec!(75.5)));
        assert_eq!(precision.split_balance(dec!(0.001)), (dec!(0), dec!(0)));
    }

    #[test]
    fn test_currency_code_is_uppercased() {
        let code = CurrencyCode::new("usd").unwrap();
        assert_eq!(code.as_str(), "USD");
        assert!(CurrencyCode::new("US").is_err());
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn split_balance_reconstructs_normalized_amount(
            minor in -1_000_000_000i64..1_000_000_000i64,
            scale in 0u32..6u32
        ) {
            let precision = Precision::default();
            let amount = Decimal::new(minor, scale);
            let (debit, credit) = precision.split_balance(amount);

            prop_assert!(debit >= Decimal::ZERO);
            prop_assert!(credit >= Decimal::ZERO);
            prop_assert!(debit.is_zero() || credit.is_zero());
            prop_assert_eq!(debit - credit, precision.normalize(amount));
        }
    }
}
