//! Dimension-wise account balances
//!
//! A [`DimensionBalances`] maps each dimension key to the balances of the
//! accounts seen under it. Workers produce one per processing unit; the poster
//! merges them into the run summary.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use core_kernel::CurrencyCode;

use crate::dimension::{DimensionKey, DimensionSet, DimensionSource, DimensionValues};
use crate::error::ClosingError;

/// Summed debits and credits of one account under one dimension key
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountBalance {
    pub debit: Decimal,
    pub credit: Decimal,
    pub debit_in_account_currency: Decimal,
    pub credit_in_account_currency: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_currency: Option<CurrencyCode>,
}

impl AccountBalance {
    /// Adds another balance into this one
    ///
    /// The first known account currency wins.
    pub fn add(&mut self, other: &AccountBalance) {
        self.debit += other.debit;
        self.credit += other.credit;
        self.debit_in_account_currency += other.debit_in_account_currency;
        self.credit_in_account_currency += other.credit_in_account_currency;
        if self.account_currency.is_none() {
            self.account_currency = other.account_currency.clone();
        }
    }

    /// Debit minus credit in company currency
    pub fn balance_in_company_currency(&self) -> Decimal {
        self.debit - self.credit
    }

    /// Debit minus credit in account currency
    pub fn balance_in_account_currency(&self) -> Decimal {
        self.debit_in_account_currency - self.credit_in_account_currency
    }
}

/// One row of grouped ledger sums: an account under one dimension combination
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceRow {
    pub account: String,
    #[serde(default)]
    pub dimensions: DimensionValues,
    pub debit: Decimal,
    pub credit: Decimal,
    pub debit_in_account_currency: Decimal,
    pub credit_in_account_currency: Decimal,
    #[serde(default)]
    pub account_currency: Option<CurrencyCode>,
}

impl BalanceRow {
    fn balance(&self) -> AccountBalance {
        AccountBalance {
            debit: self.debit,
            credit: self.credit,
            debit_in_account_currency: self.debit_in_account_currency,
            credit_in_account_currency: self.credit_in_account_currency,
            account_currency: self.account_currency.clone(),
        }
    }
}

impl DimensionSource for BalanceRow {
    fn dimension_value(&self, dimension: &str) -> Option<&str> {
        self.dimensions.dimension_value(dimension)
    }
}

/// Net balances summed across every account under a dimension key
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DimensionTotals {
    pub balance_in_account_currency: Decimal,
    pub balance_in_company_currency: Decimal,
}

/// Account balances grouped by dimension key
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DimensionBalances(BTreeMap<DimensionKey, BTreeMap<String, AccountBalance>>);

impl DimensionBalances {
    pub fn new() -> Self {
        Self::default()
    }

    /// Groups ledger rows by dimension key and account
    ///
    /// Rows that share a key and an account are summed.
    pub fn fold_rows(rows: &[BalanceRow], dimensions: &DimensionSet) -> Self {
        let mut balances = Self::new();
        for row in rows {
            balances.add(dimensions.key_for(row), &row.account, &row.balance());
        }
        balances
    }

    /// Adds a balance for an account under a key
    pub fn add(&mut self, key: DimensionKey, account: &str, balance: &AccountBalance) {
        self.0
            .entry(key)
            .or_default()
            .entry(account.to_string())
            .or_default()
            .add(balance);
    }

    /// Merges another set of balances into this one, summing shared entries
    pub fn merge(&mut self, other: &DimensionBalances) {
        for (key, accounts) in &other.0 {
            for (account, balance) in accounts {
                self.add(key.clone(), account, balance);
            }
        }
    }

    /// Balances of every account under a key
    pub fn accounts(&self, key: &DimensionKey) -> Option<&BTreeMap<String, AccountBalance>> {
        self.0.get(key)
    }

    /// Iterates keys with their account balances in key order
    pub fn iter(&self) -> impl Iterator<Item = (&DimensionKey, &BTreeMap<String, AccountBalance>)> {
        self.0.iter()
    }

    /// Sums the net balances of every account under a key
    pub fn totals(&self, key: &DimensionKey) -> DimensionTotals {
        self.0
            .get(key)
            .map(|accounts| {
                accounts.values().fold(DimensionTotals::default(), |mut acc, b| {
                    acc.balance_in_account_currency += b.balance_in_account_currency();
                    acc.balance_in_company_currency += b.balance_in_company_currency();
                    acc
                })
            })
            .unwrap_or_default()
    }

    /// Number of distinct dimension keys
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of (key, account) pairs
    pub fn entry_count(&self) -> usize {
        self.0.values().map(BTreeMap::len).sum()
    }

    /// Checks every key has one component per dimension
    pub fn validate(&self, dimensions: &DimensionSet) -> Result<(), ClosingError> {
        for key in self.0.keys() {
            dimensions.check_arity(key)?;
        }
        Ok(())
    }

    /// Serializes to the persisted JSON form
    pub fn to_json(&self) -> Result<serde_json::Value, ClosingError> {
        Ok(serde_json::to_value(self)?)
    }

    /// Parses the persisted JSON form and validates key arity
    pub fn from_json(value: serde_json::Value, dimensions: &DimensionSet) -> Result<Self, ClosingError> {
        let balances: DimensionBalances = serde_json::from_value(value)?;
        balances.validate(dimensions)?;
        Ok(balances)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn row(account: &str, cost_center: &str, debit: Decimal, credit: Decimal) -> BalanceRow {
        let mut dimensions = DimensionValues::new();
        dimensions.insert("cost_center".to_string(), cost_center.to_string());
        BalanceRow {
            account: account.to_string(),
            dimensions,
            debit,
            credit,
            debit_in_account_currency: debit,
            credit_in_account_currency: credit,
            account_currency: Some(CurrencyCode::new("USD").unwrap()),
        }
    }

    #[test]
    fn test_fold_rows_sums_same_key_and_account() {
        let dims = DimensionSet::standard();
        let rows = vec![
            row("Sales", "Main", dec!(0), dec!(100)),
            row("Sales", "Main", dec!(0), dec!(50)),
            row("Sales", "Branch", dec!(0), dec!(20)),
        ];
        let balances = DimensionBalances::fold_rows(&rows, &dims);

        assert_eq!(balances.len(), 2);
        let main = dims.key_for(&rows[0]);
        let sales = &balances.accounts(&main).unwrap()["Sales"];
        assert_eq!(sales.credit, dec!(150));
        assert_eq!(sales.balance_in_company_currency(), dec!(-150));
    }

    #[test]
    fn test_merge_and_totals() {
        let dims = DimensionSet::standard();
        let mut first =
            DimensionBalances::fold_rows(&[row("Sales", "Main", dec!(0), dec!(100))], &dims);
        let second = DimensionBalances::fold_rows(
            &[
                row("Sales", "Main", dec!(0), dec!(40)),
                row("Rent", "Main", dec!(30), dec!(0)),
            ],
            &dims,
        );
        first.merge(&second);

        let key = dims.key_for(&second_row_dims());
        assert_eq!(first.entry_count(), 2);
        assert_eq!(first.totals(&key).balance_in_company_currency, dec!(-110));
    }

    fn second_row_dims() -> DimensionValues {
        let mut values = DimensionValues::new();
        values.insert("cost_center".to_string(), "Main".to_string());
        values
    }

    #[test]
    fn test_json_uses_encoded_keys() {
        let dims = DimensionSet::standard();
        let balances =
            DimensionBalances::fold_rows(&[row("Sales", "Main", dec!(0), dec!(10))], &dims);
        let json = balances.to_json().unwrap();

        assert!(json.get("Main,,").is_some());
        let back = DimensionBalances::from_json(json, &dims).unwrap();
        assert_eq!(back, balances);
    }

    #[test]
    fn test_from_json_rejects_wrong_arity() {
        let dims = DimensionSet::with_custom(["region"]).unwrap();
        let json = serde_json::json!({ "Main,,": { "Sales": {
            "debit": "0", "credit": "10",
            "debit_in_account_currency": "0", "credit_in_account_currency": "10"
        }}});
        assert!(matches!(
            DimensionBalances::from_json(json, &dims),
            Err(ClosingError::InvalidDimensionKey { .. })
        ));
    }
}
