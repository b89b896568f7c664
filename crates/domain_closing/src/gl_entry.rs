//! General ledger entries produced by the closing job

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use core_kernel::{CurrencyCode, GlEntryId, Precision};

use crate::balance::AccountBalance;
use crate::dimension::DimensionValues;
use crate::run::PeriodClosingVoucher;

/// Voucher type stamped on every closing entry
pub const PERIOD_CLOSING_VOUCHER_TYPE: &str = "Period Closing Voucher";

/// A general ledger entry
///
/// The closing job reads entries of this shape from the ledger and writes new
/// ones for the reversing and closing-account postings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlEntry {
    pub id: GlEntryId,
    pub company: String,
    pub posting_date: NaiveDate,
    pub account: String,
    pub account_currency: Option<CurrencyCode>,
    pub debit: Decimal,
    pub credit: Decimal,
    pub debit_in_account_currency: Decimal,
    pub credit_in_account_currency: Decimal,
    /// Accounting dimension values, by dimension name
    #[serde(default)]
    pub dimensions: DimensionValues,
    pub voucher_type: String,
    pub voucher_no: String,
    pub fiscal_year: Option<String>,
    pub remarks: Option<String>,
    pub is_opening: bool,
    pub is_period_closing_voucher_entry: bool,
    pub is_cancelled: bool,
}

impl GlEntry {
    /// Creates an ordinary ledger posting with equal account and company amounts
    pub fn new(
        company: impl Into<String>,
        posting_date: NaiveDate,
        account: impl Into<String>,
        debit: Decimal,
        credit: Decimal,
    ) -> Self {
        Self {
            id: GlEntryId::new_v7(),
            company: company.into(),
            posting_date,
            account: account.into(),
            account_currency: None,
            debit,
            credit,
            debit_in_account_currency: debit,
            credit_in_account_currency: credit,
            dimensions: DimensionValues::new(),
            voucher_type: "Journal Entry".to_string(),
            voucher_no: String::new(),
            fiscal_year: None,
            remarks: None,
            is_opening: false,
            is_period_closing_voucher_entry: false,
            is_cancelled: false,
        }
    }

    /// Sets a dimension value
    pub fn with_dimension(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.dimensions.insert(name.into(), value.into());
        self
    }

    /// Sets the account currency
    pub fn with_account_currency(mut self, currency: CurrencyCode) -> Self {
        self.account_currency = Some(currency);
        self
    }

    /// Sets the account currency amounts independently of company amounts
    pub fn with_account_amounts(mut self, debit: Decimal, credit: Decimal) -> Self {
        self.debit_in_account_currency = debit;
        self.credit_in_account_currency = credit;
        self
    }

    /// Sets the originating voucher
    pub fn with_voucher(mut self, voucher_type: impl Into<String>, voucher_no: impl Into<String>) -> Self {
        self.voucher_type = voucher_type.into();
        self.voucher_no = voucher_no.into();
        self
    }

    /// Marks the entry cancelled
    pub fn cancelled(mut self) -> Self {
        self.is_cancelled = true;
        self
    }

    /// Builds the entry that zeroes a profit-and-loss account under one key
    ///
    /// Debit and credit are swapped relative to the account's net balance:
    /// a credit balance (income) is debited, a debit balance (expense) credited.
    pub fn pl_reversal(
        voucher: &PeriodClosingVoucher,
        account: &str,
        balance: &AccountBalance,
        dimensions: DimensionValues,
        precision: Precision,
    ) -> Self {
        let (debit, credit) = precision.split_balance(-balance.balance_in_company_currency());
        let (debit_in_account_currency, credit_in_account_currency) =
            precision.split_balance(-balance.balance_in_account_currency());

        Self {
            account: account.to_string(),
            account_currency: balance.account_currency.clone(),
            debit,
            credit,
            debit_in_account_currency,
            credit_in_account_currency,
            dimensions,
            ..Self::closing_template(voucher)
        }
    }

    /// Builds the entry posting a key's net P&L balance to the closing account
    ///
    /// Account currency amounts mirror company currency amounts.
    pub fn closing_account(
        voucher: &PeriodClosingVoucher,
        net_balance: Decimal,
        account_currency: Option<CurrencyCode>,
        dimensions: DimensionValues,
        precision: Precision,
    ) -> Self {
        let (debit, credit) = precision.split_balance(net_balance);

        Self {
            account: voucher.closing_account_head.clone(),
            account_currency,
            debit,
            credit,
            debit_in_account_currency: debit,
            credit_in_account_currency: credit,
            dimensions,
            ..Self::closing_template(voucher)
        }
    }

    fn closing_template(voucher: &PeriodClosingVoucher) -> Self {
        Self {
            id: GlEntryId::new_v7(),
            company: voucher.company.clone(),
            posting_date: voucher.period.end(),
            account: String::new(),
            account_currency: None,
            debit: Decimal::ZERO,
            credit: Decimal::ZERO,
            debit_in_account_currency: Decimal::ZERO,
            credit_in_account_currency: Decimal::ZERO,
            dimensions: DimensionValues::new(),
            voucher_type: PERIOD_CLOSING_VOUCHER_TYPE.to_string(),
            voucher_no: voucher.id.to_string(),
            fiscal_year: voucher.fiscal_year.clone(),
            remarks: voucher.remarks.clone(),
            is_opening: false,
            is_period_closing_voucher_entry: true,
            is_cancelled: false,
        }
    }

    /// Debit minus credit in company currency
    pub fn net(&self) -> Decimal {
        self.debit - self.credit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_kernel::{ClosingPeriod, VoucherId};
    use rust_decimal_macros::dec;

    fn voucher() -> PeriodClosingVoucher {
        PeriodClosingVoucher {
            id: VoucherId::new(),
            company: "Acme".to_string(),
            period: ClosingPeriod::new(
                NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
            )
            .unwrap(),
            fiscal_year: Some("2024".to_string()),
            closing_account_head: "Retained Earnings - AC".to_string(),
            remarks: None,
            is_first_closing: false,
        }
    }

    #[test]
    fn test_pl_reversal_swaps_sides() {
        let income = AccountBalance {
            credit: dec!(500),
            credit_in_account_currency: dec!(500),
            ..Default::default()
        };
        let entry = GlEntry::pl_reversal(&voucher(), "Sales", &income, DimensionValues::new(), Precision::default());

        assert_eq!(entry.debit, dec!(500));
        assert_eq!(entry.credit, dec!(0));
        assert_eq!(entry.debit_in_account_currency, dec!(500));
        assert_eq!(entry.posting_date, NaiveDate::from_ymd_opt(2024, 1, 31).unwrap());
        assert!(entry.is_period_closing_voucher_entry);
        assert_eq!(entry.voucher_type, PERIOD_CLOSING_VOUCHER_TYPE);
    }

    #[test]
    fn test_closing_account_follows_sign_of_net() {
        let entry = GlEntry::closing_account(&voucher(), dec!(-320.456), None, DimensionValues::new(), Precision::default());
        assert_eq!(entry.account, "Retained Earnings - AC");
        assert_eq!(entry.credit, dec!(320.46));
        assert_eq!(entry.credit_in_account_currency, dec!(320.46));
        assert_eq!(entry.debit, dec!(0));
    }
}
