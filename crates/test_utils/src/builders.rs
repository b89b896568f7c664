//! Test Data Builders
//!
//! Builders for ledgers and vouchers with sensible defaults, so tests only
//! spell out the fields they care about.

use chrono::NaiveDate;
use core_kernel::{ClosingPeriod, CurrencyCode};
use domain_closing::memory::InMemoryLedger;
use domain_closing::{Account, GlEntry, PeriodClosingVoucher, ReportType};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::fixtures::{LedgerFixtures, PeriodFixtures, VoucherFixtures};

/// Accounts and entries to load into a ledger
#[derive(Debug, Clone, Default)]
pub struct LedgerSeed {
    pub accounts: Vec<Account>,
    pub entries: Vec<GlEntry>,
}

impl LedgerSeed {
    /// Loads the seed into a fresh in-memory ledger
    pub async fn into_memory(self) -> InMemoryLedger {
        let ledger = InMemoryLedger::new();
        for account in self.accounts {
            ledger.add_account(account).await;
        }
        for entry in self.entries {
            ledger.add_entry(entry).await;
        }
        ledger
    }

    /// Sum of debit minus credit over the seeded entries of one account
    pub fn net_of(&self, account: &str) -> Decimal {
        self.entries
            .iter()
            .filter(|e| e.account == account && !e.is_cancelled)
            .map(|e| e.debit - e.credit)
            .sum()
    }
}

/// Builder for a ledger seed
///
/// # Example
///
/// ```rust,ignore
/// let seed = LedgerSeedBuilder::new()
///     .with_standard_accounts()
///     .daily_activity(PeriodFixtures::three_days())
///     .build();
/// ```
pub struct LedgerSeedBuilder {
    company: String,
    seed: LedgerSeed,
}

impl Default for LedgerSeedBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl LedgerSeedBuilder {
    pub fn new() -> Self {
        Self {
            company: LedgerFixtures::company().to_string(),
            seed: LedgerSeed::default(),
        }
    }

    /// Adds the fixture chart of accounts
    pub fn with_standard_accounts(mut self) -> Self {
        self.seed.accounts.extend(LedgerFixtures::accounts());
        self
    }

    pub fn account(mut self, name: &str, report_type: ReportType, currency: CurrencyCode) -> Self {
        self.seed
            .accounts
            .push(Account::new(name, self.company.clone(), report_type, currency));
        self
    }

    /// Adds a balanced pair of entries: `debit_account` debited and
    /// `credit_account` credited by `amount`
    pub fn transfer(
        mut self,
        date: NaiveDate,
        debit_account: &str,
        credit_account: &str,
        amount: Decimal,
        cost_center: Option<&str>,
    ) -> Self {
        let mut debit = GlEntry::new(self.company.clone(), date, debit_account, amount, Decimal::ZERO);
        let mut credit = GlEntry::new(self.company.clone(), date, credit_account, Decimal::ZERO, amount);
        if let Some(cc) = cost_center {
            debit = debit.with_dimension("cost_center", cc);
            credit = credit.with_dimension("cost_center", cc);
        }
        self.seed.entries.push(debit);
        self.seed.entries.push(credit);
        self
    }

    /// Adds one arbitrary entry
    pub fn entry(mut self, entry: GlEntry) -> Self {
        self.seed.entries.push(entry);
        self
    }

    /// Every day of `period`: 100 of sales and 30 of rent on cost center
    /// "Main", both settled in cash
    pub fn daily_activity(mut self, period: ClosingPeriod) -> Self {
        for date in period.dates() {
            self = self
                .transfer(date, LedgerFixtures::cash(), LedgerFixtures::sales(), dec!(100), Some("Main"))
                .transfer(date, LedgerFixtures::rent(), LedgerFixtures::cash(), dec!(30), Some("Main"));
        }
        self
    }

    pub fn build(self) -> LedgerSeed {
        self.seed
    }
}

/// Builder for period closing vouchers
pub struct VoucherBuilder {
    voucher: PeriodClosingVoucher,
}

impl Default for VoucherBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl VoucherBuilder {
    /// A non-first voucher for the three fixture days
    pub fn new() -> Self {
        Self {
            voucher: VoucherFixtures::voucher(PeriodFixtures::three_days()),
        }
    }

    pub fn period(mut self, period: ClosingPeriod) -> Self {
        self.voucher.period = period;
        self
    }

    pub fn days(self, count: u32) -> Self {
        self.period(PeriodFixtures::days(count))
    }

    pub fn first_closing(mut self) -> Self {
        self.voucher.is_first_closing = true;
        self
    }

    pub fn closing_account(mut self, account: impl Into<String>) -> Self {
        self.voucher.closing_account_head = account.into();
        self
    }

    pub fn company(mut self, company: impl Into<String>) -> Self {
        self.voucher.company = company.into();
        self
    }

    pub fn build(self) -> PeriodClosingVoucher {
        self.voucher
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_daily_activity_is_balanced() {
        let seed = LedgerSeedBuilder::new()
            .with_standard_accounts()
            .daily_activity(PeriodFixtures::three_days())
            .build();

        assert_eq!(seed.entries.len(), 12);
        assert_eq!(seed.net_of(LedgerFixtures::sales()), dec!(-300));
        assert_eq!(seed.net_of(LedgerFixtures::rent()), dec!(90));
        let total: Decimal = seed.entries.iter().map(|e| e.debit - e.credit).sum();
        assert_eq!(total, Decimal::ZERO);
    }

    #[test]
    fn test_voucher_builder() {
        let voucher = VoucherBuilder::new().days(10).first_closing().build();
        assert_eq!(voucher.period.day_count(), 10);
        assert!(voucher.is_first_closing);
        assert_eq!(voucher.closing_account_head, LedgerFixtures::closing_account());
    }
}
