//! Pre-built Test Fixtures
//!
//! Ready-to-use, predictable test data for the closing engine: a small chart
//! of accounts for one company and periods around January 2024.

use chrono::NaiveDate;
use core_kernel::{ClosingPeriod, CurrencyCode, Precision, VoucherId};
use domain_closing::{Account, PeriodClosingVoucher, ReportType};

/// Fixture for company and account data
pub struct LedgerFixtures;

impl LedgerFixtures {
    /// The company every fixture belongs to
    pub fn company() -> &'static str {
        "Acme Corp"
    }

    /// Company currency
    pub fn usd() -> CurrencyCode {
        CurrencyCode::new("USD").unwrap()
    }

    /// A second currency for multi-currency accounts
    pub fn eur() -> CurrencyCode {
        CurrencyCode::new("EUR").unwrap()
    }

    /// Account receiving the net P&L balance
    pub fn closing_account() -> &'static str {
        "Retained Earnings - AC"
    }

    pub fn sales() -> &'static str {
        "Sales - AC"
    }

    pub fn rent() -> &'static str {
        "Rent - AC"
    }

    pub fn cash() -> &'static str {
        "Cash - AC"
    }

    /// Income account kept in EUR
    pub fn export_sales() -> &'static str {
        "Export Sales - AC"
    }

    /// The full chart of accounts
    pub fn accounts() -> Vec<Account> {
        let company = Self::company();
        vec![
            Account::new(Self::sales(), company, ReportType::ProfitAndLoss, Self::usd()),
            Account::new(Self::rent(), company, ReportType::ProfitAndLoss, Self::usd()),
            Account::new(Self::export_sales(), company, ReportType::ProfitAndLoss, Self::eur()),
            Account::new(Self::cash(), company, ReportType::BalanceSheet, Self::usd()),
            Account::new(Self::closing_account(), company, ReportType::BalanceSheet, Self::usd()),
        ]
    }
}

/// Fixture for dates and periods
pub struct PeriodFixtures;

impl PeriodFixtures {
    pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    /// First day of every default period
    pub fn period_start() -> NaiveDate {
        Self::date(2024, 1, 1)
    }

    /// 2024-01-01 through 2024-01-03
    pub fn three_days() -> ClosingPeriod {
        Self::days(3)
    }

    /// The whole of January 2024
    pub fn january_2024() -> ClosingPeriod {
        Self::days(31)
    }

    /// `count` days starting 2024-01-01
    pub fn days(count: u32) -> ClosingPeriod {
        let start = Self::period_start();
        let end = start + chrono::Days::new(u64::from(count.max(1)) - 1);
        ClosingPeriod::new(start, end).unwrap()
    }
}

/// Fixture for closing vouchers
pub struct VoucherFixtures;

impl VoucherFixtures {
    /// A voucher closing `period` for the fixture company
    pub fn voucher(period: ClosingPeriod) -> PeriodClosingVoucher {
        PeriodClosingVoucher {
            id: VoucherId::new(),
            company: LedgerFixtures::company().to_string(),
            period,
            fiscal_year: Some("2024".to_string()),
            closing_account_head: LedgerFixtures::closing_account().to_string(),
            remarks: Some("Period closing".to_string()),
            is_first_closing: false,
        }
    }

    /// The company's first closing voucher
    pub fn first_voucher(period: ClosingPeriod) -> PeriodClosingVoucher {
        PeriodClosingVoucher {
            is_first_closing: true,
            ..Self::voucher(period)
        }
    }
}

/// Default amount precision
pub fn default_precision() -> Precision {
    Precision::default()
}
