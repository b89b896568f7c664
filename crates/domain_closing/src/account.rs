//! Accounts and report types
//!
//! Every account in the chart belongs to exactly one report type. The closing
//! job processes each report type as a separate unit of work.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use core_kernel::CurrencyCode;

use crate::error::ClosingError;

/// The financial statement an account reports on
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ReportType {
    /// Income and expense accounts, reset at every period close
    #[serde(rename = "Profit and Loss")]
    ProfitAndLoss,
    /// Asset, liability and equity accounts, carried forward
    #[serde(rename = "Balance Sheet")]
    BalanceSheet,
}

impl ReportType {
    /// Returns the label stored alongside ledger accounts
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportType::ProfitAndLoss => "Profit and Loss",
            ReportType::BalanceSheet => "Balance Sheet",
        }
    }
}

impl fmt::Display for ReportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportType {
    type Err = ClosingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Profit and Loss" => Ok(ReportType::ProfitAndLoss),
            "Balance Sheet" => Ok(ReportType::BalanceSheet),
            other => Err(ClosingError::Port(core_kernel::PortError::validation_field(
                format!("Unknown report type: {}", other),
                "report_type",
            ))),
        }
    }
}

/// An account in a company's chart of accounts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Account name, unique across companies (e.g. "Sales - AC")
    pub name: String,
    /// Owning company
    pub company: String,
    /// Report type the account belongs to
    pub report_type: ReportType,
    /// Currency the account is kept in
    pub account_currency: CurrencyCode,
}

impl Account {
    /// Creates a new account
    pub fn new(
        name: impl Into<String>,
        company: impl Into<String>,
        report_type: ReportType,
        account_currency: CurrencyCode,
    ) -> Self {
        Self {
            name: name.into(),
            company: company.into(),
            report_type,
            account_currency,
        }
    }

    /// Returns true if the account is closed out at period end
    pub fn is_profit_and_loss(&self) -> bool {
        self.report_type == ReportType::ProfitAndLoss
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_type_labels_roundtrip() {
        for report_type in [ReportType::ProfitAndLoss, ReportType::BalanceSheet] {
            assert_eq!(report_type.as_str().parse::<ReportType>().unwrap(), report_type);
        }
        assert!("Cash Flow".parse::<ReportType>().is_err());
    }

    #[test]
    fn test_report_type_serde_uses_labels() {
        let json = serde_json::to_string(&ReportType::ProfitAndLoss).unwrap();
        assert_eq!(json, "\"Profit and Loss\"");
    }
}
