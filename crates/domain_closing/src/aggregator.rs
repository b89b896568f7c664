//! Per-day grouped balance sums for one report type

use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::account::ReportType;
use crate::balance::BalanceRow;
use crate::dimension::{DimensionSet, DimensionValues};
use crate::error::ClosingError;
use crate::gl_entry::GlEntry;
use crate::ports::LedgerPort;

/// What the ledger is asked to sum
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceQuery {
    pub company: String,
    pub date: NaiveDate,
    /// Accounts to include; entries on other accounts are ignored
    pub accounts: Vec<String>,
    /// Dimensions to group by, in addition to the account
    pub dimensions: DimensionSet,
}

/// Runs the grouped balance read for one (company, report type, date)
#[derive(Clone)]
pub struct BalanceAggregator {
    ledger: Arc<dyn LedgerPort>,
}

impl BalanceAggregator {
    pub fn new(ledger: Arc<dyn LedgerPort>) -> Self {
        Self { ledger }
    }

    /// Sums the day's non-cancelled entries on the report type's accounts,
    /// grouped by account and every dimension
    #[instrument(skip(self, dimensions))]
    pub async fn aggregate(
        &self,
        company: &str,
        report_type: ReportType,
        date: NaiveDate,
        dimensions: &DimensionSet,
    ) -> Result<Vec<BalanceRow>, ClosingError> {
        let accounts = self.ledger.accounts(company, report_type).await?;
        if accounts.is_empty() {
            debug!("No accounts for report type, nothing to aggregate");
            return Ok(Vec::new());
        }

        let query = BalanceQuery {
            company: company.to_string(),
            date,
            accounts,
            dimensions: dimensions.clone(),
        };
        let rows = self.ledger.grouped_balances(&query).await?;
        debug!(rows = rows.len(), "Aggregated ledger balances");
        Ok(rows)
    }
}

/// Groups ledger entries the way `LedgerPort::grouped_balances` must
///
/// Keeps entries of the query's company and date on one of its accounts that
/// are not cancelled, and sums them per account and dimension values.
pub fn group_entries<'a, I>(entries: I, query: &BalanceQuery) -> Vec<BalanceRow>
where
    I: IntoIterator<Item = &'a GlEntry>,
{
    let accounts: HashSet<&str> = query.accounts.iter().map(String::as_str).collect();
    let mut groups: BTreeMap<(String, Vec<(String, String)>), BalanceRow> = BTreeMap::new();

    for entry in entries {
        if entry.is_cancelled
            || entry.company != query.company
            || entry.posting_date != query.date
            || !accounts.contains(entry.account.as_str())
        {
            continue;
        }

        let dimensions: DimensionValues = query
            .dimensions
            .names()
            .iter()
            .filter_map(|name| {
                entry
                    .dimensions
                    .get(name)
                    .filter(|v| !v.trim().is_empty())
                    .map(|v| (name.clone(), v.clone()))
            })
            .collect();
        let group_key = (
            entry.account.clone(),
            dimensions.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        );

        let row = groups.entry(group_key).or_insert_with(|| BalanceRow {
            account: entry.account.clone(),
            dimensions,
            debit: Decimal::ZERO,
            credit: Decimal::ZERO,
            debit_in_account_currency: Decimal::ZERO,
            credit_in_account_currency: Decimal::ZERO,
            account_currency: entry.account_currency.clone(),
        });
        row.debit += entry.debit;
        row.credit += entry.credit;
        row.debit_in_account_currency += entry.debit_in_account_currency;
        row.credit_in_account_currency += entry.credit_in_account_currency;
    }

    groups.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn query() -> BalanceQuery {
        BalanceQuery {
            company: "Acme".to_string(),
            date: date(2),
            accounts: vec!["Sales".to_string(), "Rent".to_string()],
            dimensions: DimensionSet::standard(),
        }
    }

    #[test]
    fn test_group_entries_filters_and_sums() {
        let entries = vec![
            GlEntry::new("Acme", date(2), "Sales", dec!(0), dec!(100)).with_dimension("cost_center", "Main"),
            GlEntry::new("Acme", date(2), "Sales", dec!(0), dec!(25)).with_dimension("cost_center", "Main"),
            GlEntry::new("Acme", date(2), "Sales", dec!(0), dec!(10)).with_dimension("cost_center", "Branch"),
            GlEntry::new("Acme", date(2), "Sales", dec!(0), dec!(999)).cancelled(),
            GlEntry::new("Acme", date(3), "Sales", dec!(0), dec!(999)),
            GlEntry::new("Other", date(2), "Sales", dec!(0), dec!(999)),
            GlEntry::new("Acme", date(2), "Debtors", dec!(999), dec!(0)),
        ];

        let rows = group_entries(&entries, &query());
        assert_eq!(rows.len(), 2);
        let total: Decimal = rows.iter().map(|r| r.credit).sum();
        assert_eq!(total, dec!(135));
    }

    #[test]
    fn test_group_entries_ignores_non_dimension_fields() {
        let entries = vec![
            GlEntry::new("Acme", date(2), "Rent", dec!(40), dec!(0)).with_dimension("branch", "North"),
            GlEntry::new("Acme", date(2), "Rent", dec!(60), dec!(0)).with_dimension("branch", "South"),
        ];

        let rows = group_entries(&entries, &query());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].debit, dec!(100));
        assert!(rows[0].dimensions.is_empty());
    }
}
