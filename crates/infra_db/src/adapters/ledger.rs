//! PostgreSQL Ledger Adapter
//!
//! Implements `domain_closing::LedgerPort` on top of [`LedgerRepository`].

use async_trait::async_trait;
use sqlx::types::Json;
use std::str::FromStr;
use tracing::{info, instrument};

use core_kernel::{
    ClosingPeriod, CurrencyCode, DomainPort, GlEntryId, HealthCheckResult, HealthCheckable,
    PortError, PostingBatchId,
};
use domain_closing::{Account, BalanceQuery, BalanceRow, GlEntry, LedgerPort, ReportType};

use crate::adapters::closing::ping;
use crate::repositories::ledger::{AccountRow, GlEntryRow, GroupedBalanceRow, LedgerRepository};

/// PostgreSQL-backed implementation of [`LedgerPort`]
#[derive(Debug, Clone)]
pub struct PostgresLedger {
    repository: LedgerRepository,
}

impl PostgresLedger {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self {
            repository: LedgerRepository::new(pool),
        }
    }

    pub fn repository(&self) -> &LedgerRepository {
        &self.repository
    }

    /// Adds an account to the chart of accounts
    pub async fn insert_account(&self, account: &Account) -> Result<(), PortError> {
        let row = AccountRow {
            name: account.name.clone(),
            company: account.company.clone(),
            report_type: account.report_type.as_str().to_string(),
            account_currency: account.account_currency.as_str().to_string(),
        };
        self.repository.insert_account(&row).await.map_err(PortError::from)
    }

    /// Records ordinary ledger entries outside any posting batch
    pub async fn record_entries(&self, entries: &[GlEntry]) -> Result<(), PortError> {
        let rows: Vec<GlEntryRow> = entries.iter().map(entry_to_row).collect();
        self.repository
            .insert_batch(None, &rows)
            .await
            .map_err(PortError::from)
    }

    /// Entries written by one posting batch, in posting order
    pub async fn batch_entries(&self, batch: PostingBatchId) -> Result<Vec<GlEntry>, PortError> {
        let rows = self
            .repository
            .batch_entries(batch.into())
            .await
            .map_err(PortError::from)?;
        rows.into_iter().map(row_to_entry).collect()
    }
}

impl DomainPort for PostgresLedger {}

#[async_trait]
impl HealthCheckable for PostgresLedger {
    async fn health_check(&self) -> HealthCheckResult {
        ping(self.repository.pool(), "postgres-ledger").await
    }
}

#[async_trait]
impl LedgerPort for PostgresLedger {
    async fn accounts(&self, company: &str, report_type: ReportType) -> Result<Vec<String>, PortError> {
        self.repository
            .account_names(company, report_type.as_str())
            .await
            .map_err(PortError::from)
    }

    #[instrument(skip(self, query), fields(company = %query.company, date = %query.date))]
    async fn grouped_balances(&self, query: &BalanceQuery) -> Result<Vec<BalanceRow>, PortError> {
        let rows = self
            .repository
            .grouped_balances(
                &query.company,
                query.date,
                &query.accounts,
                query.dimensions.names(),
            )
            .await
            .map_err(PortError::from)?;
        rows.into_iter().map(row_to_balance).collect()
    }

    async fn posting_date_range(&self, company: &str) -> Result<Option<ClosingPeriod>, PortError> {
        let range = self
            .repository
            .posting_date_range(company)
            .await
            .map_err(PortError::from)?;
        range
            .map(|(start, end)| ClosingPeriod::new(start, end))
            .transpose()
            .map_err(|e| PortError::transformation(e.to_string()))
    }

    async fn account_currency(&self, account: &str) -> Result<Option<CurrencyCode>, PortError> {
        let currency = self
            .repository
            .account_currency(account)
            .await
            .map_err(PortError::from)?;
        currency.map(|c| parse_currency(&c)).transpose()
    }

    #[instrument(skip(self, entries), fields(entries = entries.len()))]
    async fn post_entries(&self, entries: Vec<GlEntry>) -> Result<PostingBatchId, PortError> {
        let batch = PostingBatchId::new_v7();
        let rows: Vec<GlEntryRow> = entries.iter().map(entry_to_row).collect();
        self.repository
            .insert_batch(Some(batch.into()), &rows)
            .await
            .map_err(PortError::from)?;
        info!(%batch, "Posted ledger batch");
        Ok(batch)
    }
}

// =============================================================================
// Conversion Functions
// =============================================================================

fn parse_currency(value: &str) -> Result<CurrencyCode, PortError> {
    CurrencyCode::new(value).map_err(|e| PortError::transformation(e.to_string()))
}

fn row_to_balance(row: GroupedBalanceRow) -> Result<BalanceRow, PortError> {
    Ok(BalanceRow {
        account: row.account,
        dimensions: row.dimensions.0,
        debit: row.debit,
        credit: row.credit,
        debit_in_account_currency: row.debit_in_account_currency,
        credit_in_account_currency: row.credit_in_account_currency,
        account_currency: row.account_currency.as_deref().map(parse_currency).transpose()?,
    })
}

fn entry_to_row(entry: &GlEntry) -> GlEntryRow {
    GlEntryRow {
        entry_id: entry.id.into(),
        company: entry.company.clone(),
        posting_date: entry.posting_date,
        account: entry.account.clone(),
        account_currency: entry.account_currency.as_ref().map(|c| c.as_str().to_string()),
        debit: entry.debit,
        credit: entry.credit,
        debit_in_account_currency: entry.debit_in_account_currency,
        credit_in_account_currency: entry.credit_in_account_currency,
        dimensions: Json(entry.dimensions.clone()),
        voucher_type: entry.voucher_type.clone(),
        voucher_no: entry.voucher_no.clone(),
        fiscal_year: entry.fiscal_year.clone(),
        remarks: entry.remarks.clone(),
        is_opening: entry.is_opening,
        is_period_closing_voucher_entry: entry.is_period_closing_voucher_entry,
        is_cancelled: entry.is_cancelled,
    }
}

fn row_to_entry(row: GlEntryRow) -> Result<GlEntry, PortError> {
    Ok(GlEntry {
        id: GlEntryId::from_uuid(row.entry_id),
        company: row.company,
        posting_date: row.posting_date,
        account: row.account,
        account_currency: row.account_currency.as_deref().map(parse_currency).transpose()?,
        debit: row.debit,
        credit: row.credit,
        debit_in_account_currency: row.debit_in_account_currency,
        credit_in_account_currency: row.credit_in_account_currency,
        dimensions: row.dimensions.0,
        voucher_type: row.voucher_type,
        voucher_no: row.voucher_no,
        fiscal_year: row.fiscal_year,
        remarks: row.remarks,
        is_opening: row.is_opening,
        is_period_closing_voucher_entry: row.is_period_closing_voucher_entry,
        is_cancelled: row.is_cancelled,
    })
}
