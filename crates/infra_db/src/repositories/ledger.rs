//! General ledger repository
//!
//! Reads accounts and grouped entry sums, and writes closing entry batches.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use std::collections::BTreeMap;
use tracing::debug;
use uuid::Uuid;

use crate::error::DatabaseError;

/// A row of `accounts`
#[derive(Debug, Clone, FromRow)]
pub struct AccountRow {
    pub name: String,
    pub company: String,
    pub report_type: String,
    pub account_currency: String,
}

/// Summed debits and credits for one account and dimension combination
#[derive(Debug, Clone, FromRow)]
pub struct GroupedBalanceRow {
    pub account: String,
    pub dimensions: Json<BTreeMap<String, String>>,
    pub debit: Decimal,
    pub credit: Decimal,
    pub debit_in_account_currency: Decimal,
    pub credit_in_account_currency: Decimal,
    pub account_currency: Option<String>,
}

/// A ledger entry to insert
#[derive(Debug, Clone, FromRow)]
pub struct GlEntryRow {
    pub entry_id: Uuid,
    pub company: String,
    pub posting_date: NaiveDate,
    pub account: String,
    pub account_currency: Option<String>,
    pub debit: Decimal,
    pub credit: Decimal,
    pub debit_in_account_currency: Decimal,
    pub credit_in_account_currency: Decimal,
    pub dimensions: Json<BTreeMap<String, String>>,
    pub voucher_type: String,
    pub voucher_no: String,
    pub fiscal_year: Option<String>,
    pub remarks: Option<String>,
    pub is_opening: bool,
    pub is_period_closing_voucher_entry: bool,
    pub is_cancelled: bool,
}

/// Repository for accounts and ledger entries
#[derive(Debug, Clone)]
pub struct LedgerRepository {
    pool: PgPool,
}

impl LedgerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn insert_account(&self, account: &AccountRow) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO accounts (name, company, report_type, account_currency)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(&account.name)
        .bind(&account.company)
        .bind(&account.report_type)
        .bind(&account.account_currency)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn account_names(
        &self,
        company: &str,
        report_type: &str,
    ) -> Result<Vec<String>, DatabaseError> {
        let names = sqlx::query_scalar::<_, String>(
            r#"
            SELECT name FROM accounts
            WHERE company = $1 AND report_type = $2
            ORDER BY name
            "#,
        )
        .bind(company)
        .bind(report_type)
        .fetch_all(&self.pool)
        .await?;
        Ok(names)
    }

    pub async fn account_currency(&self, account: &str) -> Result<Option<String>, DatabaseError> {
        let currency = sqlx::query_scalar::<_, String>(
            "SELECT account_currency FROM accounts WHERE name = $1",
        )
        .bind(account)
        .fetch_optional(&self.pool)
        .await?;
        Ok(currency)
    }

    /// Sums the day's non-cancelled entries on `accounts`, grouped by account
    /// and the values of `dimension_names`
    ///
    /// Blank dimension values are dropped before grouping, so they group with
    /// entries that have no value at all.
    pub async fn grouped_balances(
        &self,
        company: &str,
        posting_date: NaiveDate,
        accounts: &[String],
        dimension_names: &[String],
    ) -> Result<Vec<GroupedBalanceRow>, DatabaseError> {
        let rows = sqlx::query_as::<_, GroupedBalanceRow>(
            r#"
            SELECT
                account,
                dimensions,
                SUM(debit) AS debit,
                SUM(credit) AS credit,
                SUM(debit_in_account_currency) AS debit_in_account_currency,
                SUM(credit_in_account_currency) AS credit_in_account_currency,
                MAX(account_currency) AS account_currency
            FROM (
                SELECT
                    e.account,
                    e.debit,
                    e.credit,
                    e.debit_in_account_currency,
                    e.credit_in_account_currency,
                    COALESCE(e.account_currency, a.account_currency) AS account_currency,
                    COALESCE(
                        (SELECT jsonb_object_agg(d.key, d.value)
                         FROM jsonb_each_text(e.dimensions) AS d
                         WHERE d.key = ANY($4) AND btrim(d.value) <> ''),
                        '{}'::jsonb
                    ) AS dimensions
                FROM gl_entries e
                JOIN accounts a ON a.name = e.account
                WHERE e.company = $1
                  AND e.posting_date = $2
                  AND e.account = ANY($3)
                  AND NOT e.is_cancelled
            ) filtered
            GROUP BY account, dimensions
            ORDER BY account
            "#,
        )
        .bind(company)
        .bind(posting_date)
        .bind(accounts)
        .bind(dimension_names)
        .fetch_all(&self.pool)
        .await?;

        debug!(%posting_date, rows = rows.len(), "Grouped ledger balances");
        Ok(rows)
    }

    /// Earliest and latest posting date of the company's live entries
    pub async fn posting_date_range(
        &self,
        company: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate)>, DatabaseError> {
        let (min, max) = sqlx::query_as::<_, (Option<NaiveDate>, Option<NaiveDate>)>(
            r#"
            SELECT MIN(posting_date), MAX(posting_date)
            FROM gl_entries
            WHERE company = $1 AND NOT is_cancelled
            "#,
        )
        .bind(company)
        .fetch_one(&self.pool)
        .await?;

        Ok(min.zip(max))
    }

    /// Inserts every entry under one batch id in a single transaction
    pub async fn insert_batch(
        &self,
        batch_id: Option<Uuid>,
        entries: &[GlEntryRow],
    ) -> Result<(), DatabaseError> {
        let mut tx = self.pool.begin().await?;

        for (line, entry) in entries.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO gl_entries (
                    entry_id, company, posting_date, account, account_currency,
                    debit, credit, debit_in_account_currency, credit_in_account_currency,
                    dimensions, voucher_type, voucher_no, fiscal_year, remarks,
                    is_opening, is_period_closing_voucher_entry, is_cancelled, batch_id, batch_line
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)
                "#,
            )
            .bind(entry.entry_id)
            .bind(&entry.company)
            .bind(entry.posting_date)
            .bind(&entry.account)
            .bind(&entry.account_currency)
            .bind(entry.debit)
            .bind(entry.credit)
            .bind(entry.debit_in_account_currency)
            .bind(entry.credit_in_account_currency)
            .bind(&entry.dimensions)
            .bind(&entry.voucher_type)
            .bind(&entry.voucher_no)
            .bind(&entry.fiscal_year)
            .bind(&entry.remarks)
            .bind(entry.is_opening)
            .bind(entry.is_period_closing_voucher_entry)
            .bind(entry.is_cancelled)
            .bind(batch_id)
            .bind(line as i32)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Entries written by one posting batch
    pub async fn batch_entries(&self, batch_id: Uuid) -> Result<Vec<GlEntryRow>, DatabaseError> {
        let rows = sqlx::query_as::<_, GlEntryRow>(
            r#"
            SELECT entry_id, company, posting_date, account, account_currency,
                   debit, credit, debit_in_account_currency, credit_in_account_currency,
                   dimensions, voucher_type, voucher_no, fiscal_year, remarks,
                   is_opening, is_period_closing_voucher_entry, is_cancelled
            FROM gl_entries
            WHERE batch_id = $1
            ORDER BY batch_line
            "#,
        )
        .bind(batch_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
