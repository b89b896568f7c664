//! Closing job repository
//!
//! SQL access for period closing vouchers, closing runs and their processing
//! units. Every status change is a conditional `UPDATE … WHERE status = …`, so
//! callers learn from the affected row count whether they won the transition.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use tracing::debug;
use uuid::Uuid;

use crate::error::DatabaseError;

/// Orders report types the way the domain orders them: P&L before balance sheet
const REPORT_TYPE_ORDER: &str =
    "CASE report_type WHEN 'Profit and Loss' THEN 0 ELSE 1 END";

/// A row of `period_closing_vouchers`
#[derive(Debug, Clone, FromRow)]
pub struct VoucherRow {
    pub voucher_id: Uuid,
    pub company: String,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub fiscal_year: Option<String>,
    pub closing_account_head: String,
    pub remarks: Option<String>,
    pub is_first_closing: bool,
}

/// A row of `closing_runs`
#[derive(Debug, Clone, FromRow)]
pub struct RunRow {
    pub run_id: Uuid,
    pub voucher_id: Uuid,
    pub status: String,
    pub policy: String,
    pub summary: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A row of `closing_units` or `closing_opening_units`
#[derive(Debug, Clone, FromRow)]
pub struct UnitRow {
    pub run_id: Uuid,
    pub processing_date: NaiveDate,
    pub report_type: String,
    pub status: String,
    pub closing_balance: Option<serde_json::Value>,
}

/// Primary key of a unit row
#[derive(Debug, Clone, FromRow)]
pub struct UnitKeyRow {
    pub processing_date: NaiveDate,
    pub report_type: String,
}

/// Unit count for one status
#[derive(Debug, Clone, FromRow)]
pub struct StatusCountRow {
    pub status: String,
    pub count: i64,
}

/// A run with its units, ready to insert
#[derive(Debug, Clone)]
pub struct NewRun {
    pub run: RunRow,
    pub units: Vec<UnitRow>,
    pub opening_units: Vec<UnitRow>,
}

/// Repository for vouchers, runs and processing units
#[derive(Debug, Clone)]
pub struct ClosingRepository {
    pool: PgPool,
}

impl ClosingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn get_voucher(&self, voucher_id: Uuid) -> Result<VoucherRow, DatabaseError> {
        sqlx::query_as::<_, VoucherRow>(
            r#"
            SELECT voucher_id, company, period_start, period_end, fiscal_year,
                   closing_account_head, remarks, is_first_closing
            FROM period_closing_vouchers
            WHERE voucher_id = $1
            "#,
        )
        .bind(voucher_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DatabaseError::not_found("PeriodClosingVoucher", voucher_id))
    }

    pub async fn insert_voucher(&self, voucher: &VoucherRow) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO period_closing_vouchers (
                voucher_id, company, period_start, period_end, fiscal_year,
                closing_account_head, remarks, is_first_closing
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(voucher.voucher_id)
        .bind(&voucher.company)
        .bind(voucher.period_start)
        .bind(voucher.period_end)
        .bind(&voucher.fiscal_year)
        .bind(&voucher.closing_account_head)
        .bind(&voucher.remarks)
        .bind(voucher.is_first_closing)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Inserts the run, its units and its opening-balance units in one
    /// transaction
    pub async fn insert_run(&self, new_run: &NewRun) -> Result<(), DatabaseError> {
        let mut tx = self.pool.begin().await?;
        let run = &new_run.run;

        sqlx::query(
            r#"
            INSERT INTO closing_runs (run_id, voucher_id, status, policy, summary, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(run.run_id)
        .bind(run.voucher_id)
        .bind(&run.status)
        .bind(&run.policy)
        .bind(&run.summary)
        .bind(run.created_at)
        .bind(run.updated_at)
        .execute(&mut *tx)
        .await?;

        insert_units(&mut tx, "closing_units", run.run_id, &new_run.units).await?;
        insert_units(&mut tx, "closing_opening_units", run.run_id, &new_run.opening_units).await?;

        tx.commit().await?;
        debug!(
            run_id = %run.run_id,
            units = new_run.units.len(),
            opening_units = new_run.opening_units.len(),
            "Inserted closing run"
        );
        Ok(())
    }

    pub async fn get_run(&self, run_id: Uuid) -> Result<RunRow, DatabaseError> {
        sqlx::query_as::<_, RunRow>(
            r#"
            SELECT run_id, voucher_id, status, policy, summary, created_at, updated_at
            FROM closing_runs
            WHERE run_id = $1
            "#,
        )
        .bind(run_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DatabaseError::not_found("VoucherRun", run_id))
    }

    pub async fn set_run_status(&self, run_id: Uuid, status: &str) -> Result<(), DatabaseError> {
        let result = sqlx::query(
            "UPDATE closing_runs SET status = $2, updated_at = now() WHERE run_id = $1",
        )
        .bind(run_id)
        .bind(status)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::not_found("VoucherRun", run_id));
        }
        Ok(())
    }

    /// Sets the run status if it is one of `from`; returns true if it was set
    pub async fn transition_run(
        &self,
        run_id: Uuid,
        from: &[String],
        to: &str,
    ) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            r#"
            UPDATE closing_runs
            SET status = $3, updated_at = now()
            WHERE run_id = $1 AND status = ANY($2)
            "#,
        )
        .bind(run_id)
        .bind(from)
        .bind(to)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }
        self.ensure_run_exists(run_id).await?;
        Ok(false)
    }

    pub async fn store_summary(
        &self,
        run_id: Uuid,
        summary: &serde_json::Value,
    ) -> Result<(), DatabaseError> {
        let result = sqlx::query(
            "UPDATE closing_runs SET summary = $2, updated_at = now() WHERE run_id = $1",
        )
        .bind(run_id)
        .bind(summary)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::not_found("VoucherRun", run_id));
        }
        Ok(())
    }

    pub async fn unit_status(
        &self,
        run_id: Uuid,
        processing_date: NaiveDate,
        report_type: &str,
    ) -> Result<String, DatabaseError> {
        sqlx::query_scalar::<_, String>(
            r#"
            SELECT status FROM closing_units
            WHERE run_id = $1 AND processing_date = $2 AND report_type = $3
            "#,
        )
        .bind(run_id)
        .bind(processing_date)
        .bind(report_type)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| {
            DatabaseError::not_found(
                "ProcessingUnit",
                format!("{}/{}/{}", run_id, processing_date, report_type),
            )
        })
    }

    /// Sets a unit's status if it is `from`; returns true if it was set
    pub async fn transition_unit(
        &self,
        run_id: Uuid,
        processing_date: NaiveDate,
        report_type: &str,
        from: &str,
        to: &str,
    ) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            r#"
            UPDATE closing_units
            SET status = $5, updated_at = now()
            WHERE run_id = $1 AND processing_date = $2 AND report_type = $3 AND status = $4
            "#,
        )
        .bind(run_id)
        .bind(processing_date)
        .bind(report_type)
        .bind(from)
        .bind(to)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }
        // Distinguishes a lost race from a missing unit
        self.unit_status(run_id, processing_date, report_type).await?;
        Ok(false)
    }

    /// Writes the partial result and completes a `Running` unit
    pub async fn complete_unit(
        &self,
        run_id: Uuid,
        processing_date: NaiveDate,
        report_type: &str,
        closing_balance: &serde_json::Value,
    ) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            r#"
            UPDATE closing_units
            SET status = 'Completed', closing_balance = $4, updated_at = now()
            WHERE run_id = $1 AND processing_date = $2 AND report_type = $3 AND status = 'Running'
            "#,
        )
        .bind(run_id)
        .bind(processing_date)
        .bind(report_type)
        .bind(closing_balance)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }
        self.unit_status(run_id, processing_date, report_type).await?;
        Ok(false)
    }

    /// Claims up to `max_running - running` of the earliest queued units
    ///
    /// The run row is locked for the duration of the transaction, so
    /// concurrent claims for the same run are serialized and the running
    /// count they see is exact.
    pub async fn claim_units(
        &self,
        run_id: Uuid,
        max_running: i64,
    ) -> Result<Vec<UnitKeyRow>, DatabaseError> {
        let mut tx = self.pool.begin().await?;

        let status = sqlx::query_scalar::<_, String>(
            "SELECT status FROM closing_runs WHERE run_id = $1 FOR UPDATE",
        )
        .bind(run_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| DatabaseError::not_found("VoucherRun", run_id))?;

        if status != "Running" {
            tx.commit().await?;
            return Ok(Vec::new());
        }

        let running = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM closing_units WHERE run_id = $1 AND status = 'Running'",
        )
        .bind(run_id)
        .fetch_one(&mut *tx)
        .await?;

        let capacity = (max_running - running).max(0);
        if capacity == 0 {
            tx.commit().await?;
            return Ok(Vec::new());
        }

        let sql = format!(
            r#"
            WITH claimed AS (
                UPDATE closing_units
                SET status = 'Running', updated_at = now()
                WHERE (run_id, processing_date, report_type) IN (
                    SELECT run_id, processing_date, report_type
                    FROM closing_units
                    WHERE run_id = $1 AND status = 'Queued'
                    ORDER BY processing_date, {order}
                    LIMIT $2
                )
                RETURNING processing_date, report_type
            )
            SELECT processing_date, report_type
            FROM claimed
            ORDER BY processing_date, {order}
            "#,
            order = REPORT_TYPE_ORDER
        );
        let claimed = sqlx::query_as::<_, UnitKeyRow>(&sql)
            .bind(run_id)
            .bind(capacity)
            .fetch_all(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(claimed)
    }

    /// Moves every unit of the run in `from` to `to`
    pub async fn transition_all_units(
        &self,
        run_id: Uuid,
        from: &str,
        to: &str,
    ) -> Result<u64, DatabaseError> {
        let result = sqlx::query(
            r#"
            UPDATE closing_units
            SET status = $3, updated_at = now()
            WHERE run_id = $1 AND status = $2
            "#,
        )
        .bind(run_id)
        .bind(from)
        .bind(to)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn unit_counts(&self, run_id: Uuid) -> Result<Vec<StatusCountRow>, DatabaseError> {
        let rows = sqlx::query_as::<_, StatusCountRow>(
            r#"
            SELECT status, COUNT(*) AS count
            FROM closing_units
            WHERE run_id = $1
            GROUP BY status
            "#,
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn list_units(&self, run_id: Uuid) -> Result<Vec<UnitRow>, DatabaseError> {
        self.fetch_units("closing_units", run_id).await
    }

    pub async fn opening_units(&self, run_id: Uuid) -> Result<Vec<UnitRow>, DatabaseError> {
        self.fetch_units("closing_opening_units", run_id).await
    }

    async fn fetch_units(&self, table: &str, run_id: Uuid) -> Result<Vec<UnitRow>, DatabaseError> {
        let sql = format!(
            r#"
            SELECT run_id, processing_date, report_type, status, closing_balance
            FROM {table}
            WHERE run_id = $1
            ORDER BY processing_date, {order}
            "#,
            table = table,
            order = REPORT_TYPE_ORDER
        );
        let rows = sqlx::query_as::<_, UnitRow>(&sql)
            .bind(run_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn ensure_run_exists(&self, run_id: Uuid) -> Result<(), DatabaseError> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM closing_runs WHERE run_id = $1)",
        )
        .bind(run_id)
        .fetch_one(&self.pool)
        .await?;

        if exists {
            Ok(())
        } else {
            Err(DatabaseError::not_found("VoucherRun", run_id))
        }
    }
}

async fn insert_units(
    tx: &mut Transaction<'_, Postgres>,
    table: &str,
    run_id: Uuid,
    units: &[UnitRow],
) -> Result<(), DatabaseError> {
    if units.is_empty() {
        return Ok(());
    }

    let dates: Vec<NaiveDate> = units.iter().map(|u| u.processing_date).collect();
    let report_types: Vec<String> = units.iter().map(|u| u.report_type.clone()).collect();
    let statuses: Vec<String> = units.iter().map(|u| u.status.clone()).collect();

    let sql = format!(
        r#"
        INSERT INTO {table} (run_id, processing_date, report_type, status)
        SELECT $1, t.processing_date, t.report_type, t.status
        FROM UNNEST($2::date[], $3::text[], $4::text[]) AS t(processing_date, report_type, status)
        "#,
        table = table
    );
    sqlx::query(&sql)
        .bind(run_id)
        .bind(&dates)
        .bind(&report_types)
        .bind(&statuses)
        .execute(&mut **tx)
        .await?;
    Ok(())
}
