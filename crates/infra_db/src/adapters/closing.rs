//! PostgreSQL Closing Store Adapter
//!
//! Implements `domain_closing::ClosingStore` on top of [`ClosingRepository`].
//! Statuses, report types and policies are stored as their display labels;
//! partial results and run summaries are stored as JSONB in the encoded-key
//! form produced by `DimensionBalances`.

use async_trait::async_trait;
use chrono::Utc;
use std::str::FromStr;
use tracing::{debug, instrument};

use core_kernel::{
    AdapterHealth, ClosingPeriod, DomainPort, HealthCheckResult, HealthCheckable, PortError,
    RunId, VoucherId,
};
use domain_closing::{
    ClosingPolicy, ClosingStore, DimensionBalances, PeriodClosingVoucher, PreparedRun,
    ProcessingUnit, ReportType, RunStatus, UnitCounts, UnitKey, UnitStatus, VoucherRun,
};

use crate::error::DatabaseError;
use crate::repositories::closing::{ClosingRepository, NewRun, RunRow, UnitRow, VoucherRow};

/// PostgreSQL-backed implementation of [`ClosingStore`]
#[derive(Debug, Clone)]
pub struct PostgresClosingStore {
    repository: ClosingRepository,
}

impl PostgresClosingStore {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self {
            repository: ClosingRepository::new(pool),
        }
    }

    pub fn repository(&self) -> &ClosingRepository {
        &self.repository
    }

    /// Registers a period closing voucher
    pub async fn insert_voucher(&self, voucher: &PeriodClosingVoucher) -> Result<(), PortError> {
        self.repository
            .insert_voucher(&voucher_to_row(voucher))
            .await
            .map_err(PortError::from)
    }
}

impl DomainPort for PostgresClosingStore {}

#[async_trait]
impl HealthCheckable for PostgresClosingStore {
    async fn health_check(&self) -> HealthCheckResult {
        ping(self.repository.pool(), "postgres-closing-store").await
    }
}

#[async_trait]
impl ClosingStore for PostgresClosingStore {
    #[instrument(skip(self), fields(voucher_id = %id))]
    async fn get_voucher(&self, id: VoucherId) -> Result<PeriodClosingVoucher, PortError> {
        let row = self
            .repository
            .get_voucher(id.into())
            .await
            .map_err(|e| not_found_as(e, "PeriodClosingVoucher", id))?;
        row_to_voucher(row)
    }

    #[instrument(skip(self, prepared), fields(run_id = %prepared.run.id))]
    async fn insert_run(&self, prepared: &PreparedRun) -> Result<(), PortError> {
        let new_run = NewRun {
            run: run_to_row(&prepared.run)?,
            units: prepared.units.iter().map(unit_to_row).collect(),
            opening_units: prepared.opening_units.iter().map(unit_to_row).collect(),
        };
        self.repository.insert_run(&new_run).await.map_err(PortError::from)
    }

    async fn get_run(&self, id: RunId) -> Result<VoucherRun, PortError> {
        let row = self
            .repository
            .get_run(id.into())
            .await
            .map_err(|e| not_found_as(e, "VoucherRun", id))?;
        row_to_run(row)
    }

    async fn set_run_status(&self, id: RunId, status: RunStatus) -> Result<(), PortError> {
        self.repository
            .set_run_status(id.into(), status.as_str())
            .await
            .map_err(|e| not_found_as(e, "VoucherRun", id))
    }

    #[instrument(skip(self), fields(run_id = %id))]
    async fn transition_run(
        &self,
        id: RunId,
        from: &[RunStatus],
        to: RunStatus,
    ) -> Result<bool, PortError> {
        let from: Vec<String> = from.iter().map(|s| s.as_str().to_string()).collect();
        let moved = self
            .repository
            .transition_run(id.into(), &from, to.as_str())
            .await
            .map_err(|e| not_found_as(e, "VoucherRun", id))?;
        debug!(moved, "Run transition");
        Ok(moved)
    }

    async fn store_summary(&self, id: RunId, summary: &DimensionBalances) -> Result<(), PortError> {
        let value = summary
            .to_json()
            .map_err(|e| PortError::transformation(e.to_string()))?;
        self.repository
            .store_summary(id.into(), &value)
            .await
            .map_err(|e| not_found_as(e, "VoucherRun", id))
    }

    async fn unit_status(&self, key: &UnitKey) -> Result<UnitStatus, PortError> {
        let status = self
            .repository
            .unit_status(key.run_id.into(), key.processing_date, key.report_type.as_str())
            .await
            .map_err(|e| not_found_as(e, "ProcessingUnit", key))?;
        UnitStatus::from_str(&status)
    }

    async fn transition_unit(
        &self,
        key: &UnitKey,
        from: UnitStatus,
        to: UnitStatus,
    ) -> Result<bool, PortError> {
        self.repository
            .transition_unit(
                key.run_id.into(),
                key.processing_date,
                key.report_type.as_str(),
                from.as_str(),
                to.as_str(),
            )
            .await
            .map_err(|e| not_found_as(e, "ProcessingUnit", key))
    }

    #[instrument(skip(self, balances), fields(unit = %key))]
    async fn complete_unit(
        &self,
        key: &UnitKey,
        balances: &DimensionBalances,
    ) -> Result<bool, PortError> {
        let value = balances
            .to_json()
            .map_err(|e| PortError::transformation(e.to_string()))?;
        self.repository
            .complete_unit(
                key.run_id.into(),
                key.processing_date,
                key.report_type.as_str(),
                &value,
            )
            .await
            .map_err(|e| not_found_as(e, "ProcessingUnit", key))
    }

    #[instrument(skip(self))]
    async fn claim_units(&self, run_id: RunId, max_running: usize) -> Result<Vec<UnitKey>, PortError> {
        let max_running = i64::try_from(max_running).unwrap_or(i64::MAX);
        let rows = self
            .repository
            .claim_units(run_id.into(), max_running)
            .await
            .map_err(|e| not_found_as(e, "VoucherRun", run_id))?;

        let mut keys = rows
            .into_iter()
            .map(|row| {
                Ok(UnitKey::new(
                    run_id,
                    row.processing_date,
                    parse_report_type(&row.report_type)?,
                ))
            })
            .collect::<Result<Vec<_>, PortError>>()?;
        keys.sort();
        debug!(claimed = keys.len(), "Claimed units");
        Ok(keys)
    }

    async fn transition_all_units(
        &self,
        run_id: RunId,
        from: UnitStatus,
        to: UnitStatus,
    ) -> Result<u64, PortError> {
        self.repository
            .transition_all_units(run_id.into(), from.as_str(), to.as_str())
            .await
            .map_err(PortError::from)
    }

    async fn unit_counts(&self, run_id: RunId) -> Result<UnitCounts, PortError> {
        let rows = self
            .repository
            .unit_counts(run_id.into())
            .await
            .map_err(PortError::from)?;

        let mut counts = UnitCounts::default();
        for row in rows {
            let count = u64::try_from(row.count).unwrap_or(0);
            match UnitStatus::from_str(&row.status)? {
                UnitStatus::Queued => counts.queued = count,
                UnitStatus::Running => counts.running = count,
                UnitStatus::Paused => counts.paused = count,
                UnitStatus::Completed => counts.completed = count,
            }
        }
        Ok(counts)
    }

    async fn list_units(&self, run_id: RunId) -> Result<Vec<ProcessingUnit>, PortError> {
        let rows = self
            .repository
            .list_units(run_id.into())
            .await
            .map_err(PortError::from)?;
        rows.into_iter().map(row_to_unit).collect()
    }

    async fn opening_units(&self, run_id: RunId) -> Result<Vec<ProcessingUnit>, PortError> {
        let rows = self
            .repository
            .opening_units(run_id.into())
            .await
            .map_err(PortError::from)?;
        rows.into_iter().map(row_to_unit).collect()
    }
}

// =============================================================================
// Conversion Functions
// =============================================================================

/// Keeps the entity name of a not-found error specific
fn not_found_as(error: DatabaseError, entity: &str, id: impl std::fmt::Display) -> PortError {
    if error.is_not_found() {
        PortError::not_found(entity, id)
    } else {
        error.into()
    }
}

fn parse_report_type(value: &str) -> Result<ReportType, PortError> {
    ReportType::from_str(value).map_err(|e| PortError::transformation(e.to_string()))
}

fn row_to_voucher(row: VoucherRow) -> Result<PeriodClosingVoucher, PortError> {
    let period = ClosingPeriod::new(row.period_start, row.period_end)
        .map_err(|e| PortError::transformation(e.to_string()))?;
    Ok(PeriodClosingVoucher {
        id: VoucherId::from_uuid(row.voucher_id),
        company: row.company,
        period,
        fiscal_year: row.fiscal_year,
        closing_account_head: row.closing_account_head,
        remarks: row.remarks,
        is_first_closing: row.is_first_closing,
    })
}

fn voucher_to_row(voucher: &PeriodClosingVoucher) -> VoucherRow {
    VoucherRow {
        voucher_id: voucher.id.into(),
        company: voucher.company.clone(),
        period_start: voucher.period.start(),
        period_end: voucher.period.end(),
        fiscal_year: voucher.fiscal_year.clone(),
        closing_account_head: voucher.closing_account_head.clone(),
        remarks: voucher.remarks.clone(),
        is_first_closing: voucher.is_first_closing,
    }
}

fn run_to_row(run: &VoucherRun) -> Result<RunRow, PortError> {
    let summary = run
        .summary
        .as_ref()
        .map(|s| s.to_json())
        .transpose()
        .map_err(|e| PortError::transformation(e.to_string()))?;
    Ok(RunRow {
        run_id: run.id.into(),
        voucher_id: run.voucher_id.into(),
        status: run.status.as_str().to_string(),
        policy: run.policy.as_str().to_string(),
        summary,
        created_at: run.created_at,
        updated_at: run.updated_at,
    })
}

fn row_to_run(row: RunRow) -> Result<VoucherRun, PortError> {
    Ok(VoucherRun {
        id: RunId::from_uuid(row.run_id),
        voucher_id: VoucherId::from_uuid(row.voucher_id),
        status: RunStatus::from_str(&row.status)?,
        policy: ClosingPolicy::from_str(&row.policy)?,
        summary: row.summary.map(parse_balances).transpose()?,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

fn unit_to_row(unit: &ProcessingUnit) -> UnitRow {
    UnitRow {
        run_id: unit.run_id.into(),
        processing_date: unit.processing_date,
        report_type: unit.report_type.as_str().to_string(),
        status: unit.status.as_str().to_string(),
        closing_balance: None,
    }
}

fn row_to_unit(row: UnitRow) -> Result<ProcessingUnit, PortError> {
    Ok(ProcessingUnit {
        run_id: RunId::from_uuid(row.run_id),
        processing_date: row.processing_date,
        report_type: parse_report_type(&row.report_type)?,
        status: UnitStatus::from_str(&row.status)?,
        closing_balance: row.closing_balance.map(parse_balances).transpose()?,
    })
}

fn parse_balances(value: serde_json::Value) -> Result<DimensionBalances, PortError> {
    serde_json::from_value(value).map_err(|e| PortError::transformation(e.to_string()))
}

/// Runs `SELECT 1` and reports the latency
pub(crate) async fn ping(pool: &sqlx::PgPool, adapter_id: &str) -> HealthCheckResult {
    let start = std::time::Instant::now();
    let result = sqlx::query_scalar::<_, i32>("SELECT 1").fetch_one(pool).await;
    let latency_ms = start.elapsed().as_millis() as u64;

    let (status, message) = match result {
        Ok(_) => (AdapterHealth::Healthy, None),
        Err(e) => (AdapterHealth::Unhealthy, Some(format!("Database error: {}", e))),
    };
    HealthCheckResult {
        adapter_id: adapter_id.to_string(),
        status,
        latency_ms,
        message,
        checked_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

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
            closing_account_head: "Retained Earnings".to_string(),
            remarks: None,
            is_first_closing: true,
        }
    }

    #[test]
    fn test_voucher_row_conversion_roundtrip() {
        let voucher = voucher();
        let back = row_to_voucher(voucher_to_row(&voucher)).unwrap();
        assert_eq!(back, voucher);
    }

    #[test]
    fn test_run_row_keeps_status_and_policy_labels() {
        let prepared = VoucherRun::prepare(&voucher(), ClosingPolicy::ProfitAndLossOnly, None);
        let row = run_to_row(&prepared.run).unwrap();
        assert_eq!(row.status, "Queued");
        assert_eq!(row.policy, "profit_and_loss_only");
        assert_eq!(row_to_run(row).unwrap(), prepared.run);
    }

    #[test]
    fn test_unit_row_with_unknown_status_fails() {
        let row = UnitRow {
            run_id: uuid::Uuid::new_v4(),
            processing_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            report_type: "Profit and Loss".to_string(),
            status: "Done".to_string(),
            closing_balance: None,
        };
        assert!(matches!(row_to_unit(row), Err(PortError::Transformation { .. })));
    }

    #[test]
    fn test_not_found_keeps_entity_name() {
        let error = not_found_as(DatabaseError::NotFound("x".to_string()), "VoucherRun", "PPCV-1");
        assert!(matches!(error, PortError::NotFound { ref entity_type, .. } if entity_type == "VoucherRun"));
    }
}
