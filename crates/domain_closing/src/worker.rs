//! Per-date worker
//!
//! Processes a single (date, report type) unit: aggregates the day's ledger
//! balances, stores them on the unit and marks it `Completed`. The worker never
//! touches the run's status; deciding what happens next is the scheduler's job.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::aggregator::BalanceAggregator;
use crate::balance::DimensionBalances;
use crate::dimension::DimensionSet;
use crate::error::ClosingError;
use crate::events::{UnitCompleted, UnitTask, WorkerOutcome};
use crate::ports::ClosingStore;
use crate::run::UnitStatus;

/// Processes individual units
#[derive(Clone)]
pub struct DateWorker {
    store: Arc<dyn ClosingStore>,
    aggregator: BalanceAggregator,
    dimensions: DimensionSet,
}

impl DateWorker {
    pub fn new(store: Arc<dyn ClosingStore>, aggregator: BalanceAggregator, dimensions: DimensionSet) -> Self {
        Self {
            store,
            aggregator,
            dimensions,
        }
    }

    /// Processes one unit if it is still `Running`
    ///
    /// A unit in any other status is left alone, which makes late or duplicate
    /// deliveries harmless. On error the unit stays `Running` and can be
    /// delivered again.
    #[instrument(skip(self, task), fields(run_id = %task.run_id, date = %task.processing_date, report_type = %task.report_type))]
    pub async fn process_individual_date(&self, task: &UnitTask) -> Result<WorkerOutcome, ClosingError> {
        let key = task.key();

        let status = self.store.unit_status(&key).await?;
        if status != UnitStatus::Running {
            debug!(%status, "Unit is not running, skipping");
            return Ok(WorkerOutcome::Skipped { key, status });
        }

        let run = self
            .store
            .get_run(key.run_id)
            .await
            .map_err(|e| ClosingError::run_lookup(key.run_id, e))?;
        let voucher = self
            .store
            .get_voucher(run.voucher_id)
            .await
            .map_err(|e| ClosingError::voucher_lookup(run.voucher_id, e))?;

        let rows = self
            .aggregator
            .aggregate(&voucher.company, key.report_type, key.processing_date, &self.dimensions)
            .await?;
        let balances = DimensionBalances::fold_rows(&rows, &self.dimensions);

        if !self.store.complete_unit(&key, &balances).await? {
            // Another delivery finished the unit first
            let status = self.store.unit_status(&key).await?;
            debug!(%status, "Unit changed while processing, result discarded");
            return Ok(WorkerOutcome::Skipped { key, status });
        }

        info!(
            dimension_keys = balances.len(),
            accounts = balances.entry_count(),
            "Unit completed"
        );

        Ok(WorkerOutcome::Completed(UnitCompleted {
            key,
            accounts: balances.entry_count(),
            completed_at: Utc::now(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::{Account, ReportType};
    use crate::gl_entry::GlEntry;
    use crate::memory::{InMemoryClosingStore, InMemoryLedger};
    use crate::run::{ClosingPolicy, PeriodClosingVoucher, VoucherRun};
    use chrono::NaiveDate;
    use core_kernel::{ClosingPeriod, CurrencyCode, VoucherId};
    use rust_decimal_macros::dec;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    async fn setup() -> (Arc<InMemoryClosingStore>, DateWorker, VoucherRun) {
        let usd = CurrencyCode::new("USD").unwrap();
        let ledger = Arc::new(InMemoryLedger::new());
        ledger
            .add_account(Account::new("Sales", "Acme", ReportType::ProfitAndLoss, usd.clone()))
            .await;
        ledger
            .add_entry(GlEntry::new("Acme", date(1), "Sales", dec!(0), dec!(80)).with_dimension("cost_center", "Main"))
            .await;

        let voucher = PeriodClosingVoucher {
            id: VoucherId::new(),
            company: "Acme".to_string(),
            period: ClosingPeriod::new(date(1), date(2)).unwrap(),
            fiscal_year: None,
            closing_account_head: "Retained Earnings".to_string(),
            remarks: None,
            is_first_closing: false,
        };
        let store = Arc::new(InMemoryClosingStore::new());
        store.insert_voucher(voucher.clone()).await;

        let prepared = VoucherRun::prepare(&voucher, ClosingPolicy::ProfitAndLossOnly, None);
        store.insert_run(&prepared).await.unwrap();

        let worker = DateWorker::new(
            store.clone(),
            BalanceAggregator::new(ledger),
            DimensionSet::standard(),
        );
        (store, worker, prepared.run)
    }

    #[tokio::test]
    async fn test_worker_skips_unit_that_is_not_running() {
        let (store, worker, run) = setup().await;
        let task = UnitTask::new(crate::run::UnitKey::new(run.id, date(1), ReportType::ProfitAndLoss));

        let before = store.list_units(run.id).await.unwrap();
        let outcome = worker.process_individual_date(&task).await.unwrap();
        let after = store.list_units(run.id).await.unwrap();

        assert!(matches!(outcome, WorkerOutcome::Skipped { status: UnitStatus::Queued, .. }));
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_worker_stores_balances_and_completes_unit() {
        let (store, worker, run) = setup().await;
        store.set_run_status(run.id, crate::run::RunStatus::Running).await.unwrap();
        let claimed = store.claim_units(run.id, 1).await.unwrap();
        assert_eq!(claimed.len(), 1);

        let outcome = worker.process_individual_date(&UnitTask::new(claimed[0])).await.unwrap();
        assert!(outcome.is_completed());

        let unit = store.unit(&claimed[0]).await.unwrap();
        assert_eq!(unit.status, UnitStatus::Completed);
        let balances = unit.closing_balance.unwrap();
        assert_eq!(balances.entry_count(), 1);

        // A second delivery of the same task is a no-op
        let again = worker.process_individual_date(&UnitTask::new(claimed[0])).await.unwrap();
        assert!(!again.is_completed());
    }
}
