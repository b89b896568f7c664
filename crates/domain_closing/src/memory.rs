//! In-memory adapters
//!
//! These implement the closing ports on top of `tokio::sync` primitives and
//! are used for unit tests, scenario tests and the API tests. Each store keeps
//! its whole state behind one lock, so conditional writes and batch claims are
//! atomic the same way a row lock makes them atomic in PostgreSQL.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use core_kernel::{
    AdapterHealth, ClosingPeriod, CurrencyCode, DomainPort, HealthCheckResult, HealthCheckable,
    PortError, PostingBatchId, RunId, VoucherId,
};

use crate::account::{Account, ReportType};
use crate::aggregator::{group_entries, BalanceQuery};
use crate::balance::{BalanceRow, DimensionBalances};
use crate::events::UnitTask;
use crate::gl_entry::GlEntry;
use crate::ports::{ClosingStore, JobQueue, LedgerPort, UnitCounts};
use crate::run::{
    PeriodClosingVoucher, PreparedRun, ProcessingUnit, RunStatus, UnitKey, UnitStatus, VoucherRun,
};

fn healthy(adapter_id: &str) -> HealthCheckResult {
    HealthCheckResult {
        adapter_id: adapter_id.to_string(),
        status: AdapterHealth::Healthy,
        latency_ms: 0,
        message: Some("In-memory adapter always healthy".to_string()),
        checked_at: Utc::now(),
    }
}

#[derive(Debug, Default)]
struct StoreState {
    vouchers: HashMap<VoucherId, PeriodClosingVoucher>,
    runs: HashMap<RunId, VoucherRun>,
    units: BTreeMap<UnitKey, ProcessingUnit>,
    opening_units: HashMap<RunId, Vec<ProcessingUnit>>,
    peak_running: HashMap<RunId, u64>,
    failing_unit_reads: u32,
    failing_completions: u32,
}

impl StoreState {
    fn run_units(&self, run_id: RunId) -> impl Iterator<Item = &ProcessingUnit> {
        self.units.values().filter(move |u| u.run_id == run_id)
    }

    fn running_count(&self, run_id: RunId) -> u64 {
        self.run_units(run_id)
            .filter(|u| u.status == UnitStatus::Running)
            .count() as u64
    }

    fn run_mut(&mut self, id: RunId) -> Result<&mut VoucherRun, PortError> {
        self.runs
            .get_mut(&id)
            .ok_or_else(|| PortError::not_found("VoucherRun", id))
    }

    fn unit_mut(&mut self, key: &UnitKey) -> Result<&mut ProcessingUnit, PortError> {
        self.units
            .get_mut(key)
            .ok_or_else(|| PortError::not_found("ProcessingUnit", key))
    }
}

/// In-memory implementation of [`ClosingStore`]
#[derive(Debug, Default, Clone)]
pub struct InMemoryClosingStore {
    state: Arc<RwLock<StoreState>>,
}

impl InMemoryClosingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a voucher runs can be created for
    pub async fn insert_voucher(&self, voucher: PeriodClosingVoucher) {
        self.state.write().await.vouchers.insert(voucher.id, voucher);
    }

    /// A unit by key, if it exists
    pub async fn unit(&self, key: &UnitKey) -> Option<ProcessingUnit> {
        self.state.read().await.units.get(key).cloned()
    }

    /// Highest number of units of the run ever `Running` at once
    pub async fn peak_running(&self, run_id: RunId) -> u64 {
        self.state
            .read()
            .await
            .peak_running
            .get(&run_id)
            .copied()
            .unwrap_or(0)
    }

    /// Makes the next `count` unit status reads fail with a connection error
    pub async fn fail_next_unit_reads(&self, count: u32) {
        self.state.write().await.failing_unit_reads = count;
    }

    /// Makes the next `count` transitions of a run to `Completed` fail
    pub async fn fail_next_completions(&self, count: u32) {
        self.state.write().await.failing_completions = count;
    }
}

impl DomainPort for InMemoryClosingStore {}

#[async_trait]
impl HealthCheckable for InMemoryClosingStore {
    async fn health_check(&self) -> HealthCheckResult {
        healthy("memory-closing-store")
    }
}

#[async_trait]
impl ClosingStore for InMemoryClosingStore {
    async fn get_voucher(&self, id: VoucherId) -> Result<PeriodClosingVoucher, PortError> {
        self.state
            .read()
            .await
            .vouchers
            .get(&id)
            .cloned()
            .ok_or_else(|| PortError::not_found("PeriodClosingVoucher", id))
    }

    async fn insert_run(&self, prepared: &PreparedRun) -> Result<(), PortError> {
        let mut state = self.state.write().await;
        if state.runs.contains_key(&prepared.run.id) {
            return Err(PortError::conflict(format!("Run {} already exists", prepared.run.id)));
        }
        state.runs.insert(prepared.run.id, prepared.run.clone());
        for unit in &prepared.units {
            state.units.insert(unit.key(), unit.clone());
        }
        state
            .opening_units
            .insert(prepared.run.id, prepared.opening_units.clone());
        Ok(())
    }

    async fn get_run(&self, id: RunId) -> Result<VoucherRun, PortError> {
        self.state
            .read()
            .await
            .runs
            .get(&id)
            .cloned()
            .ok_or_else(|| PortError::not_found("VoucherRun", id))
    }

    async fn set_run_status(&self, id: RunId, status: RunStatus) -> Result<(), PortError> {
        let mut state = self.state.write().await;
        let run = state.run_mut(id)?;
        run.status = status;
        run.updated_at = Utc::now();
        Ok(())
    }

    async fn transition_run(
        &self,
        id: RunId,
        from: &[RunStatus],
        to: RunStatus,
    ) -> Result<bool, PortError> {
        let mut state = self.state.write().await;
        if to == RunStatus::Completed && state.failing_completions > 0 {
            state.failing_completions -= 1;
            return Err(PortError::connection("injected completion failure"));
        }
        let run = state.run_mut(id)?;
        if !from.contains(&run.status) {
            return Ok(false);
        }
        run.status = to;
        run.updated_at = Utc::now();
        Ok(true)
    }

    async fn store_summary(&self, id: RunId, summary: &DimensionBalances) -> Result<(), PortError> {
        let mut state = self.state.write().await;
        let run = state.run_mut(id)?;
        run.summary = Some(summary.clone());
        run.updated_at = Utc::now();
        Ok(())
    }

    async fn unit_status(&self, key: &UnitKey) -> Result<UnitStatus, PortError> {
        let mut state = self.state.write().await;
        if state.failing_unit_reads > 0 {
            state.failing_unit_reads -= 1;
            return Err(PortError::connection("injected unit read failure"));
        }
        state
            .units
            .get(key)
            .map(|u| u.status)
            .ok_or_else(|| PortError::not_found("ProcessingUnit", key))
    }

    async fn transition_unit(
        &self,
        key: &UnitKey,
        from: UnitStatus,
        to: UnitStatus,
    ) -> Result<bool, PortError> {
        let mut state = self.state.write().await;
        let unit = state.unit_mut(key)?;
        if unit.status != from {
            return Ok(false);
        }
        unit.status = to;
        Ok(true)
    }

    async fn complete_unit(
        &self,
        key: &UnitKey,
        balances: &DimensionBalances,
    ) -> Result<bool, PortError> {
        let mut state = self.state.write().await;
        let unit = state.unit_mut(key)?;
        if unit.status != UnitStatus::Running {
            return Ok(false);
        }
        unit.closing_balance = Some(balances.clone());
        unit.status = UnitStatus::Completed;
        Ok(true)
    }

    async fn claim_units(&self, run_id: RunId, max_running: usize) -> Result<Vec<UnitKey>, PortError> {
        let mut state = self.state.write().await;
        let status = state.run_mut(run_id)?.status;
        if status != RunStatus::Running {
            return Ok(Vec::new());
        }

        let running = state.running_count(run_id) as usize;
        let capacity = max_running.saturating_sub(running);
        let claimed: Vec<UnitKey> = state
            .run_units(run_id)
            .filter(|u| u.status == UnitStatus::Queued)
            .take(capacity)
            .map(ProcessingUnit::key)
            .collect();

        for key in &claimed {
            state.unit_mut(key)?.status = UnitStatus::Running;
        }

        let now_running = state.running_count(run_id);
        let peak = state.peak_running.entry(run_id).or_insert(0);
        *peak = (*peak).max(now_running);

        Ok(claimed)
    }

    async fn transition_all_units(
        &self,
        run_id: RunId,
        from: UnitStatus,
        to: UnitStatus,
    ) -> Result<u64, PortError> {
        let mut state = self.state.write().await;
        let mut moved = 0;
        for unit in state.units.values_mut() {
            if unit.run_id == run_id && unit.status == from {
                unit.status = to;
                moved += 1;
            }
        }
        Ok(moved)
    }

    async fn unit_counts(&self, run_id: RunId) -> Result<UnitCounts, PortError> {
        let state = self.state.read().await;
        let mut counts = UnitCounts::default();
        for unit in state.run_units(run_id) {
            counts.record(unit.status);
        }
        Ok(counts)
    }

    async fn list_units(&self, run_id: RunId) -> Result<Vec<ProcessingUnit>, PortError> {
        Ok(self.state.read().await.run_units(run_id).cloned().collect())
    }

    async fn opening_units(&self, run_id: RunId) -> Result<Vec<ProcessingUnit>, PortError> {
        Ok(self
            .state
            .read()
            .await
            .opening_units
            .get(&run_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[derive(Debug, Default)]
struct LedgerState {
    accounts: Vec<Account>,
    entries: Vec<GlEntry>,
    batches: Vec<(PostingBatchId, Vec<GlEntry>)>,
    failing_postings: u32,
}

/// In-memory implementation of [`LedgerPort`]
#[derive(Debug, Default, Clone)]
pub struct InMemoryLedger {
    state: Arc<RwLock<LedgerState>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_account(&self, account: Account) {
        self.state.write().await.accounts.push(account);
    }

    pub async fn add_entry(&self, entry: GlEntry) {
        self.state.write().await.entries.push(entry);
    }

    /// Makes the next `count` postings fail with a connection error
    pub async fn fail_next_postings(&self, count: u32) {
        self.state.write().await.failing_postings = count;
    }

    /// Entries of every successful posting batch, in posting order
    pub async fn posted_batches(&self) -> Vec<Vec<GlEntry>> {
        self.state
            .read()
            .await
            .batches
            .iter()
            .map(|(_, entries)| entries.clone())
            .collect()
    }
}

impl DomainPort for InMemoryLedger {}

#[async_trait]
impl HealthCheckable for InMemoryLedger {
    async fn health_check(&self) -> HealthCheckResult {
        healthy("memory-ledger")
    }
}

#[async_trait]
impl LedgerPort for InMemoryLedger {
    async fn accounts(&self, company: &str, report_type: ReportType) -> Result<Vec<String>, PortError> {
        Ok(self
            .state
            .read()
            .await
            .accounts
            .iter()
            .filter(|a| a.company == company && a.report_type == report_type)
            .map(|a| a.name.clone())
            .collect())
    }

    async fn grouped_balances(&self, query: &BalanceQuery) -> Result<Vec<BalanceRow>, PortError> {
        let state = self.state.read().await;
        let mut rows = group_entries(&state.entries, query);
        for row in &mut rows {
            if row.account_currency.is_none() {
                row.account_currency = state
                    .accounts
                    .iter()
                    .find(|a| a.name == row.account)
                    .map(|a| a.account_currency.clone());
            }
        }
        Ok(rows)
    }

    async fn posting_date_range(&self, company: &str) -> Result<Option<ClosingPeriod>, PortError> {
        let state = self.state.read().await;
        let dates = state
            .entries
            .iter()
            .filter(|e| e.company == company)
            .map(|e| e.posting_date);
        let (Some(min), Some(max)) = (dates.clone().min(), dates.max()) else {
            return Ok(None);
        };
        ClosingPeriod::new(min, max)
            .map(Some)
            .map_err(|e| PortError::internal(e.to_string()))
    }

    async fn account_currency(&self, account: &str) -> Result<Option<CurrencyCode>, PortError> {
        Ok(self
            .state
            .read()
            .await
            .accounts
            .iter()
            .find(|a| a.name == account)
            .map(|a| a.account_currency.clone()))
    }

    async fn post_entries(&self, entries: Vec<GlEntry>) -> Result<PostingBatchId, PortError> {
        let mut state = self.state.write().await;
        if state.failing_postings > 0 {
            state.failing_postings -= 1;
            return Err(PortError::connection("injected posting failure"));
        }
        let batch = PostingBatchId::new_v7();
        state.entries.extend(entries.iter().cloned());
        state.batches.push((batch, entries));
        Ok(batch)
    }
}

/// Job queue that records tasks instead of running them
#[derive(Debug, Default, Clone)]
pub struct RecordingJobQueue {
    tasks: Arc<Mutex<Vec<UnitTask>>>,
    fail: Arc<Mutex<bool>>,
}

impl RecordingJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes and returns every recorded task
    pub async fn take(&self) -> Vec<UnitTask> {
        std::mem::take(&mut *self.tasks.lock().await)
    }

    /// Makes every enqueue fail while set
    pub async fn set_failing(&self, failing: bool) {
        *self.fail.lock().await = failing;
    }
}

#[async_trait]
impl JobQueue for RecordingJobQueue {
    async fn enqueue(&self, task: UnitTask) -> Result<(), PortError> {
        if *self.fail.lock().await {
            return Err(PortError::ServiceUnavailable {
                service: "recording job queue".to_string(),
            });
        }
        self.tasks.lock().await.push(task);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run::ClosingPolicy;
    use chrono::NaiveDate;

    fn voucher(days: u32) -> PeriodClosingVoucher {
        PeriodClosingVoucher {
            id: VoucherId::new(),
            company: "Acme".to_string(),
            period: ClosingPeriod::new(
                NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(2024, 1, days).unwrap(),
            )
            .unwrap(),
            fiscal_year: None,
            closing_account_head: "Retained Earnings".to_string(),
            remarks: None,
            is_first_closing: false,
        }
    }

    #[tokio::test]
    async fn test_claim_respects_capacity_and_date_order() {
        let store = InMemoryClosingStore::new();
        let prepared = VoucherRun::prepare(&voucher(5), ClosingPolicy::Dual, None);
        let run_id = prepared.run.id;
        store.insert_run(&prepared).await.unwrap();

        assert!(store.claim_units(run_id, 4).await.unwrap().is_empty());

        store.set_run_status(run_id, RunStatus::Running).await.unwrap();
        let first = store.claim_units(run_id, 4).await.unwrap();
        assert_eq!(first.len(), 4);
        assert!(first.windows(2).all(|w| w[0].processing_date <= w[1].processing_date));

        assert!(store.claim_units(run_id, 4).await.unwrap().is_empty());
        assert_eq!(store.peak_running(run_id).await, 4);
    }

    #[tokio::test]
    async fn test_conditional_unit_transition() {
        let store = InMemoryClosingStore::new();
        let prepared = VoucherRun::prepare(&voucher(1), ClosingPolicy::ProfitAndLossOnly, None);
        store.insert_run(&prepared).await.unwrap();
        let key = prepared.units[0].key();

        assert!(!store
            .transition_unit(&key, UnitStatus::Running, UnitStatus::Completed)
            .await
            .unwrap());
        assert!(store
            .transition_unit(&key, UnitStatus::Queued, UnitStatus::Paused)
            .await
            .unwrap());
        assert_eq!(store.unit_status(&key).await.unwrap(), UnitStatus::Paused);
    }

    #[tokio::test]
    async fn test_failed_posting_writes_nothing() {
        let ledger = InMemoryLedger::new();
        ledger.fail_next_postings(1).await;
        let entry = GlEntry::new(
            "Acme",
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            "Sales",
            rust_decimal::Decimal::ONE,
            rust_decimal::Decimal::ZERO,
        );

        assert!(ledger.post_entries(vec![entry.clone()]).await.is_err());
        assert!(ledger.posted_batches().await.is_empty());
        assert!(ledger.post_entries(vec![entry]).await.is_ok());
        assert_eq!(ledger.posted_batches().await.len(), 1);
    }
}
