//! Period Closing Ports
//!
//! The closing job needs three collaborators, each behind a trait:
//!
//! - **`ClosingStore`**: vouchers, runs and their units. Every unit mutation is
//!   a single-row conditional write; batch claims are atomic per run.
//! - **`LedgerPort`**: chart of accounts, grouped ledger sums, and atomic
//!   posting of entry batches.
//! - **`JobQueue`**: hands a [`UnitTask`] to the worker pool.
//!
//! # Usage
//!
//! ```rust,ignore
//! use domain_closing::ports::{ClosingStore, LedgerPort};
//! use std::sync::Arc;
//!
//! let store: Arc<dyn ClosingStore> = Arc::new(PgClosingStore::new(pool.clone()));
//! let ledger: Arc<dyn LedgerPort> = Arc::new(PgLedger::new(pool));
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use core_kernel::{ClosingPeriod, CurrencyCode, DomainPort, PortError, PostingBatchId, RunId, VoucherId};

use crate::account::ReportType;
use crate::aggregator::BalanceQuery;
use crate::balance::{BalanceRow, DimensionBalances};
use crate::events::UnitTask;
use crate::gl_entry::GlEntry;
use crate::run::{
    PeriodClosingVoucher, PreparedRun, ProcessingUnit, RunStatus, UnitKey, UnitStatus, VoucherRun,
};

/// Number of units of a run in each status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitCounts {
    pub queued: u64,
    pub running: u64,
    pub paused: u64,
    pub completed: u64,
}

impl UnitCounts {
    pub fn total(&self) -> u64 {
        self.queued + self.running + self.paused + self.completed
    }

    /// True when every unit is `Completed`
    pub fn all_completed(&self) -> bool {
        self.completed == self.total()
    }

    /// Tallies a unit status
    pub fn record(&mut self, status: UnitStatus) {
        match status {
            UnitStatus::Queued => self.queued += 1,
            UnitStatus::Running => self.running += 1,
            UnitStatus::Paused => self.paused += 1,
            UnitStatus::Completed => self.completed += 1,
        }
    }
}

/// Storage for vouchers, runs and processing units
#[async_trait]
pub trait ClosingStore: DomainPort {
    /// Retrieves a period closing voucher
    async fn get_voucher(&self, id: VoucherId) -> Result<PeriodClosingVoucher, PortError>;

    /// Persists a new run with its units and opening-balance units
    async fn insert_run(&self, prepared: &PreparedRun) -> Result<(), PortError>;

    /// Retrieves a run
    async fn get_run(&self, id: RunId) -> Result<VoucherRun, PortError>;

    /// Sets the run status unconditionally
    async fn set_run_status(&self, id: RunId, status: RunStatus) -> Result<(), PortError>;

    /// Sets the run status only if it is currently one of `from`
    ///
    /// Returns true if the write happened.
    async fn transition_run(
        &self,
        id: RunId,
        from: &[RunStatus],
        to: RunStatus,
    ) -> Result<bool, PortError>;

    /// Stores the merged P&L summary on the run
    async fn store_summary(&self, id: RunId, summary: &DimensionBalances) -> Result<(), PortError>;

    /// Current status of a unit
    async fn unit_status(&self, key: &UnitKey) -> Result<UnitStatus, PortError>;

    /// Sets a unit's status only if it is currently `from`
    ///
    /// Returns true if the write happened.
    async fn transition_unit(
        &self,
        key: &UnitKey,
        from: UnitStatus,
        to: UnitStatus,
    ) -> Result<bool, PortError>;

    /// Stores a unit's partial result and marks it `Completed`, only if it is
    /// still `Running`
    ///
    /// Returns true if the write happened.
    async fn complete_unit(
        &self,
        key: &UnitKey,
        balances: &DimensionBalances,
    ) -> Result<bool, PortError>;

    /// Atomically moves up to `max_running - running` of the run's earliest
    /// `Queued` units to `Running`
    ///
    /// Nothing is claimed unless the run itself is `Running`. Returns the
    /// claimed keys in ascending date order.
    async fn claim_units(&self, run_id: RunId, max_running: usize) -> Result<Vec<UnitKey>, PortError>;

    /// Moves every unit of the run in status `from` to `to`
    ///
    /// Returns the number of units moved.
    async fn transition_all_units(
        &self,
        run_id: RunId,
        from: UnitStatus,
        to: UnitStatus,
    ) -> Result<u64, PortError>;

    /// Counts the run's units by status
    async fn unit_counts(&self, run_id: RunId) -> Result<UnitCounts, PortError>;

    /// All units of the run, in key order
    async fn list_units(&self, run_id: RunId) -> Result<Vec<ProcessingUnit>, PortError>;

    /// Opening-balance units recorded for the run
    async fn opening_units(&self, run_id: RunId) -> Result<Vec<ProcessingUnit>, PortError>;
}

/// Read and write access to the general ledger
#[async_trait]
pub trait LedgerPort: DomainPort {
    /// Names of the company's accounts of one report type
    async fn accounts(&self, company: &str, report_type: ReportType) -> Result<Vec<String>, PortError>;

    /// Sums non-cancelled entries matching the query, grouped by account and
    /// every dimension in the query
    async fn grouped_balances(&self, query: &BalanceQuery) -> Result<Vec<BalanceRow>, PortError>;

    /// Earliest and latest posting dates of the company, if it has entries
    async fn posting_date_range(&self, company: &str) -> Result<Option<ClosingPeriod>, PortError>;

    /// Currency an account is kept in
    async fn account_currency(&self, account: &str) -> Result<Option<CurrencyCode>, PortError>;

    /// Writes all entries in one transaction, or none of them
    async fn post_entries(&self, entries: Vec<GlEntry>) -> Result<PostingBatchId, PortError>;
}

/// Hands units to the worker pool
///
/// A task is only enqueued after its unit's `Running` write has succeeded, and
/// may be delivered more than once.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, task: UnitTask) -> Result<(), PortError>;
}
