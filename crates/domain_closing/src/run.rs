//! Voucher runs and processing units
//!
//! A [`VoucherRun`] is one execution of the closing job for a period closing
//! voucher. It owns a set of [`ProcessingUnit`]s, one per calendar day of the
//! voucher's period and report type of the run's policy.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use core_kernel::{ClosingPeriod, PortError, RunId, VoucherId};

use crate::account::ReportType;
use crate::balance::DimensionBalances;
use crate::error::ClosingError;

/// Overall status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunStatus {
    /// Created, not yet started
    Queued,
    /// Units are being dispatched and processed
    Running,
    /// No new units are claimed until resumed
    Paused,
    /// Every unit is done; a single poster holds the run
    Posting,
    /// Closing entries posted
    Completed,
}

impl RunStatus {
    /// Checks if a transition to the target status is valid
    pub fn can_transition_to(&self, target: RunStatus) -> bool {
        use RunStatus::*;
        matches!(
            (self, target),
            (Queued, Running)
                | (Queued, Paused)
                | (Running, Running)
                | (Running, Paused)
                | (Paused, Running)
                | (Running, Posting)
                | (Posting, Running)
                | (Posting, Completed)
                | (Running, Completed)
        )
    }

    /// Returns true once closing entries are posted
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Queued => "Queued",
            RunStatus::Running => "Running",
            RunStatus::Paused => "Paused",
            RunStatus::Posting => "Posting",
            RunStatus::Completed => "Completed",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = PortError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Queued" => Ok(RunStatus::Queued),
            "Running" => Ok(RunStatus::Running),
            "Paused" => Ok(RunStatus::Paused),
            "Posting" => Ok(RunStatus::Posting),
            "Completed" => Ok(RunStatus::Completed),
            other => Err(PortError::transformation(format!("Unknown run status: {}", other))),
        }
    }
}

/// Status of a single processing unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnitStatus {
    Queued,
    Running,
    Paused,
    Completed,
}

impl UnitStatus {
    /// Checks if a transition to the target status is valid
    ///
    /// `Running -> Queued` only happens when a claimed unit could not be
    /// handed to the job queue.
    pub fn can_transition_to(&self, target: UnitStatus) -> bool {
        use UnitStatus::*;
        matches!(
            (self, target),
            (Queued, Running)
                | (Queued, Paused)
                | (Paused, Queued)
                | (Running, Completed)
                | (Running, Queued)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UnitStatus::Queued => "Queued",
            UnitStatus::Running => "Running",
            UnitStatus::Paused => "Paused",
            UnitStatus::Completed => "Completed",
        }
    }
}

impl fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UnitStatus {
    type Err = PortError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Queued" => Ok(UnitStatus::Queued),
            "Running" => Ok(UnitStatus::Running),
            "Paused" => Ok(UnitStatus::Paused),
            "Completed" => Ok(UnitStatus::Completed),
            other => Err(PortError::transformation(format!("Unknown unit status: {}", other))),
        }
    }
}

/// Which report types a run processes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ClosingPolicy {
    /// Profit and loss plus balance sheet units, with opening balances for
    /// a company's first closing voucher
    #[default]
    Dual,
    /// Profit and loss units only
    ProfitAndLossOnly,
}

impl ClosingPolicy {
    /// Report types that get one unit per day
    pub fn report_types(&self) -> &'static [ReportType] {
        match self {
            ClosingPolicy::Dual => &[ReportType::ProfitAndLoss, ReportType::BalanceSheet],
            ClosingPolicy::ProfitAndLossOnly => &[ReportType::ProfitAndLoss],
        }
    }

    /// Returns true if opening-balance units are recorded for first vouchers
    pub fn records_opening_balances(&self) -> bool {
        matches!(self, ClosingPolicy::Dual)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ClosingPolicy::Dual => "dual",
            ClosingPolicy::ProfitAndLossOnly => "profit_and_loss_only",
        }
    }
}

impl fmt::Display for ClosingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClosingPolicy {
    type Err = PortError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dual" => Ok(ClosingPolicy::Dual),
            "profit_and_loss_only" => Ok(ClosingPolicy::ProfitAndLossOnly),
            other => Err(PortError::validation_field(
                format!("Unknown closing policy: {}", other),
                "policy",
            )),
        }
    }
}

/// The voucher a run closes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodClosingVoucher {
    pub id: VoucherId,
    pub company: String,
    pub period: ClosingPeriod,
    pub fiscal_year: Option<String>,
    /// Account that receives the net P&L balance
    pub closing_account_head: String,
    pub remarks: Option<String>,
    /// True if no earlier closing voucher exists for the company
    pub is_first_closing: bool,
}

/// Identifies a unit within a run
///
/// Ordering is by run, then date, then report type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UnitKey {
    pub run_id: RunId,
    pub processing_date: NaiveDate,
    pub report_type: ReportType,
}

impl UnitKey {
    pub fn new(run_id: RunId, processing_date: NaiveDate, report_type: ReportType) -> Self {
        Self {
            run_id,
            processing_date,
            report_type,
        }
    }
}

impl fmt::Display for UnitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.run_id, self.processing_date, self.report_type)
    }
}

/// One (date, report type) slice of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingUnit {
    pub run_id: RunId,
    pub processing_date: NaiveDate,
    pub report_type: ReportType,
    pub status: UnitStatus,
    /// Partial result written by the worker
    pub closing_balance: Option<DimensionBalances>,
}

impl ProcessingUnit {
    /// Creates a queued unit
    pub fn queued(run_id: RunId, processing_date: NaiveDate, report_type: ReportType) -> Self {
        Self {
            run_id,
            processing_date,
            report_type,
            status: UnitStatus::Queued,
            closing_balance: None,
        }
    }

    pub fn key(&self) -> UnitKey {
        UnitKey::new(self.run_id, self.processing_date, self.report_type)
    }
}

/// One execution of the closing job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoucherRun {
    pub id: RunId,
    pub voucher_id: VoucherId,
    pub status: RunStatus,
    pub policy: ClosingPolicy,
    /// Merged P&L balances, written by the poster
    pub summary: Option<DimensionBalances>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A new run together with the units to persist with it
#[derive(Debug, Clone)]
pub struct PreparedRun {
    pub run: VoucherRun,
    pub units: Vec<ProcessingUnit>,
    /// Balance sheet days covering the company's whole ledger history
    pub opening_units: Vec<ProcessingUnit>,
}

impl VoucherRun {
    /// Builds a queued run and its units for a voucher
    ///
    /// `opening_range` is the span of the company's ledger postings; it is only
    /// used for a first closing voucher under a policy that records opening
    /// balances.
    pub fn prepare(
        voucher: &PeriodClosingVoucher,
        policy: ClosingPolicy,
        opening_range: Option<ClosingPeriod>,
    ) -> PreparedRun {
        let now = Utc::now();
        let run = VoucherRun {
            id: RunId::new_v7(),
            voucher_id: voucher.id,
            status: RunStatus::Queued,
            policy,
            summary: None,
            created_at: now,
            updated_at: now,
        };

        let run_id = run.id;
        let units = voucher
            .period
            .dates()
            .flat_map(|date| {
                policy
                    .report_types()
                    .iter()
                    .map(move |report_type| ProcessingUnit::queued(run_id, date, *report_type))
            })
            .collect();

        let opening_units = match opening_range {
            Some(range) if voucher.is_first_closing && policy.records_opening_balances() => range
                .dates()
                .map(|date| ProcessingUnit::queued(run_id, date, ReportType::BalanceSheet))
                .collect(),
            _ => Vec::new(),
        };

        PreparedRun {
            run,
            units,
            opening_units,
        }
    }

    /// Validates and applies a status change
    pub fn transition_to(&mut self, target: RunStatus) -> Result<(), ClosingError> {
        if !self.status.can_transition_to(target) {
            return Err(ClosingError::InvalidStatusTransition {
                from: self.status.to_string(),
                to: target.to_string(),
            });
        }
        self.status = target;
        self.updated_at = Utc::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn voucher(first: bool) -> PeriodClosingVoucher {
        PeriodClosingVoucher {
            id: VoucherId::new(),
            company: "Acme".to_string(),
            period: ClosingPeriod::new(date(1), date(10)).unwrap(),
            fiscal_year: None,
            closing_account_head: "Retained Earnings".to_string(),
            remarks: None,
            is_first_closing: first,
        }
    }

    #[test]
    fn test_dual_policy_creates_two_units_per_day() {
        let prepared = VoucherRun::prepare(&voucher(false), ClosingPolicy::Dual, None);
        assert_eq!(prepared.units.len(), 20);
        assert!(prepared.units.iter().all(|u| u.status == UnitStatus::Queued));
        assert_eq!(prepared.run.status, RunStatus::Queued);
    }

    #[test]
    fn test_single_policy_creates_one_unit_per_day() {
        let prepared = VoucherRun::prepare(&voucher(false), ClosingPolicy::ProfitAndLossOnly, None);
        assert_eq!(prepared.units.len(), 10);
        assert!(prepared
            .units
            .iter()
            .all(|u| u.report_type == ReportType::ProfitAndLoss));
    }

    #[test]
    fn test_opening_units_only_for_first_voucher_under_dual() {
        let history = Some(ClosingPeriod::new(date(1), date(5)).unwrap());

        let first = VoucherRun::prepare(&voucher(true), ClosingPolicy::Dual, history);
        assert_eq!(first.opening_units.len(), 5);

        let later = VoucherRun::prepare(&voucher(false), ClosingPolicy::Dual, history);
        assert!(later.opening_units.is_empty());

        let single = VoucherRun::prepare(&voucher(true), ClosingPolicy::ProfitAndLossOnly, history);
        assert!(single.opening_units.is_empty());
    }

    #[test]
    fn test_unit_never_skips_running() {
        assert!(!UnitStatus::Queued.can_transition_to(UnitStatus::Completed));
        assert!(!UnitStatus::Paused.can_transition_to(UnitStatus::Running));
        assert!(!UnitStatus::Running.can_transition_to(UnitStatus::Paused));
        assert!(UnitStatus::Queued.can_transition_to(UnitStatus::Running));
    }

    #[test]
    fn test_completed_run_is_final() {
        let mut run = VoucherRun::prepare(&voucher(false), ClosingPolicy::Dual, None).run;
        run.transition_to(RunStatus::Running).unwrap();
        run.transition_to(RunStatus::Posting).unwrap();
        run.transition_to(RunStatus::Completed).unwrap();
        assert!(run.transition_to(RunStatus::Running).is_err());
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!("Posting".parse::<RunStatus>().unwrap(), RunStatus::Posting);
        assert_eq!("Paused".parse::<UnitStatus>().unwrap(), UnitStatus::Paused);
        assert!("Done".parse::<RunStatus>().is_err());
        assert_eq!(
            "profit_and_loss_only".parse::<ClosingPolicy>().unwrap(),
            ClosingPolicy::ProfitAndLossOnly
        );
    }
}
