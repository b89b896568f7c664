//! Messages exchanged between the scheduler, job queue and workers

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::RunId;

use crate::account::ReportType;
use crate::run::{UnitKey, UnitStatus};

/// A unit handed to the job queue for processing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitTask {
    pub run_id: RunId,
    pub processing_date: NaiveDate,
    pub report_type: ReportType,
    /// Delivery attempt, starting at 1
    pub delivery: u32,
}

impl UnitTask {
    /// First delivery of a unit
    pub fn new(key: UnitKey) -> Self {
        Self {
            run_id: key.run_id,
            processing_date: key.processing_date,
            report_type: key.report_type,
            delivery: 1,
        }
    }

    pub fn key(&self) -> UnitKey {
        UnitKey::new(self.run_id, self.processing_date, self.report_type)
    }

    /// The same task, one delivery later
    pub fn redelivered(&self) -> Self {
        Self {
            delivery: self.delivery + 1,
            ..*self
        }
    }
}

/// Emitted by a worker once a unit's partial result is stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitCompleted {
    pub key: UnitKey,
    /// Number of (dimension key, account) balances stored
    pub accounts: usize,
    pub completed_at: DateTime<Utc>,
}

/// Result of handing a task to a worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerOutcome {
    Completed(UnitCompleted),
    /// The unit was not `Running`, so nothing was done
    Skipped { key: UnitKey, status: UnitStatus },
}

impl WorkerOutcome {
    pub fn key(&self) -> UnitKey {
        match self {
            WorkerOutcome::Completed(event) => event.key,
            WorkerOutcome::Skipped { key, .. } => *key,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, WorkerOutcome::Completed(_))
    }
}
