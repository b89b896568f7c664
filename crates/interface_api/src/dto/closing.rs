//! Closing run DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use domain_closing::{
    AdvanceOutcome, ClosingError, ClosingPolicy, PostingSummary, RunOverview, RunStatus, UnitCounts,
    VoucherRun,
};

#[derive(Debug, Deserialize)]
pub struct CreateRunRequest {
    pub voucher_id: Uuid,
    /// Falls back to the configured default policy
    pub policy: Option<ClosingPolicy>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RunResponse {
    pub id: Uuid,
    pub voucher_id: Uuid,
    pub status: RunStatus,
    pub policy: ClosingPolicy,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&VoucherRun> for RunResponse {
    fn from(run: &VoucherRun) -> Self {
        Self {
            id: *run.id.as_uuid(),
            voucher_id: *run.voucher_id.as_uuid(),
            status: run.status,
            policy: run.policy,
            created_at: run.created_at,
            updated_at: run.updated_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RunStatusResponse {
    #[serde(flatten)]
    pub run: RunResponse,
    pub units: UnitCounts,
    pub opening_units: usize,
    /// Merged P&L balances keyed by encoded dimension key, once posted
    pub summary: Option<serde_json::Value>,
}

impl TryFrom<RunOverview> for RunStatusResponse {
    type Error = ClosingError;

    fn try_from(overview: RunOverview) -> Result<Self, Self::Error> {
        let summary = overview.run.summary.as_ref().map(|s| s.to_json()).transpose()?;
        Ok(Self {
            run: RunResponse::from(&overview.run),
            units: overview.counts,
            opening_units: overview.opening_units,
            summary,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PauseResponse {
    pub run_id: Uuid,
    pub paused_units: u64,
}

/// What a start, resume or advance call did
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AdvanceResponse {
    Dispatched { units: usize },
    Waiting { queued: u64, running: u64 },
    Blocked { paused: u64 },
    Deferred,
    Posted { summary: PostingSummary },
    Skipped { status: RunStatus },
}

impl From<AdvanceOutcome> for AdvanceResponse {
    fn from(outcome: AdvanceOutcome) -> Self {
        match outcome {
            AdvanceOutcome::Dispatched(units) => AdvanceResponse::Dispatched { units },
            AdvanceOutcome::Waiting { queued, running } => AdvanceResponse::Waiting { queued, running },
            AdvanceOutcome::Blocked { paused } => AdvanceResponse::Blocked { paused },
            AdvanceOutcome::Deferred => AdvanceResponse::Deferred,
            AdvanceOutcome::Posted(summary) => AdvanceResponse::Posted { summary },
            AdvanceOutcome::Skipped(status) => AdvanceResponse::Skipped { status },
        }
    }
}
