//! Period closing domain errors

use thiserror::Error;

use core_kernel::{PortError, RunId, TemporalError, VoucherId};

/// Errors that can occur in the period closing domain
#[derive(Debug, Error)]
pub enum ClosingError {
    #[error("Voucher run not found: {0}")]
    RunNotFound(RunId),

    #[error("Period closing voucher not found: {0}")]
    VoucherNotFound(VoucherId),

    #[error("Invalid status transition from {from} to {to}")]
    InvalidStatusTransition { from: String, to: String },

    #[error("Invalid dimension configuration: {0}")]
    InvalidDimensions(String),

    #[error("Invalid dimension key '{key}': expected {expected} components, found {found}")]
    InvalidDimensionKey {
        key: String,
        expected: usize,
        found: usize,
    },

    #[error("Closing balance missing for unit {0}")]
    MissingClosingBalance(String),

    #[error("Invalid period: {0}")]
    InvalidPeriod(#[from] TemporalError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Posting failed for run {run_id}: {source}")]
    PostingFailed {
        run_id: RunId,
        #[source]
        source: PortError,
    },

    #[error(transparent)]
    Port(#[from] PortError),
}

impl ClosingError {
    /// Maps a failed run lookup, turning not-found into `RunNotFound`
    pub fn run_lookup(run_id: RunId, error: PortError) -> Self {
        if error.is_not_found() {
            ClosingError::RunNotFound(run_id)
        } else {
            ClosingError::Port(error)
        }
    }

    /// Maps a failed voucher lookup, turning not-found into `VoucherNotFound`
    pub fn voucher_lookup(voucher_id: VoucherId, error: PortError) -> Self {
        if error.is_not_found() {
            ClosingError::VoucherNotFound(voucher_id)
        } else {
            ClosingError::Port(error)
        }
    }

    /// Returns true if retrying the same operation may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            ClosingError::Port(e) => e.is_transient(),
            ClosingError::PostingFailed { source, .. } => source.is_transient(),
            _ => false,
        }
    }
}
