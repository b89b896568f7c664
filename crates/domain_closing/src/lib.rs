//! Period Closing Domain
//!
//! This crate implements the period closing voucher job: the batch process that
//! walks a voucher's period one day at a time, aggregates ledger balances per
//! accounting dimension, and posts closing entries once every day is done.
//!
//! # Run Lifecycle
//!
//! ```text
//! Queued -> Running <-> Paused
//!              |
//!              v
//!           Posting -> Completed
//! ```
//!
//! # Components
//!
//! - **Dimension keys**: ordered grouping tuples for ledger rows
//! - **Aggregator**: per-day grouped balance sums for one report type
//! - **Worker**: processes one (date, report type) unit
//! - **Scheduler**: bounded batch dispatch, pause/resume, completion detection
//! - **Poster**: merges partial balances and posts closing entries atomically
//! - **Engine**: tokio work queue, worker pool and completion channel
//!
//! # Example
//!
//! ```rust,ignore
//! use domain_closing::{ClosingEngine, EngineConfig, ClosingPolicy};
//!
//! let engine = ClosingEngine::spawn(store, ledger, EngineConfig::default());
//! let service = engine.service();
//!
//! let run = service.create_run(voucher_id, ClosingPolicy::ProfitAndLossOnly).await?;
//! service.start(run.id).await?;
//! ```

pub mod account;
pub mod dimension;
pub mod balance;
pub mod aggregator;
pub mod gl_entry;
pub mod run;
pub mod events;
pub mod ports;
pub mod worker;
pub mod scheduler;
pub mod poster;
pub mod engine;
pub mod error;

#[cfg(any(test, feature = "mock"))]
pub mod memory;

pub use account::{Account, ReportType};
pub use dimension::{DimensionKey, DimensionSet, DimensionSource, DimensionValues};
pub use balance::{AccountBalance, BalanceRow, DimensionBalances, DimensionTotals};
pub use aggregator::{BalanceAggregator, BalanceQuery};
pub use gl_entry::GlEntry;
pub use run::{
    ClosingPolicy, PeriodClosingVoucher, PreparedRun, ProcessingUnit, RunStatus, UnitKey,
    UnitStatus, VoucherRun,
};
pub use events::{UnitCompleted, UnitTask, WorkerOutcome};
pub use ports::{ClosingStore, JobQueue, LedgerPort, UnitCounts};
pub use worker::DateWorker;
pub use scheduler::{AdvanceOutcome, BatchScheduler, DispatchMode, SchedulerConfig, DEFAULT_BATCH_SIZE};
pub use poster::{LedgerPoster, PostOutcome, PostingSummary};
pub use engine::{
    ChannelJobQueue, ClosingEngine, ClosingService, EngineConfig, RunOverview, DEFAULT_WORKER_COUNT,
};
pub use error::ClosingError;
