//! Closing engine
//!
//! Wires the scheduler, worker pool and completion channel together:
//!
//! ```text
//!  ClosingService::start ──► BatchScheduler ──► task channel ──► worker pool
//!                                 ▲                                   │
//!                                 └──── scheduler loop ◄── UnitCompleted
//! ```
//!
//! Workers never call the scheduler directly; they publish `UnitCompleted`
//! events that a single scheduler task consumes and turns into `advance` calls.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use core_kernel::{PortError, Precision, RunId, VoucherId};

use crate::aggregator::BalanceAggregator;
use crate::dimension::DimensionSet;
use crate::error::ClosingError;
use crate::events::{UnitCompleted, UnitTask, WorkerOutcome};
use crate::poster::LedgerPoster;
use crate::ports::{ClosingStore, JobQueue, LedgerPort, UnitCounts};
use crate::run::{ClosingPolicy, ProcessingUnit, VoucherRun};
use crate::scheduler::{AdvanceOutcome, BatchScheduler, DispatchMode, SchedulerConfig, DEFAULT_BATCH_SIZE};
use crate::worker::DateWorker;

/// Worker tasks spawned when the config names no other count
pub const DEFAULT_WORKER_COUNT: usize = 4;

/// Engine settings
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Units of one run in flight at once
    pub batch_size: usize,
    /// Worker tasks consuming the job queue
    pub worker_count: usize,
    /// Deliveries of a unit before a transient failure is given up on
    pub max_deliveries: u32,
    pub dispatch: DispatchMode,
    pub scheduler_active: bool,
    pub precision: Precision,
    pub dimensions: DimensionSet,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            worker_count: DEFAULT_WORKER_COUNT,
            max_deliveries: 3,
            dispatch: DispatchMode::Background,
            scheduler_active: true,
            precision: Precision::default(),
            dimensions: DimensionSet::standard(),
        }
    }
}

/// Job queue backed by the engine's task channel
#[derive(Debug, Clone)]
pub struct ChannelJobQueue {
    sender: mpsc::UnboundedSender<UnitTask>,
}

impl ChannelJobQueue {
    pub fn new(sender: mpsc::UnboundedSender<UnitTask>) -> Self {
        Self { sender }
    }
}

#[async_trait]
impl JobQueue for ChannelJobQueue {
    async fn enqueue(&self, task: UnitTask) -> Result<(), PortError> {
        self.sender
            .send(task)
            .map_err(|_| PortError::ServiceUnavailable {
                service: "closing job queue".to_string(),
            })
    }
}

/// A run with its unit counts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOverview {
    pub run: VoucherRun,
    pub counts: UnitCounts,
    /// Opening-balance units recorded for the run
    pub opening_units: usize,
}

/// Entry points of the closing job
#[derive(Clone)]
pub struct ClosingService {
    store: Arc<dyn ClosingStore>,
    ledger: Arc<dyn LedgerPort>,
    scheduler: Arc<BatchScheduler>,
}

impl ClosingService {
    pub fn new(
        store: Arc<dyn ClosingStore>,
        ledger: Arc<dyn LedgerPort>,
        scheduler: Arc<BatchScheduler>,
    ) -> Self {
        Self {
            store,
            ledger,
            scheduler,
        }
    }

    /// Creates a queued run for a voucher, with one unit per day and report type
    #[instrument(skip(self))]
    pub async fn create_run(
        &self,
        voucher_id: VoucherId,
        policy: ClosingPolicy,
    ) -> Result<VoucherRun, ClosingError> {
        let voucher = self
            .store
            .get_voucher(voucher_id)
            .await
            .map_err(|e| ClosingError::voucher_lookup(voucher_id, e))?;

        let opening_range = if policy.records_opening_balances() && voucher.is_first_closing {
            self.ledger.posting_date_range(&voucher.company).await?
        } else {
            None
        };

        let prepared = VoucherRun::prepare(&voucher, policy, opening_range);
        self.store.insert_run(&prepared).await?;

        info!(
            run_id = %prepared.run.id,
            units = prepared.units.len(),
            opening_units = prepared.opening_units.len(),
            "Closing run created"
        );
        Ok(prepared.run)
    }

    pub async fn start(&self, run_id: RunId) -> Result<AdvanceOutcome, ClosingError> {
        self.scheduler.start(run_id).await
    }

    pub async fn pause(&self, run_id: RunId) -> Result<u64, ClosingError> {
        self.scheduler.pause(run_id).await
    }

    pub async fn resume(&self, run_id: RunId) -> Result<AdvanceOutcome, ClosingError> {
        self.scheduler.resume(run_id).await
    }

    pub async fn advance(&self, run_id: RunId) -> Result<AdvanceOutcome, ClosingError> {
        self.scheduler.advance(run_id).await
    }

    /// The run with its unit counts
    pub async fn status(&self, run_id: RunId) -> Result<RunOverview, ClosingError> {
        let run = self
            .store
            .get_run(run_id)
            .await
            .map_err(|e| ClosingError::run_lookup(run_id, e))?;
        let counts = self.store.unit_counts(run_id).await?;
        let opening_units = self.store.opening_units(run_id).await?.len();
        Ok(RunOverview {
            run,
            counts,
            opening_units,
        })
    }

    /// Every unit of the run
    pub async fn units(&self, run_id: RunId) -> Result<Vec<ProcessingUnit>, ClosingError> {
        self.store
            .get_run(run_id)
            .await
            .map_err(|e| ClosingError::run_lookup(run_id, e))?;
        Ok(self.store.list_units(run_id).await?)
    }
}

/// Running engine: worker pool plus scheduler loop
pub struct ClosingEngine {
    service: ClosingService,
    handles: Vec<JoinHandle<()>>,
}

impl ClosingEngine {
    /// Builds the engine and spawns its tasks on the current runtime
    ///
    /// In inline mode no tasks are spawned; units run on the caller's task.
    pub fn spawn(store: Arc<dyn ClosingStore>, ledger: Arc<dyn LedgerPort>, config: EngineConfig) -> Self {
        let (task_tx, task_rx) = mpsc::unbounded_channel();
        let (done_tx, done_rx) = mpsc::unbounded_channel();
        let queue = Arc::new(ChannelJobQueue::new(task_tx));

        let worker = DateWorker::new(
            store.clone(),
            BalanceAggregator::new(ledger.clone()),
            config.dimensions.clone(),
        );
        let poster = LedgerPoster::new(
            store.clone(),
            ledger.clone(),
            config.dimensions.clone(),
            config.precision,
        );
        let scheduler = Arc::new(BatchScheduler::new(
            store.clone(),
            queue.clone(),
            worker.clone(),
            poster,
            SchedulerConfig {
                batch_size: config.batch_size,
                dispatch: config.dispatch,
                scheduler_active: config.scheduler_active,
            },
        ));

        let mut handles = Vec::new();
        if config.dispatch == DispatchMode::Background {
            let receiver = Arc::new(Mutex::new(task_rx));
            for index in 0..config.worker_count.max(1) {
                handles.push(tokio::spawn(worker_loop(
                    index,
                    worker.clone(),
                    receiver.clone(),
                    queue.clone(),
                    done_tx.clone(),
                    config.max_deliveries,
                )));
            }
            handles.push(tokio::spawn(scheduler_loop(scheduler.clone(), done_rx)));
            info!(workers = config.worker_count.max(1), "Closing engine started");
        }

        Self {
            service: ClosingService::new(store, ledger, scheduler),
            handles,
        }
    }

    pub fn service(&self) -> ClosingService {
        self.service.clone()
    }

    /// Stops the worker pool and scheduler loop
    ///
    /// Units in flight stay `Running` and are picked up by a later delivery.
    pub fn shutdown(self) {
        for handle in self.handles {
            handle.abort();
        }
        info!("Closing engine stopped");
    }
}

async fn worker_loop(
    index: usize,
    worker: DateWorker,
    receiver: Arc<Mutex<mpsc::UnboundedReceiver<UnitTask>>>,
    queue: Arc<ChannelJobQueue>,
    completions: mpsc::UnboundedSender<UnitCompleted>,
    max_deliveries: u32,
) {
    loop {
        let task = { receiver.lock().await.recv().await };
        let Some(task) = task else {
            debug!(worker = index, "Task channel closed, worker exiting");
            return;
        };

        match worker.process_individual_date(&task).await {
            Ok(WorkerOutcome::Completed(event)) => {
                if completions.send(event).is_err() {
                    warn!(worker = index, "Scheduler loop gone, completion dropped");
                }
            }
            Ok(WorkerOutcome::Skipped { .. }) => {}
            Err(err) if err.is_transient() && task.delivery < max_deliveries => {
                warn!(
                    worker = index,
                    unit = %task.key(),
                    delivery = task.delivery,
                    error = %err,
                    "Transient failure, redelivering unit"
                );
                if let Err(send_err) = queue.enqueue(task.redelivered()).await {
                    error!(unit = %task.key(), error = %send_err, "Redelivery failed, unit left running");
                }
            }
            Err(err) => {
                error!(
                    worker = index,
                    unit = %task.key(),
                    delivery = task.delivery,
                    error = %err,
                    "Unit failed and stays running"
                );
            }
        }
    }
}

async fn scheduler_loop(scheduler: Arc<BatchScheduler>, mut completions: mpsc::UnboundedReceiver<UnitCompleted>) {
    while let Some(event) = completions.recv().await {
        let run_id = event.key.run_id;
        match scheduler.advance(run_id).await {
            Ok(outcome) => debug!(%run_id, ?outcome, "Run advanced"),
            Err(err) => error!(%run_id, error = %err, "Advancing run failed"),
        }
    }
}
