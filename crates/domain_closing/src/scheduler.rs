//! Batch scheduler
//!
//! Drives a run through its lifecycle:
//!
//! ```text
//! Queued -> Running -> {Paused <-> Running} -> Posting -> Completed
//! ```
//!
//! At most `batch_size` units of a run are `Running` at once. Every call
//! recomputes what to do from storage, so concurrent calls for the same run
//! are safe: the claim is atomic per run and the poster is guarded by the
//! `Running -> Posting` transition.

use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use core_kernel::RunId;
use serde::{Deserialize, Serialize};

use crate::error::ClosingError;
use crate::events::UnitTask;
use crate::poster::{LedgerPoster, PostOutcome, PostingSummary};
use crate::ports::{ClosingStore, JobQueue};
use crate::run::{RunStatus, UnitKey, UnitStatus};
use crate::worker::DateWorker;

/// Default number of units of one run in flight at once
pub const DEFAULT_BATCH_SIZE: usize = 4;

/// How claimed units are executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    /// Handed to the job queue and processed by the worker pool
    #[default]
    Background,
    /// Processed on the caller's task before the call returns
    Inline,
}

/// Scheduler settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub batch_size: usize,
    pub dispatch: DispatchMode,
    /// When false, nothing is claimed; runs wait until the scheduler is enabled
    pub scheduler_active: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            dispatch: DispatchMode::Background,
            scheduler_active: true,
        }
    }
}

/// What a scheduling step did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdvanceOutcome {
    /// Units were claimed and handed to the job queue
    Dispatched(usize),
    /// Nothing to claim yet; in-flight units will advance the run again
    Waiting { queued: u64, running: u64 },
    /// Every remaining unit is paused
    Blocked { paused: u64 },
    /// The scheduler is inactive
    Deferred,
    /// The run was posted and is now `Completed`
    Posted(PostingSummary),
    /// The run's status made this call a no-op
    Skipped(RunStatus),
}

/// Schedules the units of voucher runs
#[derive(Clone)]
pub struct BatchScheduler {
    store: Arc<dyn ClosingStore>,
    queue: Arc<dyn JobQueue>,
    worker: DateWorker,
    poster: LedgerPoster,
    config: SchedulerConfig,
}

impl BatchScheduler {
    pub fn new(
        store: Arc<dyn ClosingStore>,
        queue: Arc<dyn JobQueue>,
        worker: DateWorker,
        poster: LedgerPoster,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            store,
            queue,
            worker,
            poster,
            config,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Starts a `Queued` run or tops up a `Running` one
    ///
    /// A paused run must be resumed instead; `Posting` and `Completed` runs
    /// are left alone.
    #[instrument(skip(self))]
    pub async fn start(&self, run_id: RunId) -> Result<AdvanceOutcome, ClosingError> {
        let run = self
            .store
            .get_run(run_id)
            .await
            .map_err(|e| ClosingError::run_lookup(run_id, e))?;

        match run.status {
            RunStatus::Queued | RunStatus::Running => {
                let started = self
                    .store
                    .transition_run(run_id, &[RunStatus::Queued, RunStatus::Running], RunStatus::Running)
                    .await?;
                if !started {
                    let current = self
                        .store
                        .get_run(run_id)
                        .await
                        .map_err(|e| ClosingError::run_lookup(run_id, e))?;
                    return Ok(AdvanceOutcome::Skipped(current.status));
                }
                if run.status == RunStatus::Queued {
                    info!("Run started");
                }
                self.step(run_id).await
            }
            status => {
                debug!(%status, "Start ignored");
                Ok(AdvanceOutcome::Skipped(status))
            }
        }
    }

    /// Pauses a run: no new units are claimed, in-flight units finish
    ///
    /// Returns the number of queued units that were paused.
    #[instrument(skip(self))]
    pub async fn pause(&self, run_id: RunId) -> Result<u64, ClosingError> {
        let paused = self
            .store
            .transition_run(
                run_id,
                &[RunStatus::Queued, RunStatus::Running, RunStatus::Paused],
                RunStatus::Paused,
            )
            .await?;
        if !paused {
            let run = self
                .store
                .get_run(run_id)
                .await
                .map_err(|e| ClosingError::run_lookup(run_id, e))?;
            return Err(ClosingError::InvalidStatusTransition {
                from: run.status.to_string(),
                to: RunStatus::Paused.to_string(),
            });
        }

        let units = self
            .store
            .transition_all_units(run_id, UnitStatus::Queued, UnitStatus::Paused)
            .await?;
        info!(paused_units = units, "Run paused");
        Ok(units)
    }

    /// Resumes a paused run and starts claiming again
    #[instrument(skip(self))]
    pub async fn resume(&self, run_id: RunId) -> Result<AdvanceOutcome, ClosingError> {
        let resumed = self
            .store
            .transition_run(
                run_id,
                &[RunStatus::Paused, RunStatus::Queued, RunStatus::Running],
                RunStatus::Running,
            )
            .await?;
        if !resumed {
            let run = self
                .store
                .get_run(run_id)
                .await
                .map_err(|e| ClosingError::run_lookup(run_id, e))?;
            return Err(ClosingError::InvalidStatusTransition {
                from: run.status.to_string(),
                to: RunStatus::Running.to_string(),
            });
        }

        let units = self
            .store
            .transition_all_units(run_id, UnitStatus::Paused, UnitStatus::Queued)
            .await?;
        info!(requeued_units = units, "Run resumed");
        self.start(run_id).await
    }

    /// Claims more units if there is capacity, or posts the run once every
    /// unit is done
    #[instrument(skip(self))]
    pub async fn advance(&self, run_id: RunId) -> Result<AdvanceOutcome, ClosingError> {
        self.step(run_id).await
    }

    async fn step(&self, run_id: RunId) -> Result<AdvanceOutcome, ClosingError> {
        if !self.config.scheduler_active {
            debug!("Scheduler inactive, nothing claimed");
            return Ok(AdvanceOutcome::Deferred);
        }

        let claimed = self.store.claim_units(run_id, self.config.batch_size).await?;
        if claimed.is_empty() {
            return self.complete_if_done(run_id).await;
        }

        match self.config.dispatch {
            DispatchMode::Background => {
                let count = claimed.len();
                self.enqueue(claimed).await?;
                debug!(count, "Units dispatched");
                Ok(AdvanceOutcome::Dispatched(count))
            }
            DispatchMode::Inline => {
                self.run_inline(run_id, claimed).await?;
                self.complete_if_done(run_id).await
            }
        }
    }

    async fn enqueue(&self, claimed: Vec<UnitKey>) -> Result<(), ClosingError> {
        for (index, key) in claimed.iter().enumerate() {
            if let Err(err) = self.queue.enqueue(UnitTask::new(*key)).await {
                warn!(unit = %key, error = %err, "Enqueue failed, returning claimed units to the queue");
                self.release(claimed[index..].iter()).await?;
                return Err(err.into());
            }
        }
        Ok(())
    }

    /// Processes claimed units on the caller's task
    ///
    /// On error the failed unit and every unit not yet attempted go back to
    /// `Queued`, so a later start or advance claims them again.
    async fn run_inline(&self, run_id: RunId, claimed: Vec<UnitKey>) -> Result<(), ClosingError> {
        let mut pending: VecDeque<UnitKey> = claimed.into();
        while let Some(key) = pending.pop_front() {
            let next = match self.worker.process_individual_date(&UnitTask::new(key)).await {
                Ok(outcome) if outcome.is_completed() => {
                    self.store
                        .claim_units(run_id, self.config.batch_size)
                        .await
                        .map_err(ClosingError::from)
                }
                Ok(_) => Ok(Vec::new()),
                Err(err) => Err(err),
            };

            match next {
                Ok(claimed) => pending.extend(claimed),
                Err(err) => {
                    warn!(unit = %key, error = %err, "Inline unit failed, returning units to the queue");
                    if let Err(release) = self.release(std::iter::once(&key).chain(pending.iter())).await {
                        warn!(error = %release, "Could not return units to the queue");
                    }
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    async fn release<'a>(&self, keys: impl Iterator<Item = &'a UnitKey>) -> Result<(), ClosingError> {
        for key in keys {
            self.store
                .transition_unit(key, UnitStatus::Running, UnitStatus::Queued)
                .await?;
        }
        Ok(())
    }

    async fn complete_if_done(&self, run_id: RunId) -> Result<AdvanceOutcome, ClosingError> {
        let counts = self.store.unit_counts(run_id).await?;
        if counts.queued > 0 || counts.running > 0 {
            return Ok(AdvanceOutcome::Waiting {
                queued: counts.queued,
                running: counts.running,
            });
        }
        if counts.paused > 0 {
            return Ok(AdvanceOutcome::Blocked { paused: counts.paused });
        }

        match self.poster.summarize_and_post(run_id).await? {
            PostOutcome::Posted(summary) => Ok(AdvanceOutcome::Posted(summary)),
            PostOutcome::NotReady(counts) => Ok(AdvanceOutcome::Waiting {
                queued: counts.queued,
                running: counts.running,
            }),
            PostOutcome::Skipped(status) => Ok(AdvanceOutcome::Skipped(status)),
        }
    }
}
