//! Groups queued recipients into bounded batches
//!
//! The batcher enforces the two limits that keep one run from monopolising a
//! worker: the batch size bounds memory per compose/send cycle, and the
//! per-run ceiling bounds the total work of an invocation. It also polls the
//! job status between batches so an operator stop takes effect at the next
//! boundary.

use std::sync::Arc;

use salvo_common::{JobId, Task, internal};
use tracing::{debug, info};

use crate::{error::RunError, source::RecipientSource, traits::JobStore};

/// An ordered, non-empty group of tasks processed together
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    tasks: Vec<Task>,
}

impl Batch {
    fn new(tasks: Vec<Task>) -> Self {
        debug_assert!(!tasks.is_empty(), "batches are never empty");
        Self { tasks }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    #[must_use]
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    #[must_use]
    pub fn into_tasks(self) -> Vec<Task> {
        self.tasks
    }
}

/// How a walk over the queue ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkOutcome {
    /// The queue was drained
    Complete,
    /// The per-run ceiling was reached with work remaining
    DeferredNotComplete,
    /// The job stopped running between batches
    Aborted,
}

/// What the batcher produced on one call to [`Batcher::next_batch`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchStep {
    Batch(Batch),
    Done(WalkOutcome),
}

pub struct Batcher {
    source: RecipientSource,
    store: Arc<dyn JobStore>,
    job_id: JobId,
    max_batch_size: usize,
    max_total_per_run: usize,
    /// Tasks taken from the queue during this run
    processed: usize,
    batches: usize,
    finished: Option<WalkOutcome>,
}

impl Batcher {
    /// `max_total_per_run == 0` disables the per-run ceiling.
    #[must_use]
    pub fn new(
        source: RecipientSource,
        store: Arc<dyn JobStore>,
        job_id: JobId,
        max_batch_size: usize,
        max_total_per_run: usize,
    ) -> Self {
        Self {
            source,
            store,
            job_id,
            max_batch_size: max_batch_size.max(1),
            max_total_per_run,
            processed: 0,
            batches: 0,
            finished: None,
        }
    }

    #[must_use]
    pub const fn processed(&self) -> usize {
        self.processed
    }

    fn ceiling_reached(&self) -> bool {
        self.max_total_per_run > 0 && self.processed >= self.max_total_per_run
    }

    /// Produce the next batch, or the outcome of the walk.
    ///
    /// Once a [`BatchStep::Done`] has been returned, every later call returns
    /// the same outcome without touching the queue.
    ///
    /// # Errors
    ///
    /// Enumeration and job store failures are returned and end the walk.
    pub async fn next_batch(&mut self) -> Result<BatchStep, RunError> {
        if let Some(outcome) = self.finished {
            return Ok(BatchStep::Done(outcome));
        }

        if self.batches > 0 {
            let status = self.store.status(self.job_id).await?;
            if !status.is_running() {
                info!(
                    job_id = %self.job_id,
                    status = %status,
                    batches = self.batches,
                    "Job no longer running, stopping between batches"
                );
                return Ok(self.finish(WalkOutcome::Aborted, Vec::new()));
            }
        }

        let mut tasks = Vec::with_capacity(self.max_batch_size);
        while tasks.len() < self.max_batch_size {
            if !self.source.has_next().await? {
                return Ok(self.finish(WalkOutcome::Complete, tasks));
            }

            if self.ceiling_reached() {
                debug!(
                    job_id = %self.job_id,
                    processed = self.processed,
                    ceiling = self.max_total_per_run,
                    "Per-run ceiling reached, deferring remaining recipients"
                );
                return Ok(self.finish(WalkOutcome::DeferredNotComplete, tasks));
            }

            if let Some(task) = self.source.next_task().await? {
                self.processed += 1;
                tasks.push(task);
            }
        }

        Ok(self.dispatch(tasks))
    }

    fn dispatch(&mut self, tasks: Vec<Task>) -> BatchStep {
        self.batches += 1;
        internal!(
            "Dispatching batch {} of {} recipients for job {}",
            self.batches,
            tasks.len(),
            self.job_id
        );
        BatchStep::Batch(Batch::new(tasks))
    }

    /// Record the outcome, yielding any partial batch first
    fn finish(&mut self, outcome: WalkOutcome, tasks: Vec<Task>) -> BatchStep {
        self.finished = Some(outcome);
        if tasks.is_empty() {
            BatchStep::Done(outcome)
        } else {
            self.dispatch(tasks)
        }
    }
}
