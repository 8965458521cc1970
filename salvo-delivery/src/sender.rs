//! Per-batch delivery and accounting
//!
//! The [`Sender`] walks a composed batch in order and hands each ready
//! message to the transport. Deliveries are buffered and flushed to the
//! [`JobStore`] every `flush_interval` deliveries and at the end of the
//! batch. The job status is re-read after each interval flush so an
//! operator stop takes effect mid-batch; the boundary between batches is
//! left to the batcher, which checks the status before enumerating again.
//!
//! # Transient errors
//!
//! A run-local counter tracks consecutive transient failures. A delivery
//! resets it, a bounce decrements it (never below zero). While it stays at
//! or below `max_consecutive_transient_errors` the affected message is left
//! queued and the batch moves on. Past the threshold the transport is
//! considered down: pending deliveries are flushed and the run fails with
//! [`RunError::TransportUnavailable`].

use std::{sync::Arc, time::Duration};

use salvo_common::{ComposedMessage, ContactId, Job, Mailing, QueueId, Task, internal, outgoing};
use tracing::{debug, error, instrument, warn};

use crate::{
    composer::{Composition, PreparedTask, SkipReason},
    config::PipelineConfig,
    error::RunError,
    policy::{FailureClass, Throttle, TransientMatcher},
    traits::{
        BounceEvent, BouncePatternClassifier, BounceReason, DeliveryResult, JobStore, Transport,
    },
};

/// What happened to one task of a batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    Bounced(BounceReason),
    /// Left queued for a later run
    TransientError,
    /// Never handed to the transport
    Skipped(SkipReason),
}

/// Result of [`Sender::send_batch`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendReport {
    /// Delivered queue ids, in delivery order; all of them have been flushed
    pub delivered: Vec<QueueId>,
    /// Contact ids parallel to `delivered`
    pub contacts: Vec<ContactId>,
    /// One entry per attempted or skipped task, in batch order
    pub outcomes: Vec<(QueueId, DeliveryOutcome)>,
    /// `true` if every task of the batch was attempted
    pub completed: bool,
    /// The job was found stopped at an interval flush
    pub stopped: bool,
}

impl SendReport {
    fn count(&self, predicate: impl Fn(&DeliveryOutcome) -> bool) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| predicate(outcome))
            .count()
    }

    #[must_use]
    pub fn bounced(&self) -> usize {
        self.count(|outcome| matches!(outcome, DeliveryOutcome::Bounced(_)))
    }

    #[must_use]
    pub fn skipped(&self) -> usize {
        self.count(|outcome| matches!(outcome, DeliveryOutcome::Skipped(_)))
    }

    #[must_use]
    pub fn transient(&self) -> usize {
        self.count(|outcome| matches!(outcome, DeliveryOutcome::TransientError))
    }
}

/// Deliveries not yet written to the job store
#[derive(Debug, Default)]
struct PendingFlush {
    queue_ids: Vec<QueueId>,
    contact_ids: Vec<ContactId>,
}

impl PendingFlush {
    fn push(&mut self, queue_id: QueueId, contact_id: ContactId) {
        self.queue_ids.push(queue_id);
        self.contact_ids.push(contact_id);
    }

    fn len(&self) -> usize {
        self.queue_ids.len()
    }

    fn is_empty(&self) -> bool {
        self.queue_ids.is_empty()
    }
}

enum Flow {
    Continue,
    Stop,
}

/// Delivers composed batches for one run
///
/// A sender is created per run; its transient-error counter carries across
/// the batches of that run only.
pub struct Sender {
    transport: Arc<dyn Transport>,
    classifier: Arc<dyn BouncePatternClassifier>,
    store: Arc<dyn JobStore>,
    matcher: TransientMatcher,
    throttle: Throttle,
    timeout: Option<Duration>,
    flush_interval: usize,
    max_consecutive: u32,
    consecutive: u32,
}

impl std::fmt::Debug for Sender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sender")
            .field("throttle", &self.throttle)
            .field("timeout", &self.timeout)
            .field("flush_interval", &self.flush_interval)
            .field("max_consecutive", &self.max_consecutive)
            .field("consecutive", &self.consecutive)
            .finish_non_exhaustive()
    }
}

impl Sender {
    pub fn new(
        transport: Arc<dyn Transport>,
        classifier: Arc<dyn BouncePatternClassifier>,
        store: Arc<dyn JobStore>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            transport,
            classifier,
            store,
            matcher: TransientMatcher::new(&config.transient_error_patterns),
            throttle: Throttle::new(config.throttle()),
            timeout: config.transport_timeout(),
            flush_interval: config.flush_interval.max(1),
            max_consecutive: config.max_consecutive_transient_errors,
            consecutive: 0,
        }
    }

    /// Current run of consecutive transient errors
    #[must_use]
    pub const fn consecutive_transient(&self) -> u32 {
        self.consecutive
    }

    /// Deliver `batch` in order.
    ///
    /// # Errors
    ///
    /// - [`RunError::TransportUnavailable`] once the transient threshold is
    ///   exceeded, after flushing deliveries made so far
    /// - [`RunError::Store`] if a flush, bounce or status read fails. A
    ///   failed bounce write first flushes the deliveries made so far
    #[instrument(skip_all, fields(job_id = %job.id, size = batch.len()))]
    pub async fn send_batch(
        &mut self,
        batch: Vec<PreparedTask>,
        job: &Job,
        mailing: &Mailing,
    ) -> Result<SendReport, RunError> {
        let mut report = SendReport {
            outcomes: Vec::with_capacity(batch.len()),
            ..SendReport::default()
        };
        let mut pending = PendingFlush::default();

        for prepared in batch {
            let queue_id = prepared.task.queue_id();
            let message = match prepared.composition {
                Composition::Ready(message) => message,
                Composition::Skipped(reason) => {
                    debug!(queue_id = %queue_id, reason = %reason, "Not sending skipped task");
                    report
                        .outcomes
                        .push((queue_id, DeliveryOutcome::Skipped(reason)));
                    continue;
                }
            };

            let result = self.deliver(&message).await;
            let outcome = match self.matcher.classify(&result) {
                FailureClass::Delivered => {
                    self.consecutive = 0;
                    pending.push(queue_id, message.contact_id);
                    DeliveryOutcome::Delivered
                }
                FailureClass::Bounce(raw_error) => {
                    self.consecutive = self.consecutive.saturating_sub(1);
                    match self.bounce(job, &prepared.task, raw_error).await {
                        Ok(reason) => DeliveryOutcome::Bounced(reason),
                        Err(e) => {
                            // Earlier deliveries in this batch still need recording
                            if let Err(flush_error) =
                                self.flush(job, mailing, &mut pending, &mut report).await
                            {
                                warn!(error = %flush_error, "Flush after failed bounce failed");
                            }
                            return Err(e);
                        }
                    }
                }
                FailureClass::Transient(raw_error) => {
                    self.consecutive += 1;

                    if self.consecutive > self.max_consecutive {
                        error!(
                            queue_id = %queue_id,
                            consecutive = self.consecutive,
                            error = raw_error,
                            "Transport unavailable, aborting run"
                        );
                        self.flush(job, mailing, &mut pending, &mut report).await?;
                        return Err(RunError::TransportUnavailable {
                            consecutive: self.consecutive,
                        });
                    }

                    warn!(
                        queue_id = %queue_id,
                        consecutive = self.consecutive,
                        error = raw_error,
                        "Transient transport error, recipient stays queued"
                    );
                    DeliveryOutcome::TransientError
                }
            };
            report.outcomes.push((queue_id, outcome));

            if pending.len() >= self.flush_interval
                && let Flow::Stop = self.checkpoint(job, mailing, &mut pending, &mut report).await?
            {
                return Ok(report);
            }

            self.throttle.pause().await;
        }

        self.flush(job, mailing, &mut pending, &mut report).await?;

        report.completed = true;
        Ok(report)
    }

    async fn deliver(&self, message: &ComposedMessage) -> DeliveryResult {
        outgoing!("Sending {} to {}", message.queue_id, message.to_address);

        let result = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.transport.send(message))
                .await
                .unwrap_or_else(|_| DeliveryResult::Transient {
                    message: format!("transport call timed out after {limit:?}"),
                }),
            None => self.transport.send(message).await,
        };

        outgoing!("Transport answered {:?} for {}", result, message.queue_id);
        result
    }

    async fn bounce(
        &self,
        job: &Job,
        task: &Task,
        raw_error: &str,
    ) -> Result<BounceReason, RunError> {
        let reason = self.classifier.classify(raw_error);
        debug!(
            queue_id = %task.queue_id(),
            reason = %reason,
            error = raw_error,
            "Recording bounce"
        );

        self.store
            .record_bounce(&BounceEvent {
                job_id: job.id,
                queue_id: task.queue_id(),
                hash: Arc::from(task.hash()),
                reason: reason.clone(),
                raw_error: raw_error.to_string(),
            })
            .await?;

        Ok(reason)
    }

    /// Flush, then stop (after a final flush) if the job is no longer running
    async fn checkpoint(
        &self,
        job: &Job,
        mailing: &Mailing,
        pending: &mut PendingFlush,
        report: &mut SendReport,
    ) -> Result<Flow, RunError> {
        self.flush(job, mailing, pending, report).await?;

        let status = self.store.status(job.id).await?;
        if status.is_running() {
            return Ok(Flow::Continue);
        }

        internal!(
            level = INFO,
            "Job {} is {}, stopping after {} deliveries",
            job.id,
            status,
            report.delivered.len()
        );
        self.flush(job, mailing, pending, report).await?;
        report.stopped = true;

        Ok(Flow::Stop)
    }

    async fn flush(
        &self,
        job: &Job,
        mailing: &Mailing,
        pending: &mut PendingFlush,
        report: &mut SendReport,
    ) -> Result<(), RunError> {
        if pending.is_empty() {
            return Ok(());
        }

        let PendingFlush {
            queue_ids,
            contact_ids,
        } = std::mem::take(pending);

        self.store
            .flush(job.id, &queue_ids, &contact_ids, mailing, job.scheduled_date)
            .await?;
        internal!(
            level = DEBUG,
            "Flushed {} deliveries for job {}",
            queue_ids.len(),
            job.id
        );

        report.delivered.extend(queue_ids);
        report.contacts.extend(contact_ids);

        Ok(())
    }
}
