//! Run orchestration
//!
//! A [`Pipeline`] is built once from its collaborators and can run any
//! number of jobs. Every run owns its [`Batcher`] and [`Sender`], so the
//! per-run ceiling and the transient-error counter never leak between
//! runs.

use std::sync::Arc;

use salvo_common::{Job, Mailing, job_event};
use tracing::{Span, info, instrument, warn};

use crate::{
    batcher::{BatchStep, Batcher, WalkOutcome},
    bounce::PatternBounceClassifier,
    composer::Composer,
    config::PipelineConfig,
    error::{ConfigurationError, RunError},
    mutator::{MessageMutator, MutatorChain},
    policy::{RunDecision, RunHandler, TemplateTypeGate},
    sender::{SendReport, Sender},
    source::RecipientSource,
    traits::{
        AddressingService, BouncePatternClassifier, JobStore, LegacyDelivery, Localizer,
        RecipientQueue, TemplateRenderer, Transport,
    },
};

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunOutcome {
    /// The queue was drained; the job has been marked complete
    #[default]
    Complete,
    /// The per-run ceiling was reached with recipients left
    Deferred,
    /// The job was found stopped between batches
    Aborted,
    /// The job was found stopped at a flush boundary inside a batch
    Stopped,
    /// A run handler gave the job to the legacy delivery path
    Abdicated,
}

/// Summary of one [`Pipeline::run`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    /// `false` means the job needs another run
    pub completed: bool,
    pub outcome: RunOutcome,
    pub batches: usize,
    pub delivered: usize,
    pub bounced: usize,
    pub skipped: usize,
    pub transient: usize,
}

impl RunReport {
    const fn abdicated(completed: bool) -> Self {
        Self {
            completed,
            outcome: RunOutcome::Abdicated,
            batches: 0,
            delivered: 0,
            bounced: 0,
            skipped: 0,
            transient: 0,
        }
    }

    fn absorb(&mut self, sent: &SendReport) {
        self.batches += 1;
        self.delivered += sent.delivered.len();
        self.bounced += sent.bounced();
        self.skipped += sent.skipped();
        self.transient += sent.transient();
    }
}

/// The job and mailing a run operates on
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    job: Option<Job>,
    mailing: Option<Arc<Mailing>>,
}

impl RunContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_job(mut self, job: Job) -> Self {
        self.job = Some(job);
        self
    }

    #[must_use]
    pub fn with_mailing(mut self, mailing: impl Into<Arc<Mailing>>) -> Self {
        self.mailing = Some(mailing.into());
        self
    }

    #[must_use]
    pub const fn job(&self) -> Option<&Job> {
        self.job.as_ref()
    }

    #[must_use]
    pub fn mailing(&self) -> Option<&Mailing> {
        self.mailing.as_deref()
    }

    /// # Errors
    ///
    /// Returns an error if the mailing or the job is missing.
    pub fn validate(&self) -> Result<(&Job, &Mailing), ConfigurationError> {
        let mailing = self.mailing().ok_or(ConfigurationError::MissingMailing)?;
        let job = self.job().ok_or(ConfigurationError::MissingJob)?;
        Ok((job, mailing))
    }
}

/// Collects the collaborators of a [`Pipeline`]
///
/// The queue, job store, renderer, addressing service and transport are
/// required. The bounce classifier defaults to
/// [`PatternBounceClassifier::with_defaults`]. A [`TemplateTypeGate`] is
/// always consulted before any handler registered here.
#[derive(Default)]
pub struct PipelineBuilder {
    config: PipelineConfig,
    queue: Option<Arc<dyn RecipientQueue>>,
    store: Option<Arc<dyn JobStore>>,
    renderer: Option<Arc<dyn TemplateRenderer>>,
    addressing: Option<Arc<dyn AddressingService>>,
    transport: Option<Arc<dyn Transport>>,
    classifier: Option<Arc<dyn BouncePatternClassifier>>,
    localizer: Option<Arc<dyn Localizer>>,
    handlers: Vec<Arc<dyn RunHandler>>,
    mutators: MutatorChain,
    legacy: Option<Arc<dyn LegacyDelivery>>,
}

impl PipelineBuilder {
    #[must_use]
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn queue(mut self, queue: Arc<dyn RecipientQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    #[must_use]
    pub fn store(mut self, store: Arc<dyn JobStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Use one backend as both the recipient queue and the job store
    #[must_use]
    pub fn mail_store<S>(self, store: Arc<S>) -> Self
    where
        S: RecipientQueue + JobStore + 'static,
    {
        let queue: Arc<dyn RecipientQueue> = store.clone();
        self.queue(queue).store(store)
    }

    #[must_use]
    pub fn renderer(mut self, renderer: Arc<dyn TemplateRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    #[must_use]
    pub fn addressing(mut self, addressing: Arc<dyn AddressingService>) -> Self {
        self.addressing = Some(addressing);
        self
    }

    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    #[must_use]
    pub fn classifier(mut self, classifier: Arc<dyn BouncePatternClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    #[must_use]
    pub fn localizer(mut self, localizer: Arc<dyn Localizer>) -> Self {
        self.localizer = Some(localizer);
        self
    }

    #[must_use]
    pub fn handler(mut self, handler: Arc<dyn RunHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    #[must_use]
    pub fn mutator(mut self, mutator: Arc<dyn MessageMutator>) -> Self {
        self.mutators.register(mutator);
        self
    }

    #[must_use]
    pub fn legacy(mut self, legacy: Arc<dyn LegacyDelivery>) -> Self {
        self.legacy = Some(legacy);
        self
    }

    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or a required
    /// collaborator is missing.
    pub fn build(self) -> Result<Pipeline, ConfigurationError> {
        self.config.validate()?;

        let queue = self
            .queue
            .ok_or(ConfigurationError::MissingCollaborator("recipient queue"))?;
        let store = self
            .store
            .ok_or(ConfigurationError::MissingCollaborator("job store"))?;
        let renderer = self
            .renderer
            .ok_or(ConfigurationError::MissingCollaborator("template renderer"))?;
        let addressing = self
            .addressing
            .ok_or(ConfigurationError::MissingCollaborator("addressing service"))?;
        let transport = self
            .transport
            .ok_or(ConfigurationError::MissingCollaborator("transport"))?;
        let classifier = match self.classifier {
            Some(classifier) => classifier,
            None => Arc::new(PatternBounceClassifier::with_defaults()?),
        };

        let mut handlers: Vec<Arc<dyn RunHandler>> =
            vec![Arc::new(TemplateTypeGate::new(self.config.force_pipeline))];
        handlers.extend(self.handlers);

        let composer = Composer::new(
            renderer,
            addressing,
            self.localizer,
            self.config.default_language.clone(),
        );

        Ok(Pipeline {
            config: self.config,
            queue,
            store,
            composer,
            transport,
            classifier,
            handlers,
            mutators: self.mutators,
            legacy: self.legacy,
        })
    }
}

/// Delivers jobs through Batcher → Composer → Mutators → Sender
pub struct Pipeline {
    config: PipelineConfig,
    queue: Arc<dyn RecipientQueue>,
    store: Arc<dyn JobStore>,
    composer: Composer,
    transport: Arc<dyn Transport>,
    classifier: Arc<dyn BouncePatternClassifier>,
    handlers: Vec<Arc<dyn RunHandler>>,
    mutators: MutatorChain,
    legacy: Option<Arc<dyn LegacyDelivery>>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("handlers", &self.handlers.len())
            .field("mutators", &self.mutators)
            .field("legacy", &self.legacy.is_some())
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    #[must_use]
    pub fn builder(config: PipelineConfig) -> PipelineBuilder {
        PipelineBuilder::new(config)
    }

    #[must_use]
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Deliver one job until its queue is drained, the per-run ceiling is
    /// reached, an operator stops it, or the transport is found down.
    ///
    /// # Errors
    ///
    /// - [`RunError::Configuration`] before any side effect if the context
    ///   lacks a job or mailing, or a mailing is abdicated with no legacy
    ///   path registered
    /// - [`RunError::TransportUnavailable`] after flushing, when too many
    ///   consecutive transient errors occur
    /// - Queue, render and store failures as they happen
    #[instrument(skip_all, fields(job_id))]
    pub async fn run(&self, context: RunContext) -> Result<RunReport, RunError> {
        let (job, mailing) = context.validate()?;
        Span::current().record("job_id", tracing::field::display(job.id));

        if let Some(report) = self.abdicate(job, mailing).await? {
            return Ok(report);
        }

        info!(
            mailing_id = %mailing.id,
            max_batch_size = self.config.max_batch_size,
            max_total_per_run = self.config.max_total_per_run,
            "Starting delivery run"
        );

        let source = RecipientSource::new(self.queue.clone(), job.id);
        let mut batcher = Batcher::new(
            source,
            self.store.clone(),
            job.id,
            self.config.max_batch_size,
            self.config.max_total_per_run,
        );
        let mut sender = Sender::new(
            self.transport.clone(),
            self.classifier.clone(),
            self.store.clone(),
            &self.config,
        );

        let mut report = RunReport::default();
        let outcome = loop {
            let batch = match batcher.next_batch().await? {
                BatchStep::Batch(batch) => batch,
                BatchStep::Done(WalkOutcome::Complete) => break RunOutcome::Complete,
                BatchStep::Done(WalkOutcome::DeferredNotComplete) => break RunOutcome::Deferred,
                BatchStep::Done(WalkOutcome::Aborted) => break RunOutcome::Aborted,
            };

            let mut prepared = self.composer.compose(batch, job, mailing).await?;
            self.mutators.alter(&mut prepared);

            let sent = match sender.send_batch(prepared, job, mailing).await {
                Ok(sent) => sent,
                Err(e) => {
                    warn!(
                        error = %e,
                        batches = report.batches + 1,
                        delivered = report.delivered,
                        "Delivery run failed"
                    );
                    return Err(e);
                }
            };
            report.absorb(&sent);

            if !sent.completed {
                break RunOutcome::Stopped;
            }
        };

        report.outcome = outcome;
        report.completed = outcome == RunOutcome::Complete;

        if report.completed {
            self.store.mark_complete(job.id).await?;
        }

        info!(
            outcome = ?report.outcome,
            batches = report.batches,
            processed = batcher.processed(),
            delivered = report.delivered,
            bounced = report.bounced,
            skipped = report.skipped,
            transient = report.transient,
            "Delivery run finished"
        );

        Ok(report)
    }

    /// Consult the run handlers; the first abdication hands the job to the
    /// legacy path
    async fn abdicate(&self, job: &Job, mailing: &Mailing) -> Result<Option<RunReport>, RunError> {
        let abdicated = self
            .handlers
            .iter()
            .any(|handler| handler.on_run(job, mailing) == RunDecision::Abdicate);
        if !abdicated {
            return Ok(None);
        }

        let legacy = self
            .legacy
            .as_ref()
            .ok_or(ConfigurationError::MissingCollaborator("legacy delivery"))?;

        job_event!(
            job.id,
            level = INFO,
            "Mailing {} abdicated to legacy delivery",
            mailing.id
        );
        let completed = legacy.deliver(job, mailing).await?;

        Ok(Some(RunReport::abdicated(completed)))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_context_requires_mailing_and_job() {
        let job = Job::new(
            salvo_common::JobId::new(1),
            salvo_common::MailingId::new(1),
            chrono::Utc::now(),
        );

        let error = RunContext::new().with_job(job.clone()).validate().unwrap_err();
        assert!(matches!(error, ConfigurationError::MissingMailing));

        let error = RunContext::new()
            .with_mailing(Mailing::default())
            .validate()
            .unwrap_err();
        assert!(matches!(error, ConfigurationError::MissingJob));

        let context = RunContext::new().with_job(job).with_mailing(Mailing::default());
        assert!(context.validate().is_ok());
    }

    #[test]
    fn test_builder_reports_missing_collaborator() {
        let error = Pipeline::builder(PipelineConfig::default())
            .build()
            .unwrap_err();

        assert!(matches!(
            error,
            ConfigurationError::MissingCollaborator("recipient queue")
        ));
    }

    #[test]
    fn test_builder_rejects_invalid_config() {
        let config = PipelineConfig {
            max_batch_size: 0,
            ..PipelineConfig::default()
        };
        let error = Pipeline::builder(config).build().unwrap_err();

        assert!(matches!(
            error,
            ConfigurationError::Invalid {
                field: "max_batch_size",
                ..
            }
        ));
    }

    #[test]
    fn test_report_absorbs_batches() {
        let mut report = RunReport::default();
        let sent = SendReport {
            delivered: vec![salvo_common::QueueId::new(1)],
            contacts: vec![salvo_common::ContactId::new(1)],
            outcomes: vec![
                (
                    salvo_common::QueueId::new(1),
                    crate::DeliveryOutcome::Delivered,
                ),
                (
                    salvo_common::QueueId::new(2),
                    crate::DeliveryOutcome::TransientError,
                ),
            ],
            completed: true,
            stopped: false,
        };

        report.absorb(&sent);
        report.absorb(&sent);

        assert_eq!(report.batches, 2);
        assert_eq!(report.delivered, 2);
        assert_eq!(report.transient, 2);
        assert_eq!(report.bounced, 0);
    }
}
