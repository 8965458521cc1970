//! Collaborator interfaces consumed by the pipeline
//!
//! The pipeline owns none of the storage, rendering or transport concerns;
//! it orchestrates them through the traits below. In-memory
//! implementations for development and tests live in [`crate::backends`].

use std::sync::Arc;

use ahash::AHashMap;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use salvo_common::{
    ComposedMessage, ContactId, Job, JobId, JobStatus, Mailing, MailingId, QueueId,
    RenderedContent, Task, TemplateSpec, TrackingAddresses,
};
use serde::{Deserialize, Serialize};

use crate::error::{QueueError, RenderError, RunError, StoreError};

/// Opaque continuation token for paged queue reads
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageToken(String);

impl PageToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One page of pending recipients
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub tasks: Vec<Task>,
    /// `None` once the queue is exhausted
    pub next: Option<PageToken>,
}

/// The persisted pending-recipient queue of a job
#[async_trait]
pub trait RecipientQueue: Send + Sync {
    /// Read the page following `token`, or the first page when `None`.
    ///
    /// Pages must be ordered by queue id. Rows consumed by flushes or
    /// bounces must not be returned again.
    ///
    /// # Errors
    ///
    /// Any I/O failure; the run treats it as fatal.
    async fn next_page(&self, job_id: JobId, token: Option<PageToken>)
    -> Result<Page, QueueError>;
}

/// Per-recipient input handed to the renderer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipientContext {
    pub job_id: JobId,
    pub mailing_id: MailingId,
    pub queue_id: QueueId,
    pub contact_id: ContactId,
    pub hash: Arc<str>,
    pub address: Arc<str>,
}

impl RecipientContext {
    #[must_use]
    pub fn new(job: &Job, task: &Task) -> Self {
        Self {
            job_id: job.id,
            mailing_id: job.mailing_id,
            queue_id: task.queue_id(),
            contact_id: task.contact_id(),
            hash: Arc::from(task.hash()),
            address: Arc::from(task.address()),
        }
    }
}

/// Renders templates for a whole batch at once
#[async_trait]
pub trait TemplateRenderer: Send + Sync {
    /// Render `templates` for every recipient.
    ///
    /// Recipients whose data cannot be resolved are left out of the returned
    /// map; the composer skips them.
    ///
    /// # Errors
    ///
    /// A failure that affects the whole batch (bad template, renderer down).
    async fn render_batch(
        &self,
        recipients: &[RecipientContext],
        templates: &TemplateSpec,
        language: Option<&str>,
    ) -> Result<AHashMap<QueueId, RenderedContent>, RenderError>;
}

/// Process-level locale the renderer evaluates under
pub trait Localizer: Send + Sync {
    fn locale(&self) -> String;

    fn set_locale(&self, locale: &str);
}

/// Builds per-recipient tracking addresses
pub trait AddressingService: Send + Sync {
    fn tracking_addresses(
        &self,
        job_id: JobId,
        queue_id: QueueId,
        hash: &str,
        address: &str,
    ) -> TrackingAddresses;

    /// Value of the `Message-ID` header for a recipient
    fn message_id(&self, job_id: JobId, queue_id: QueueId, hash: &str) -> String;
}

/// Outcome reported by the transport for one message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryResult {
    Delivered,
    /// Permanent rejection of this recipient
    Bounced { message: String },
    /// Failure the transport itself knows to be temporary
    Transient { message: String },
    /// Failure the transport did not classify; the sender inspects the text
    Failed { message: String },
}

/// Accepts fully composed messages for delivery
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, message: &ComposedMessage) -> DeliveryResult;
}

/// Bounce reason code, e.g. `Invalid` or `Quota`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BounceReason(Arc<str>);

impl BounceReason {
    pub const UNKNOWN: &'static str = "Unknown";

    pub fn new(reason: impl Into<Arc<str>>) -> Self {
        Self(reason.into())
    }

    #[must_use]
    pub fn unknown() -> Self {
        Self(Arc::from(Self::UNKNOWN))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BounceReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Maps transport error text to a bounce reason
pub trait BouncePatternClassifier: Send + Sync {
    fn classify(&self, raw_error: &str) -> BounceReason;
}

/// A permanent rejection recorded for one recipient
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BounceEvent {
    pub job_id: JobId,
    pub queue_id: QueueId,
    pub hash: Arc<str>,
    pub reason: BounceReason,
    pub raw_error: String,
}

/// Persistent job state and delivery accounting
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Record a set of deliveries. Both lists are parallel and in delivery
    /// order.
    ///
    /// # Errors
    ///
    /// Returns an error if the results could not be persisted.
    async fn flush(
        &self,
        job_id: JobId,
        delivered: &[QueueId],
        contacts: &[ContactId],
        mailing: &Mailing,
        scheduled_date: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// # Errors
    ///
    /// Returns an error if the bounce could not be persisted.
    async fn record_bounce(&self, event: &BounceEvent) -> Result<(), StoreError>;

    /// # Errors
    ///
    /// Returns an error if the job is unknown or unreadable.
    async fn status(&self, job_id: JobId) -> Result<JobStatus, StoreError>;

    /// # Errors
    ///
    /// Returns an error if the status could not be written.
    async fn mark_complete(&self, job_id: JobId) -> Result<(), StoreError>;
}

/// The delivery path used for mailings this pipeline abdicates
#[async_trait]
pub trait LegacyDelivery: Send + Sync {
    /// Deliver the whole job, returning whether it completed.
    ///
    /// # Errors
    ///
    /// Whatever the legacy path reports as failure.
    async fn deliver(&self, job: &Job, mailing: &Mailing) -> Result<bool, RunError>;
}
