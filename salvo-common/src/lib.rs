//! Shared types for the salvo bulk-mail pipeline
//!
//! This crate holds the data that flows between pipeline stages:
//! - [`Task`]: one recipient's delivery obligation within a job
//! - [`Job`] and [`Mailing`]: the externally owned run record and template
//! - [`ComposedMessage`]: a transport-ready message for a single recipient
//!
//! It also provides the logging bootstrap used by binaries embedding the
//! pipeline.

pub mod job;
pub mod logging;
pub mod mailing;
pub mod message;
pub mod task;

pub use job::{Job, JobId, JobStatus};
pub use mailing::{Attachment, Channel, Mailing, MailingId, TemplateSpec};
pub use message::{ComposedMessage, Headers, RenderedContent, TrackingAddresses};
pub use task::{ContactId, QueueId, Task};
pub use tracing;
