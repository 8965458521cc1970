//! Typed error handling for pipeline runs.
//!
//! Failures are split by how a run reacts to them:
//! - Configuration errors fail the run before any side effect
//! - Enumeration, render and store errors are fatal to the current run and
//!   left to the caller's next scheduled invocation
//! - An unavailable transport aborts the run after a best-effort flush
//!
//! Per-recipient compose failures, bounces and transient transport errors
//! below the threshold are not errors at this level; they are recorded as
//! [`crate::DeliveryOutcome`]s.

use salvo_common::{JobId, QueueId};
use thiserror::Error;

/// Top-level error of a pipeline run
#[derive(Debug, Error)]
pub enum RunError {
    /// The run context or configuration is unusable.
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// The recipient queue could not be enumerated.
    #[error("Enumeration error: {0}")]
    Enumeration(#[from] QueueError),

    /// The template renderer failed for a whole batch.
    #[error("Render error: {0}")]
    Render(#[from] RenderError),

    /// The job store rejected a read or write.
    #[error("Job store error: {0}")]
    Store(#[from] StoreError),

    /// Too many consecutive transient transport errors; the transport is
    /// considered down.
    #[error("Transport unavailable after {consecutive} consecutive transient errors")]
    TransportUnavailable { consecutive: u32 },

    /// The legacy delivery path reported a failure.
    #[error("Legacy delivery failed: {0}")]
    Legacy(String),
}

impl RunError {
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    /// Returns `true` if the run was aborted because the transport is down.
    #[must_use]
    pub const fn is_fatal_transport(&self) -> bool {
        matches!(self, Self::TransportUnavailable { .. })
    }
}

/// Problems detected before a run touches any collaborator
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Missing mailing in run context")]
    MissingMailing,

    #[error("Missing job in run context")]
    MissingJob,

    /// A required collaborator was not supplied to the pipeline builder.
    #[error("Missing collaborator: {0}")]
    MissingCollaborator(&'static str),

    /// A configuration value is invalid.
    #[error("Invalid configuration for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("Invalid bounce pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Failed to parse configuration: {0}")]
    Parse(String),
}

/// Recipient enumeration failures
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Queue unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid page token: {0}")]
    InvalidToken(String),

    /// A page returned rows out of queue-id order, which would make resumed
    /// runs skip or repeat recipients.
    #[error("Queue returned {found} after {previous} for job {job_id}")]
    OutOfOrder {
        job_id: JobId,
        previous: QueueId,
        found: QueueId,
    },
}

/// Whole-batch renderer failures
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Template error: {0}")]
    Template(String),

    #[error("Renderer unavailable: {0}")]
    Unavailable(String),
}

/// Job store failures
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    #[error("Failed to write delivery results: {0}")]
    Write(String),

    #[error("Failed to read job state: {0}")]
    Read(String),
}

/// Returned by a [`crate::MessageMutator`]; drops only the affected message
#[derive(Debug, Error)]
#[error("{mutator} rejected message: {reason}")]
pub struct MutatorError {
    pub mutator: String,
    pub reason: String,
}

impl MutatorError {
    pub fn new(mutator: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            mutator: mutator.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_error_classification() {
        let error: RunError = ConfigurationError::MissingJob.into();
        assert!(error.is_configuration());
        assert!(!error.is_fatal_transport());

        let error = RunError::TransportUnavailable { consecutive: 6 };
        assert!(error.is_fatal_transport());
        assert!(!error.is_configuration());

        let error: RunError = QueueError::Unavailable("db down".to_string()).into();
        assert!(!error.is_configuration());
        assert!(!error.is_fatal_transport());
    }

    #[test]
    fn test_error_display() {
        let error: RunError = ConfigurationError::MissingMailing.into();
        assert_eq!(
            error.to_string(),
            "Configuration error: Missing mailing in run context"
        );

        let error = RunError::TransportUnavailable { consecutive: 6 };
        assert_eq!(
            error.to_string(),
            "Transport unavailable after 6 consecutive transient errors"
        );

        let error: RunError = QueueError::OutOfOrder {
            job_id: JobId::new(4),
            previous: QueueId::new(10),
            found: QueueId::new(9),
        }
        .into();
        assert_eq!(
            error.to_string(),
            "Enumeration error: Queue returned 9 after 10 for job 4"
        );
    }

    #[test]
    fn test_mutator_error_display() {
        let error = MutatorError::new("dkim", "no key");
        assert_eq!(error.to_string(), "dkim rejected message: no key");
    }
}
