//! Mailing job records
//!
//! A job is owned by the external job store. The pipeline only reads its
//! status, except for flipping it to [`JobStatus::Complete`] at the end of a
//! fully drained run.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::MailingId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(u64);

impl JobId {
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a job, written by operators and the control plane
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobStatus {
    Scheduled,
    Running,
    Paused,
    Canceled,
    Complete,
}

impl JobStatus {
    /// Whether delivery for the job may continue
    #[must_use]
    pub const fn is_running(self) -> bool {
        matches!(self, Self::Running)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = match self {
            Self::Scheduled => "Scheduled",
            Self::Running => "Running",
            Self::Paused => "Paused",
            Self::Canceled => "Canceled",
            Self::Complete => "Complete",
        };
        f.write_str(status)
    }
}

/// One execution record of a mailing
///
/// The live status is not part of the record; it is read from the job store
/// whenever the pipeline needs it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub mailing_id: MailingId,
    /// When the job was scheduled, passed through to every flush
    pub scheduled_date: DateTime<Utc>,
}

impl Job {
    #[must_use]
    pub const fn new(id: JobId, mailing_id: MailingId, scheduled_date: DateTime<Utc>) -> Self {
        Self {
            id,
            mailing_id,
            scheduled_date,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_only_running_is_running() {
        assert!(JobStatus::Running.is_running());
        assert!(!JobStatus::Paused.is_running());
        assert!(!JobStatus::Canceled.is_running());
        assert!(!JobStatus::Complete.is_running());
        assert!(!JobStatus::Scheduled.is_running());
    }

    #[test]
    fn test_job_record_carries_no_status() {
        let job = Job::new(JobId::new(1), MailingId::new(2), Utc::now());
        assert_eq!(job.id.to_string(), "1");

        let record = ron::to_string(&job).unwrap();
        assert!(!record.contains("status"));
        assert_eq!(ron::from_str::<Job>(&record).unwrap(), job);
    }
}
