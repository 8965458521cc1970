//! In-memory recipient queue and job store

use std::{collections::BTreeMap, ops::Bound, sync::Arc};

use ahash::AHashMap;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use salvo_common::{ContactId, JobId, JobStatus, Mailing, MailingId, QueueId, Task};

use crate::{
    config::PipelineConfig,
    error::{QueueError, StoreError},
    traits::{BounceEvent, JobStore, Page, PageToken, RecipientQueue},
};

const DEFAULT_PAGE_SIZE: usize = 500;

/// A delivery persisted by [`JobStore::flush`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryRecord {
    pub queue_id: QueueId,
    pub contact_id: ContactId,
    pub mailing_id: MailingId,
    pub scheduled_date: DateTime<Utc>,
}

#[derive(Debug)]
struct JobState {
    status: JobStatus,
    pending: BTreeMap<QueueId, Task>,
    delivered: Vec<DeliveryRecord>,
    flushes: Vec<Vec<QueueId>>,
    completions: usize,
}

impl Default for JobState {
    fn default() -> Self {
        Self {
            status: JobStatus::Running,
            pending: BTreeMap::new(),
            delivered: Vec::new(),
            flushes: Vec::new(),
            completions: 0,
        }
    }
}

#[derive(Debug, Default)]
struct State {
    jobs: AHashMap<JobId, JobState>,
    bounces: Vec<BounceEvent>,
}

/// In-memory recipient queue and job store
///
/// Pending rows are kept ordered by queue id and paged with a keyset token
/// (the last queue id of the previous page), so rows removed by a flush or a
/// bounce while a run is reading never shift later pages. Clones share the
/// same state.
#[derive(Debug, Clone)]
pub struct MemoryMailStore {
    state: Arc<Mutex<State>>,
    page_size: usize,
}

impl Default for MemoryMailStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryMailStore {
    #[must_use]
    pub fn new() -> Self {
        Self::with_page_size(DEFAULT_PAGE_SIZE)
    }

    /// A page size of zero is raised to one
    #[must_use]
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            page_size: page_size.max(1),
        }
    }

    /// Page with the configured `page_size`
    #[must_use]
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::with_page_size(config.page_size)
    }

    #[must_use]
    pub const fn page_size(&self) -> usize {
        self.page_size
    }

    /// Add a pending recipient, creating the job as `Running` if unknown
    pub fn enqueue(&self, job_id: JobId, task: Task) {
        self.state
            .lock()
            .jobs
            .entry(job_id)
            .or_default()
            .pending
            .insert(task.queue_id(), task);
    }

    pub fn set_status(&self, job_id: JobId, status: JobStatus) {
        self.state.lock().jobs.entry(job_id).or_default().status = status;
    }

    #[must_use]
    pub fn status_of(&self, job_id: JobId) -> Option<JobStatus> {
        self.state.lock().jobs.get(&job_id).map(|job| job.status)
    }

    #[must_use]
    pub fn pending_count(&self, job_id: JobId) -> usize {
        self.state
            .lock()
            .jobs
            .get(&job_id)
            .map_or(0, |job| job.pending.len())
    }

    /// Pending queue ids in order
    #[must_use]
    pub fn pending(&self, job_id: JobId) -> Vec<QueueId> {
        self.state
            .lock()
            .jobs
            .get(&job_id)
            .map(|job| job.pending.keys().copied().collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn delivered(&self, job_id: JobId) -> Vec<DeliveryRecord> {
        self.state
            .lock()
            .jobs
            .get(&job_id)
            .map(|job| job.delivered.clone())
            .unwrap_or_default()
    }

    /// The queue ids of every flush call, in call order
    #[must_use]
    pub fn flushes(&self, job_id: JobId) -> Vec<Vec<QueueId>> {
        self.state
            .lock()
            .jobs
            .get(&job_id)
            .map(|job| job.flushes.clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn bounces(&self) -> Vec<BounceEvent> {
        self.state.lock().bounces.clone()
    }

    /// Number of times the job was marked complete
    #[must_use]
    pub fn completions(&self, job_id: JobId) -> usize {
        self.state
            .lock()
            .jobs
            .get(&job_id)
            .map_or(0, |job| job.completions)
    }
}

#[async_trait]
impl RecipientQueue for MemoryMailStore {
    async fn next_page(
        &self,
        job_id: JobId,
        token: Option<PageToken>,
    ) -> Result<Page, QueueError> {
        let after = token
            .map(|token| {
                token
                    .as_str()
                    .parse::<u64>()
                    .map(QueueId::new)
                    .map_err(|_| QueueError::InvalidToken(token.as_str().to_string()))
            })
            .transpose()?;

        let state = self.state.lock();
        let Some(job) = state.jobs.get(&job_id) else {
            return Ok(Page::default());
        };

        let lower = after.map_or(Bound::Unbounded, Bound::Excluded);
        let mut remaining = job
            .pending
            .range((lower, Bound::Unbounded))
            .map(|(_, task)| task)
            .peekable();

        let tasks: Vec<Task> = remaining.by_ref().take(self.page_size).cloned().collect();
        let next = match (remaining.peek(), tasks.last()) {
            (Some(_), Some(last)) => Some(PageToken::new(last.queue_id().to_string())),
            _ => None,
        };

        Ok(Page { tasks, next })
    }
}

#[async_trait]
impl JobStore for MemoryMailStore {
    async fn flush(
        &self,
        job_id: JobId,
        delivered: &[QueueId],
        contacts: &[ContactId],
        mailing: &Mailing,
        scheduled_date: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        if delivered.len() != contacts.len() {
            return Err(StoreError::Write(format!(
                "{} queue ids but {} contact ids",
                delivered.len(),
                contacts.len()
            )));
        }

        let mut state = self.state.lock();
        let job = state.jobs.entry(job_id).or_default();

        for (queue_id, contact_id) in delivered.iter().zip(contacts) {
            job.pending.remove(queue_id);
            job.delivered.push(DeliveryRecord {
                queue_id: *queue_id,
                contact_id: *contact_id,
                mailing_id: mailing.id,
                scheduled_date,
            });
        }
        job.flushes.push(delivered.to_vec());

        Ok(())
    }

    async fn record_bounce(&self, event: &BounceEvent) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        if let Some(job) = state.jobs.get_mut(&event.job_id) {
            job.pending.remove(&event.queue_id);
        }
        state.bounces.push(event.clone());

        Ok(())
    }

    async fn status(&self, job_id: JobId) -> Result<JobStatus, StoreError> {
        self.state
            .lock()
            .jobs
            .get(&job_id)
            .map(|job| job.status)
            .ok_or(StoreError::JobNotFound(job_id))
    }

    async fn mark_complete(&self, job_id: JobId) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        let job = state
            .jobs
            .get_mut(&job_id)
            .ok_or(StoreError::JobNotFound(job_id))?;

        job.status = JobStatus::Complete;
        job.completions += 1;

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::traits::BounceReason;

    const JOB: JobId = JobId::new(3);

    fn task(id: u64) -> Task {
        Task::new(
            QueueId::new(id),
            ContactId::new(id + 1000),
            format!("h{id}"),
            format!("r{id}@example.com"),
        )
    }

    fn ids(page: &Page) -> Vec<u64> {
        page.tasks.iter().map(|task| task.queue_id().get()).collect()
    }

    #[tokio::test]
    async fn test_pages_in_queue_order() {
        let store = MemoryMailStore::with_page_size(2);
        for id in [5, 1, 3, 2, 4] {
            store.enqueue(JOB, task(id));
        }

        let first = store.next_page(JOB, None).await.unwrap();
        assert_eq!(ids(&first), vec![1, 2]);

        let second = store.next_page(JOB, first.next).await.unwrap();
        assert_eq!(ids(&second), vec![3, 4]);

        let third = store.next_page(JOB, second.next).await.unwrap();
        assert_eq!(ids(&third), vec![5]);
        assert!(third.next.is_none());
    }

    #[tokio::test]
    async fn test_configured_page_size_drives_paging() {
        let config = PipelineConfig::from_ron("(page_size: 1)").unwrap();
        let store = MemoryMailStore::from_config(&config);
        for id in 1..=3 {
            store.enqueue(JOB, task(id));
        }

        assert_eq!(store.page_size(), 1);
        let first = store.next_page(JOB, None).await.unwrap();
        assert_eq!(ids(&first), vec![1]);
        let second = store.next_page(JOB, first.next).await.unwrap();
        assert_eq!(ids(&second), vec![2]);

        assert_eq!(
            MemoryMailStore::from_config(&PipelineConfig::default()).page_size(),
            500
        );
    }

    #[tokio::test]
    async fn test_flush_removes_rows_without_shifting_pages() {
        let store = MemoryMailStore::with_page_size(2);
        for id in 1..=6 {
            store.enqueue(JOB, task(id));
        }
        let mailing = Mailing {
            id: MailingId::new(9),
            ..Default::default()
        };

        let first = store.next_page(JOB, None).await.unwrap();
        store
            .flush(
                JOB,
                &[QueueId::new(1), QueueId::new(2)],
                &[ContactId::new(1001), ContactId::new(1002)],
                &mailing,
                Utc::now(),
            )
            .await
            .unwrap();

        let second = store.next_page(JOB, first.next).await.unwrap();
        assert_eq!(ids(&second), vec![3, 4]);
        assert_eq!(store.pending_count(JOB), 4);
        assert_eq!(store.delivered(JOB).len(), 2);
        assert_eq!(store.delivered(JOB)[0].mailing_id, MailingId::new(9));
        assert_eq!(
            store.flushes(JOB),
            vec![vec![QueueId::new(1), QueueId::new(2)]]
        );
    }

    #[tokio::test]
    async fn test_bounce_removes_pending_row() {
        let store = MemoryMailStore::new();
        store.enqueue(JOB, task(1));
        store.enqueue(JOB, task(2));

        store
            .record_bounce(&BounceEvent {
                job_id: JOB,
                queue_id: QueueId::new(1),
                hash: Arc::from("h1"),
                reason: BounceReason::new("Invalid"),
                raw_error: "550 user unknown".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(store.pending(JOB), vec![QueueId::new(2)]);
        assert_eq!(store.bounces().len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_token_is_rejected() {
        let store = MemoryMailStore::new();
        store.enqueue(JOB, task(1));

        let error = store
            .next_page(JOB, Some(PageToken::new("not-a-number")))
            .await
            .unwrap_err();

        assert!(matches!(error, QueueError::InvalidToken(_)));
    }

    #[tokio::test]
    async fn test_status_and_completion() {
        let store = MemoryMailStore::new();
        assert!(matches!(
            store.status(JOB).await,
            Err(StoreError::JobNotFound(_))
        ));

        store.enqueue(JOB, task(1));
        assert_eq!(store.status(JOB).await.unwrap(), JobStatus::Running);

        store.mark_complete(JOB).await.unwrap();
        assert_eq!(store.status_of(JOB), Some(JobStatus::Complete));
        assert_eq!(store.completions(JOB), 1);
    }

    #[tokio::test]
    async fn test_mismatched_flush_lists_are_rejected() {
        let store = MemoryMailStore::new();
        let error = store
            .flush(
                JOB,
                &[QueueId::new(1)],
                &[],
                &Mailing::default(),
                Utc::now(),
            )
            .await
            .unwrap_err();

        assert!(matches!(error, StoreError::Write(_)));
    }
}
