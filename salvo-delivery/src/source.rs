//! Paged iteration over a job's pending-recipient queue

use std::{collections::VecDeque, sync::Arc};

use salvo_common::{JobId, QueueId, Task};
use tracing::trace;

use crate::{
    error::QueueError,
    traits::{PageToken, RecipientQueue},
};

#[derive(Debug)]
enum Cursor {
    Start,
    At(PageToken),
    Exhausted,
}

/// Buffers queue pages and hands out tasks one at a time, in queue order.
///
/// Enumeration errors are returned as-is; a partially enumerated queue must
/// never be mistaken for a drained one.
pub struct RecipientSource {
    queue: Arc<dyn RecipientQueue>,
    job_id: JobId,
    buffer: VecDeque<Task>,
    cursor: Cursor,
    last_seen: Option<QueueId>,
    pages_read: usize,
}

impl RecipientSource {
    #[must_use]
    pub fn new(queue: Arc<dyn RecipientQueue>, job_id: JobId) -> Self {
        Self {
            queue,
            job_id,
            buffer: VecDeque::new(),
            cursor: Cursor::Start,
            last_seen: None,
            pages_read: 0,
        }
    }

    /// Whether another task is available, fetching pages as needed.
    ///
    /// Empty pages that still carry a continuation token are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if a page cannot be read or is out of order.
    pub async fn has_next(&mut self) -> Result<bool, QueueError> {
        while self.buffer.is_empty() {
            let token = match std::mem::replace(&mut self.cursor, Cursor::Exhausted) {
                Cursor::Exhausted => return Ok(false),
                Cursor::Start => None,
                Cursor::At(token) => Some(token),
            };

            let page = self.queue.next_page(self.job_id, token).await?;
            self.pages_read += 1;
            trace!(
                job_id = %self.job_id,
                rows = page.tasks.len(),
                more = page.next.is_some(),
                "Read recipient page"
            );

            for task in page.tasks {
                self.check_order(&task)?;
                self.buffer.push_back(task);
            }

            if let Some(next) = page.next {
                self.cursor = Cursor::At(next);
            }
        }

        Ok(true)
    }

    /// Take the next task, if one is available
    ///
    /// # Errors
    ///
    /// Returns an error if a page cannot be read or is out of order.
    pub async fn next_task(&mut self) -> Result<Option<Task>, QueueError> {
        if self.has_next().await? {
            Ok(self.buffer.pop_front())
        } else {
            Ok(None)
        }
    }

    #[must_use]
    pub const fn pages_read(&self) -> usize {
        self.pages_read
    }

    fn check_order(&mut self, task: &Task) -> Result<(), QueueError> {
        let found = task.queue_id();
        if let Some(previous) = self.last_seen
            && found <= previous
        {
            return Err(QueueError::OutOfOrder {
                job_id: self.job_id,
                previous,
                found,
            });
        }
        self.last_seen = Some(found);
        Ok(())
    }
}
