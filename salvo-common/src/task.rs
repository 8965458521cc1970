//! Per-recipient delivery units

use std::{fmt, sync::Arc};

use serde::{Deserialize, Serialize};

/// Identifier of a pending-recipient row in the persisted queue.
///
/// Queue ids are assigned in insertion order, so sorting by them gives the
/// stable drain order the recipient source relies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueueId(u64);

impl QueueId {
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for QueueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of the contact a queue row belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContactId(u64);

impl ContactId {
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ContactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One recipient's delivery obligation within a job.
///
/// A task is immutable once read from the queue. Retries in later runs
/// re-read the same queue row and so produce an equal task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    queue_id: QueueId,
    contact_id: ContactId,
    /// Opaque per-recipient token used in tracking links (Arc for cheap cloning)
    hash: Arc<str>,
    /// Destination address, email or phone number depending on the channel
    address: Arc<str>,
}

impl Task {
    #[must_use]
    pub fn new(
        queue_id: QueueId,
        contact_id: ContactId,
        hash: impl Into<Arc<str>>,
        address: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            queue_id,
            contact_id,
            hash: hash.into(),
            address: address.into(),
        }
    }

    #[must_use]
    pub const fn queue_id(&self) -> QueueId {
        self.queue_id
    }

    #[must_use]
    pub const fn contact_id(&self) -> ContactId {
        self.contact_id
    }

    #[must_use]
    pub fn hash(&self) -> &str {
        &self.hash
    }

    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_accessors() {
        let task = Task::new(QueueId::new(7), ContactId::new(42), "abc123", "a@example.com");

        assert_eq!(task.queue_id(), QueueId::new(7));
        assert_eq!(task.contact_id().get(), 42);
        assert_eq!(task.hash(), "abc123");
        assert_eq!(task.address(), "a@example.com");
    }

    #[test]
    fn test_queue_ids_order_by_value() {
        let mut ids = vec![QueueId::new(3), QueueId::new(1), QueueId::new(2)];
        ids.sort();
        assert_eq!(ids, vec![QueueId::new(1), QueueId::new(2), QueueId::new(3)]);
        assert_eq!(QueueId::new(12).to_string(), "12");
    }
}
