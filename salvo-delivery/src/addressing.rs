//! VERP-style tracking addresses
//!
//! Every recipient gets bounce, unsubscribe and reply addresses that encode
//! `(job, queue row, hash)`, so an inbound bounce or reply can be matched
//! back to the exact delivery without keeping per-message state:
//!
//! ```text
//! <local>b.<job>.<queue>.<hash>@<domain>    bounce / Return-Path
//! <local>u.<job>.<queue>.<hash>@<domain>    unsubscribe
//! <local>r.<job>.<queue>.<hash>@<domain>    reply
//! <<local>m.<job>.<queue>.<hash>@<domain>>  Message-ID
//! ```

use salvo_common::{JobId, QueueId, TrackingAddresses};
use serde::Deserialize;

use crate::traits::AddressingService;

#[derive(Debug, Clone, Deserialize)]
pub struct VerpAddressing {
    /// Prefix of every generated local part, usually ending in a separator
    /// such as `+`
    pub local_part: String,
    pub domain: String,
}

impl VerpAddressing {
    pub fn new(local_part: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            local_part: local_part.into(),
            domain: domain.into(),
        }
    }

    fn address(&self, action: char, job_id: JobId, queue_id: QueueId, hash: &str) -> String {
        format!(
            "{}{action}.{job_id}.{queue_id}.{hash}@{}",
            self.local_part, self.domain
        )
    }
}

impl AddressingService for VerpAddressing {
    fn tracking_addresses(
        &self,
        job_id: JobId,
        queue_id: QueueId,
        hash: &str,
        _address: &str,
    ) -> TrackingAddresses {
        TrackingAddresses {
            bounce: self.address('b', job_id, queue_id, hash),
            unsubscribe: self.address('u', job_id, queue_id, hash),
            reply: self.address('r', job_id, queue_id, hash),
        }
    }

    fn message_id(&self, job_id: JobId, queue_id: QueueId, hash: &str) -> String {
        format!("<{}>", self.address('m', job_id, queue_id, hash))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_addresses_encode_tracking_ids() {
        let verp = VerpAddressing::new("mail+", "lists.example.org");
        let addresses =
            verp.tracking_addresses(JobId::new(12), QueueId::new(345), "f00d", "x@example.com");

        assert_eq!(addresses.bounce, "mail+b.12.345.f00d@lists.example.org");
        assert_eq!(addresses.unsubscribe, "mail+u.12.345.f00d@lists.example.org");
        assert_eq!(addresses.reply, "mail+r.12.345.f00d@lists.example.org");
        assert_eq!(
            verp.message_id(JobId::new(12), QueueId::new(345), "f00d"),
            "<mail+m.12.345.f00d@lists.example.org>"
        );
    }
}
