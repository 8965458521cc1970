//! Composed, transport-ready messages

use serde::{Deserialize, Serialize};

use crate::{Attachment, ContactId, JobId, QueueId};

/// Per-recipient output of the template renderer
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RenderedContent {
    pub subject: String,
    pub text: String,
    pub html: String,
    pub to_name: String,
}

/// VERP-style addresses encoding the job, queue row and tracking hash
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingAddresses {
    pub bounce: String,
    pub unsubscribe: String,
    pub reply: String,
}

/// Ordered header list with case-insensitive lookup.
///
/// Insertion order is kept so the serialized message matches the order the
/// composer wrote headers in.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Set a header, replacing any existing value with the same name
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        if let Some(entry) = self
            .0
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(&name))
        {
            entry.1 = value;
        } else {
            self.0.push((name, value));
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        let index = self
            .0
            .iter()
            .position(|(existing, _)| existing.eq_ignore_ascii_case(name))?;
        Some(self.0.remove(index).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(name, value)| (name.as_str(), value.as_str()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Everything the transport needs to deliver one message.
///
/// Owned by the pipeline for the duration of one batch; never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComposedMessage {
    pub job_id: JobId,
    pub queue_id: QueueId,
    pub contact_id: ContactId,
    pub headers: Headers,
    pub subject: String,
    pub text: Option<String>,
    pub html: Option<String>,
    pub attachments: Vec<Attachment>,
    pub to_name: Option<String>,
    pub to_address: String,
}

impl ComposedMessage {
    /// The `To` header value.
    ///
    /// The display name is dropped when it repeats the address or looks like
    /// an address itself; otherwise it is quoted.
    #[must_use]
    pub fn to_header(&self) -> String {
        let address = self.to_address.trim();
        match self.to_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() && name != address && !name.contains('@') => {
                format!("{} <{address}>", quote_display_name(name))
            }
            _ => format!("<{address}>"),
        }
    }
}

/// Quote a display name per RFC 2822 when it contains specials
fn quote_display_name(name: &str) -> String {
    const SPECIALS: &[char] = &[
        '(', ')', '<', '>', '[', ']', ':', ';', '@', '\\', ',', '.', '"',
    ];

    if name.contains(SPECIALS) {
        let escaped = name.replace('\\', "\\\\").replace('"', "\\\"");
        format!("\"{escaped}\"")
    } else {
        name.to_string()
    }
}
