//! Transient failure detection
//!
//! Transports that cannot tell a temporary failure from a permanent one
//! report [`DeliveryResult::Failed`]. Those messages are matched against a
//! list of known transient substrings (case-insensitive). Anything that
//! does not match is treated as a bounce.

use crate::traits::DeliveryResult;

/// How the sender should account for one transport result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureClass<'a> {
    Delivered,
    Transient(&'a str),
    Bounce(&'a str),
}

#[derive(Debug, Clone, Default)]
pub struct TransientMatcher {
    patterns: Vec<String>,
}

impl TransientMatcher {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            patterns: patterns
                .into_iter()
                .map(|pattern| pattern.as_ref().to_lowercase())
                .filter(|pattern| !pattern.is_empty())
                .collect(),
        }
    }

    #[must_use]
    pub fn is_transient(&self, message: &str) -> bool {
        let message = message.to_lowercase();
        self.patterns
            .iter()
            .any(|pattern| message.contains(pattern.as_str()))
    }

    #[must_use]
    pub fn classify<'a>(&self, result: &'a DeliveryResult) -> FailureClass<'a> {
        match result {
            DeliveryResult::Delivered => FailureClass::Delivered,
            DeliveryResult::Transient { message } => FailureClass::Transient(message),
            DeliveryResult::Bounced { message } => FailureClass::Bounce(message),
            DeliveryResult::Failed { message } if self.is_transient(message) => {
                FailureClass::Transient(message)
            }
            DeliveryResult::Failed { message } => FailureClass::Bounce(message),
        }
    }
}
