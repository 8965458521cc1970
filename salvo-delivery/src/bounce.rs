//! Regex based bounce classification
//!
//! Rules are `(reason, pattern)` pairs compiled into a single
//! case-insensitive [`RegexSet`]. The first rule (in insertion order) that
//! matches the transport's error text decides the reason; text matching no
//! rule is classified as [`BounceReason::UNKNOWN`].

use regex::{RegexSet, RegexSetBuilder};

use crate::{
    error::ConfigurationError,
    traits::{BouncePatternClassifier, BounceReason},
};

/// Default rules, grouped by reason, roughly ordered from most to least
/// specific
const DEFAULT_RULES: &[(&str, &[&str])] = &[
    (
        "Away",
        &[
            r"\bauto[- ]?reply\b",
            r"\bout of (the )?office\b",
            r"\bvacation\b",
        ],
    ),
    (
        "Relay",
        &[r"relay(ing)? (access )?denied", r"\bnot permitted to relay\b"],
    ),
    (
        "Spam",
        &[
            r"\bspam\b",
            r"\bblock(ed|list(ed)?)\b",
            r"\bblacklist(ed)?\b",
            r"\bpolicy (violation|reasons)\b",
        ],
    ),
    (
        "Quota",
        &[
            r"\bquota\b",
            r"mailbox (is )?full",
            r"\bover ?(the )?limit\b",
            r"\binsufficient (disk )?(space|storage)\b",
        ],
    ),
    (
        "Inactive",
        &[
            r"\b(account|mailbox) (is )?(disabled|inactive|suspended|expired)\b",
            r"\bno longer (active|in use)\b",
        ],
    ),
    (
        "Invalid",
        &[
            r"\buser unknown\b",
            r"\bunknown (user|recipient|mailbox)\b",
            r"\bno such (user|mailbox|recipient)\b",
            r"\b(recipient|mailbox) (address )?(rejected|unavailable|not found)\b",
            r"\b5\.1\.1\b",
        ],
    ),
    (
        "Dns",
        &[
            r"\bhost (or domain name )?not found\b",
            r"\bdomain (name )?not found\b",
            r"\bno mx\b",
            r"\bname service error\b",
        ],
    ),
    (
        "Host",
        &[r"\bconnection (refused|timed out)\b", r"\bhost unreachable\b"],
    ),
    ("Loop", &[r"\bmail loop\b", r"\btoo many hops\b"]),
    ("Syntax", &[r"\bsyntax error\b", r"\bmalformed address\b"]),
];

/// Collects rules before compilation
#[derive(Debug, Default)]
pub struct PatternBounceClassifierBuilder {
    rules: Vec<(BounceReason, String)>,
}

impl PatternBounceClassifierBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn rule(mut self, reason: impl Into<String>, pattern: impl Into<String>) -> Self {
        let reason: String = reason.into();
        self.rules.push((BounceReason::new(reason), pattern.into()));
        self
    }

    /// Append the built-in rules after any already added
    #[must_use]
    pub fn with_default_rules(mut self) -> Self {
        for (reason, patterns) in DEFAULT_RULES {
            for pattern in *patterns {
                self = self.rule(*reason, *pattern);
            }
        }
        self
    }

    /// # Errors
    ///
    /// Returns an error if any pattern fails to compile.
    pub fn build(self) -> Result<PatternBounceClassifier, ConfigurationError> {
        let (reasons, patterns): (Vec<_>, Vec<_>) = self.rules.into_iter().unzip();
        let set = RegexSetBuilder::new(patterns)
            .case_insensitive(true)
            .build()?;

        Ok(PatternBounceClassifier { set, reasons })
    }
}

#[derive(Debug, Clone)]
pub struct PatternBounceClassifier {
    set: RegexSet,
    reasons: Vec<BounceReason>,
}

impl PatternBounceClassifier {
    #[must_use]
    pub fn builder() -> PatternBounceClassifierBuilder {
        PatternBounceClassifierBuilder::new()
    }

    /// A classifier with only the built-in rules
    ///
    /// # Errors
    ///
    /// Returns an error if a built-in rule fails to compile.
    pub fn with_defaults() -> Result<Self, ConfigurationError> {
        Self::builder().with_default_rules().build()
    }
}

impl BouncePatternClassifier for PatternBounceClassifier {
    fn classify(&self, raw_error: &str) -> BounceReason {
        self.set
            .matches(raw_error)
            .iter()
            .next()
            .and_then(|index| self.reasons.get(index))
            .cloned()
            .unwrap_or_else(BounceReason::unknown)
    }
}
