//! Run handlers
//!
//! Handlers are consulted in registration order before a run touches the
//! queue. The first one to abdicate hands the whole job to the
//! [`LegacyDelivery`](crate::LegacyDelivery) path.

use salvo_common::{Job, Mailing};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunDecision {
    Continue,
    Abdicate,
}

pub trait RunHandler: Send + Sync {
    fn on_run(&self, job: &Job, mailing: &Mailing) -> RunDecision;
}

/// Abdicates mailings that predate template types, and SMS mailings
///
/// Mailings without a `template_type` were authored for the legacy path
/// and are delivered there unless `force_pipeline` is set.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateTypeGate {
    force_pipeline: bool,
}

impl TemplateTypeGate {
    #[must_use]
    pub const fn new(force_pipeline: bool) -> Self {
        Self { force_pipeline }
    }
}

impl RunHandler for TemplateTypeGate {
    fn on_run(&self, _job: &Job, mailing: &Mailing) -> RunDecision {
        if self.force_pipeline {
            return RunDecision::Continue;
        }

        let has_template_type = mailing
            .template_type
            .as_deref()
            .is_some_and(|template_type| !template_type.is_empty());

        if has_template_type && mailing.sms_provider_id.is_none() {
            RunDecision::Continue
        } else {
            RunDecision::Abdicate
        }
    }
}
