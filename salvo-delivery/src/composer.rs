//! Per-batch message composition

use std::sync::Arc;

use salvo_common::{Channel, ComposedMessage, Headers, Job, Mailing, RenderedContent, Task};
use tracing::{debug, instrument, warn};

use crate::{
    batcher::Batch,
    error::RenderError,
    traits::{AddressingService, Localizer, RecipientContext, TemplateRenderer},
};

/// Why a task produced no transport-ready message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The renderer could not resolve the recipient (e.g. contact deleted)
    Unresolved,
    /// The destination address does not parse
    InvalidAddress(String),
    /// A registered mutator rejected the message
    Mutator(String),
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unresolved => f.write_str("recipient could not be resolved"),
            Self::InvalidAddress(address) => write!(f, "invalid address {address}"),
            Self::Mutator(reason) => write!(f, "rejected by mutator: {reason}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Composition {
    Ready(Box<ComposedMessage>),
    Skipped(SkipReason),
}

/// A task together with what composition made of it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedTask {
    pub task: Task,
    pub composition: Composition,
}

impl PreparedTask {
    #[must_use]
    pub fn message(&self) -> Option<&ComposedMessage> {
        match &self.composition {
            Composition::Ready(message) => Some(message.as_ref()),
            Composition::Skipped(_) => None,
        }
    }

    #[must_use]
    pub const fn is_ready(&self) -> bool {
        matches!(self.composition, Composition::Ready(_))
    }
}

/// Switches the process locale for the lifetime of the guard
struct LocaleGuard {
    localizer: Arc<dyn Localizer>,
    previous: String,
}

impl LocaleGuard {
    fn swap(localizer: Arc<dyn Localizer>, locale: &str) -> Self {
        let previous = localizer.locale();
        localizer.set_locale(locale);
        Self {
            localizer,
            previous,
        }
    }
}

impl Drop for LocaleGuard {
    fn drop(&mut self) {
        self.localizer.set_locale(&self.previous);
    }
}

/// Builds transport-ready messages for a batch.
///
/// The renderer is invoked once per batch. Tasks it cannot resolve are
/// skipped rather than failing the batch; they are not marked delivered and
/// stay in the queue for a later run.
pub struct Composer {
    renderer: Arc<dyn TemplateRenderer>,
    addressing: Arc<dyn AddressingService>,
    localizer: Option<Arc<dyn Localizer>>,
    default_language: String,
}

impl Composer {
    #[must_use]
    pub fn new(
        renderer: Arc<dyn TemplateRenderer>,
        addressing: Arc<dyn AddressingService>,
        localizer: Option<Arc<dyn Localizer>>,
        default_language: impl Into<String>,
    ) -> Self {
        Self {
            renderer,
            addressing,
            localizer,
            default_language: default_language.into(),
        }
    }

    /// The language override for a mailing, if it differs from the default
    fn language_override<'m>(&self, mailing: &'m Mailing) -> Option<&'m str> {
        mailing
            .language
            .as_deref()
            .filter(|language| !language.is_empty() && *language != self.default_language)
    }

    /// Compose every task of `batch`, preserving order and length.
    ///
    /// # Errors
    ///
    /// Returns an error only if the renderer fails for the whole batch.
    #[instrument(level = "debug", skip_all, fields(job_id = %job.id, size = batch.len()))]
    pub async fn compose(
        &self,
        batch: Batch,
        job: &Job,
        mailing: &Mailing,
    ) -> Result<Vec<PreparedTask>, RenderError> {
        let contexts: Vec<_> = batch
            .tasks()
            .iter()
            .map(|task| RecipientContext::new(job, task))
            .collect();
        let templates = mailing.templates();
        let language = self.language_override(mailing);

        let mut rendered = {
            let _locale = language
                .zip(self.localizer.clone())
                .map(|(language, localizer)| LocaleGuard::swap(localizer, language));

            self.renderer
                .render_batch(&contexts, &templates, language)
                .await?
        };

        let prepared: Vec<_> = batch
            .into_tasks()
            .into_iter()
            .map(|task| {
                let composition = match rendered.remove(&task.queue_id()) {
                    Some(content) => self.build(&task, content, job, mailing),
                    None => Composition::Skipped(SkipReason::Unresolved),
                };
                if let Composition::Skipped(reason) = &composition {
                    warn!(
                        job_id = %job.id,
                        queue_id = %task.queue_id(),
                        reason = %reason,
                        "Skipping recipient, it stays queued for a later run"
                    );
                }
                PreparedTask { task, composition }
            })
            .collect();

        debug!(
            ready = prepared.iter().filter(|p| p.is_ready()).count(),
            "Composed batch"
        );

        Ok(prepared)
    }

    fn build(
        &self,
        task: &Task,
        content: RenderedContent,
        job: &Job,
        mailing: &Mailing,
    ) -> Composition {
        if mailing.channel() == Channel::Email && !is_valid_address(task.address()) {
            return Composition::Skipped(SkipReason::InvalidAddress(task.address().to_string()));
        }

        let verp = self.addressing.tracking_addresses(
            job.id,
            task.queue_id(),
            task.hash(),
            task.address(),
        );
        let from = mailing.from_header();

        let mut headers = Headers::new();
        headers.set("Return-Path", verp.bounce.as_str());
        headers.set("From", from.as_str());
        headers.set("List-Unsubscribe", format!("<mailto:{}>", verp.unsubscribe));
        headers.set(
            "Message-ID",
            self.addressing
                .message_id(job.id, task.queue_id(), task.hash()),
        );
        headers.set("Precedence", "bulk");
        headers.set("X-Salvo-Bounce", verp.bounce.as_str());
        let reply_to = mailing
            .replyto_email
            .as_deref()
            .filter(|reply| !reply.is_empty() && *reply != from)
            .unwrap_or(verp.reply.as_str());
        headers.set("Reply-To", reply_to);

        Composition::Ready(Box::new(ComposedMessage {
            job_id: job.id,
            queue_id: task.queue_id(),
            contact_id: task.contact_id(),
            headers,
            subject: content.subject,
            text: Some(content.text).filter(|text| !text.is_empty()),
            html: Some(content.html).filter(|html| !html.is_empty()),
            attachments: mailing.attachments.clone(),
            to_name: Some(content.to_name).filter(|name| !name.is_empty()),
            to_address: task.address().to_string(),
        }))
    }
}

fn is_valid_address(address: &str) -> bool {
    mailparse::addrparse(address).is_ok_and(|list| {
        list.extract_single_info()
            .is_some_and(|info| info.addr.contains('@'))
    })
}
