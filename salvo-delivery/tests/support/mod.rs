//! Collaborators shared by the integration tests
#![allow(dead_code)] // Test utility module - not all helpers used in every test
#![allow(clippy::expect_used)]

use std::{
    collections::VecDeque,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use ahash::AHashMap;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use salvo_common::{
    ComposedMessage, ContactId, Job, JobId, JobStatus, Mailing, MailingId, QueueId,
    RenderedContent, Task, TemplateSpec,
};
use salvo_delivery::{
    DeliveryResult, LegacyDelivery, Pipeline, PipelineConfig, RecipientContext, RenderError,
    RunError, TemplateRenderer, Transport, VerpAddressing, backends::MemoryMailStore,
};

pub const JOB: JobId = JobId::new(42);
pub const MAILING: MailingId = MailingId::new(7);

pub fn job() -> Job {
    Job::new(JOB, MAILING, Utc::now())
}

pub fn mailing() -> Mailing {
    Mailing {
        id: MAILING,
        name: "Autumn appeal".to_string(),
        from_name: "Friends of the Park".to_string(),
        from_email: "news@park.example.org".to_string(),
        subject: "Autumn appeal".to_string(),
        body_text: Some("Dear {contact.first_name}".to_string()),
        body_html: Some("<p>Dear {contact.first_name}</p>".to_string()),
        template_type: Some("traditional".to_string()),
        ..Default::default()
    }
}

pub fn task(id: u64) -> Task {
    Task::new(
        QueueId::new(id),
        ContactId::new(id + 9000),
        format!("hash{id:04}"),
        format!("supporter{id}@example.com"),
    )
}

/// A store holding `count` pending recipients for [`JOB`], queue ids from 1
pub fn seeded_store(count: u64) -> MemoryMailStore {
    let store = MemoryMailStore::with_page_size(7);
    for id in 1..=count {
        store.enqueue(JOB, task(id));
    }
    store
}

pub fn config(max_batch_size: usize, max_total_per_run: usize) -> PipelineConfig {
    PipelineConfig {
        max_batch_size,
        max_total_per_run,
        ..PipelineConfig::default()
    }
}

pub fn pipeline(
    config: PipelineConfig,
    store: &MemoryMailStore,
    transport: Arc<ScriptedTransport>,
    renderer: Arc<RecordingRenderer>,
) -> Pipeline {
    Pipeline::builder(config)
        .mail_store(Arc::new(store.clone()))
        .renderer(renderer)
        .addressing(Arc::new(VerpAddressing::new("b+", "bounces.example.org")))
        .transport(transport)
        .build()
        .expect("pipeline builds")
}

pub fn ids(values: &[QueueId]) -> Vec<u64> {
    values.iter().map(|id| id.get()).collect()
}

/// Replays a script of results, delivering once the script runs out
///
/// Optionally flips the job status in a store after a number of sends, to
/// simulate an operator stopping the job mid-run.
#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<DeliveryResult>>,
    sent: Mutex<Vec<ComposedMessage>>,
    stop_after: Option<(usize, MemoryMailStore, JobStatus)>,
}

impl ScriptedTransport {
    pub fn delivering() -> Self {
        Self::default()
    }

    pub fn with_script(script: impl IntoIterator<Item = DeliveryResult>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn stop_after(mut self, sends: usize, store: &MemoryMailStore, status: JobStatus) -> Self {
        self.stop_after = Some((sends, store.clone(), status));
        self
    }

    pub fn sent(&self) -> Vec<ComposedMessage> {
        self.sent.lock().clone()
    }

    pub fn sent_ids(&self) -> Vec<u64> {
        self.sent
            .lock()
            .iter()
            .map(|message| message.queue_id.get())
            .collect()
    }

    pub fn calls(&self) -> usize {
        self.sent.lock().len()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, message: &ComposedMessage) -> DeliveryResult {
        let calls = {
            let mut sent = self.sent.lock();
            sent.push(message.clone());
            sent.len()
        };

        if let Some((sends, store, status)) = &self.stop_after
            && calls == *sends
        {
            store.set_status(message.job_id, *status);
        }

        self.script
            .lock()
            .pop_front()
            .unwrap_or(DeliveryResult::Delivered)
    }
}

/// Renders templates verbatim and refuses the listed queue ids
#[derive(Default)]
pub struct RecordingRenderer {
    unresolvable: Vec<u64>,
    calls: AtomicUsize,
}

impl RecordingRenderer {
    pub fn refusing(unresolvable: impl IntoIterator<Item = u64>) -> Self {
        Self {
            unresolvable: unresolvable.into_iter().collect(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TemplateRenderer for RecordingRenderer {
    async fn render_batch(
        &self,
        recipients: &[RecipientContext],
        templates: &TemplateSpec,
        _language: Option<&str>,
    ) -> Result<AHashMap<QueueId, RenderedContent>, RenderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        Ok(recipients
            .iter()
            .filter(|recipient| !self.unresolvable.contains(&recipient.queue_id.get()))
            .map(|recipient| {
                (
                    recipient.queue_id,
                    RenderedContent {
                        subject: templates.subject.clone(),
                        text: templates.text.clone(),
                        html: templates.html.clone(),
                        to_name: format!("Supporter {}", recipient.contact_id),
                    },
                )
            })
            .collect())
    }
}

/// Legacy path that reports a fixed result
pub struct RecordingLegacy {
    completed: bool,
    failure: Option<String>,
    calls: AtomicUsize,
}

impl RecordingLegacy {
    pub fn new(completed: bool) -> Self {
        Self {
            completed,
            failure: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Fails every delivery with `reason`
    pub fn failing(reason: &str) -> Self {
        Self {
            completed: false,
            failure: Some(reason.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LegacyDelivery for RecordingLegacy {
    async fn deliver(&self, _job: &Job, _mailing: &Mailing) -> Result<bool, RunError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.failure {
            Some(reason) => Err(RunError::Legacy(reason.clone())),
            None => Ok(self.completed),
        }
    }
}
