//! Bulk-mail delivery pipeline
//!
//! Turns a mailing and its pending-recipient queue into a bounded stream of
//! individually composed and delivered messages:
//!
//! ```text
//! RecipientSource → Batcher → Composer → MutatorChain → Sender
//! ```
//!
//! A [`Pipeline`] run processes one job sequentially until the queue is
//! drained, the per-run ceiling is reached, an operator stops the job, or
//! the transport is judged unavailable. Progress is flushed to the
//! [`JobStore`] incrementally so an interrupted run can be resumed.

pub mod addressing;
pub mod backends;
mod batcher;
pub mod bounce;
mod composer;
mod config;
mod error;
mod mutator;
mod pipeline;
pub mod policy;
mod sender;
mod source;
pub mod traits;

pub use addressing::VerpAddressing;
pub use batcher::{Batch, BatchStep, Batcher, WalkOutcome};
pub use bounce::{PatternBounceClassifier, PatternBounceClassifierBuilder};
pub use composer::{Composer, Composition, PreparedTask, SkipReason};
pub use config::PipelineConfig;
pub use error::{ConfigurationError, MutatorError, QueueError, RenderError, RunError, StoreError};
pub use mutator::{MessageMutator, MutatorChain};
pub use pipeline::{Pipeline, PipelineBuilder, RunContext, RunOutcome, RunReport};
pub use sender::{DeliveryOutcome, SendReport, Sender};
pub use source::RecipientSource;
pub use traits::{
    AddressingService, BounceEvent, BouncePatternClassifier, BounceReason, DeliveryResult,
    JobStore, LegacyDelivery, Localizer, Page, PageToken, RecipientContext, RecipientQueue,
    TemplateRenderer, Transport,
};
