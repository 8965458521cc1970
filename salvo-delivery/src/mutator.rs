//! Extension point for rewriting composed messages before send

use std::sync::Arc;

use salvo_common::ComposedMessage;
use tracing::warn;

use crate::{
    composer::{Composition, PreparedTask, SkipReason},
    error::MutatorError,
};

/// Rewrites a composed message, e.g. to add headers or sign it
pub trait MessageMutator: Send + Sync {
    /// # Errors
    ///
    /// An error drops this message from the current run; the rest of the
    /// batch is unaffected.
    fn alter(&self, message: &mut ComposedMessage) -> Result<(), MutatorError>;
}

/// Mutators applied in registration order. An empty chain is the identity.
#[derive(Clone, Default)]
pub struct MutatorChain {
    mutators: Vec<Arc<dyn MessageMutator>>,
}

impl MutatorChain {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, mutator: Arc<dyn MessageMutator>) {
        self.mutators.push(mutator);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.mutators.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mutators.is_empty()
    }

    /// Run every ready message through the chain. Skipped tasks are left
    /// untouched; the first failing mutator turns a message into a skip.
    pub fn alter(&self, batch: &mut [PreparedTask]) {
        if self.mutators.is_empty() {
            return;
        }

        for prepared in batch {
            let Composition::Ready(message) = &mut prepared.composition else {
                continue;
            };

            if let Err(e) = self
                .mutators
                .iter()
                .try_for_each(|mutator| mutator.alter(&mut **message))
            {
                warn!(
                    queue_id = %prepared.task.queue_id(),
                    error = %e,
                    "Mutator rejected message, it will not be sent"
                );
                prepared.composition = Composition::Skipped(SkipReason::Mutator(e.to_string()));
            }
        }
    }
}

impl std::fmt::Debug for MutatorChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutatorChain")
            .field("mutators", &self.mutators.len())
            .finish()
    }
}
