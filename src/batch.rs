use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::location::Category;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchPhase {
    Idle,
    InFlight,
    Complete,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchProgress {
    pub category: Category,
    pub expected: usize,
    pub treated: usize,
    pub phase: BatchPhase,
}

/// Outcome of [`BatchTracker::begin`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStart {
    /// `Idle -> InFlight`; the caller owns dispatching the names.
    Started,
    /// The batch had nothing to treat and went straight to `Complete`.
    Empty,
    /// The batch had already left `Idle`; nothing to dispatch.
    AlreadyStarted,
}

/// Counts names whose resolution finished, successfully or not.
///
/// `treated` never exceeds `expected`, and the move to `Complete` happens
/// exactly once.
pub struct BatchTracker {
    category: Category,
    expected: usize,
    treated: usize,
    phase: watch::Sender<BatchPhase>,
}

impl BatchTracker {
    pub fn new(category: Category, expected: usize) -> Self {
        let (phase, _) = watch::channel(BatchPhase::Idle);
        Self {
            category,
            expected,
            treated: 0,
            phase,
        }
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn expected(&self) -> usize {
        self.expected
    }

    pub fn treated(&self) -> usize {
        self.treated
    }

    pub fn phase(&self) -> BatchPhase {
        *self.phase.borrow()
    }

    pub fn is_complete(&self) -> bool {
        self.phase() == BatchPhase::Complete
    }

    /// Moves `Idle -> InFlight`. Only the first call can start the batch;
    /// an empty batch completes right away.
    pub fn begin(&mut self) -> BatchStart {
        if self.phase() != BatchPhase::Idle {
            return BatchStart::AlreadyStarted;
        }
        if self.expected == 0 {
            self.complete();
            return BatchStart::Empty;
        }
        self.phase.send_replace(BatchPhase::InFlight);
        debug!(category = self.category.as_tag(), expected = self.expected, "batch in flight");
        BatchStart::Started
    }

    /// Records one finished resolution. Returns `true` only for the call that
    /// completes the batch.
    pub fn record_treated(&mut self) -> bool {
        if self.is_complete() {
            warn!(
                category = self.category.as_tag(),
                expected = self.expected,
                "ignoring treated count past batch size"
            );
            return false;
        }
        self.treated += 1;
        if self.treated >= self.expected {
            self.complete();
            return true;
        }
        false
    }

    pub fn subscribe(&self) -> watch::Receiver<BatchPhase> {
        self.phase.subscribe()
    }

    pub fn progress(&self) -> BatchProgress {
        BatchProgress {
            category: self.category,
            expected: self.expected,
            treated: self.treated,
            phase: self.phase(),
        }
    }

    fn complete(&mut self) {
        self.treated = self.expected;
        self.phase.send_replace(BatchPhase::Complete);
        info!(category = self.category.as_tag(), treated = self.treated, "batch complete");
    }
}

/// Resolves once the observed batch is complete, immediately if it already is.
pub async fn wait_until_complete(mut phase: watch::Receiver<BatchPhase>) {
    if phase
        .wait_for(|current| *current == BatchPhase::Complete)
        .await
        .is_err()
    {
        debug!("batch tracker dropped before completion");
    }
}
