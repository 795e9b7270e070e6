//! Gateway outage detection
//!
//! Counts consecutive recipients whose transient retries ran out. A single
//! successful send closes the window again. Once the count reaches the
//! configured threshold the run is aborted as a gateway outage instead of
//! burning through the rest of the recipient list.
//!
//! ```text
//! sent      -> 0
//! exhausted -> 1
//! exhausted -> 2
//! permanent -> 2   (the gateway answered, so it is not down)
//! exhausted -> 3   threshold 3: trip
//! ```

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use herald_common::{FailureClass, OutcomeState, RecipientOutcome};

#[derive(Debug)]
pub struct OutageDetector {
    threshold: Option<u32>,
    consecutive: AtomicU32,
    tripped: AtomicBool,
}

impl OutageDetector {
    #[must_use]
    pub const fn new(threshold: Option<u32>) -> Self {
        Self {
            threshold,
            consecutive: AtomicU32::new(0),
            tripped: AtomicBool::new(false),
        }
    }

    /// Feed one terminal outcome
    ///
    /// Returns the failure streak the first time the threshold is reached,
    /// and `None` otherwise.
    pub fn observe(&self, outcome: &RecipientOutcome) -> Option<u32> {
        let threshold = self.threshold.filter(|threshold| *threshold > 0)?;

        match (outcome.state, outcome.failure_class()) {
            (OutcomeState::Sent, _) => {
                self.consecutive.store(0, Ordering::Release);
                None
            }
            (OutcomeState::Failed, Some(FailureClass::TransientExhausted)) => {
                let streak = self.consecutive.fetch_add(1, Ordering::AcqRel) + 1;
                (streak >= threshold && !self.tripped.swap(true, Ordering::AcqRel))
                    .then_some(streak)
            }
            _ => None,
        }
    }
}
