//! Bounded pool of delivery workers for one campaign run
//!
//! The recipient list is loaded into a shared queue up front. Each worker
//! pops a recipient, delivers it to a terminal outcome and pops the next, so
//! a slow recipient only ever occupies one worker. The pool returns once
//! every worker has stopped, either because the queue ran dry or because
//! the run's stop signal was raised.

mod outage;
mod worker;

use std::{collections::VecDeque, sync::Arc};

use herald_common::{CampaignId, Recipient, RecipientOutcome, internal};
use parking_lot::Mutex;
use tokio::task::JoinSet;

pub use outage::OutageDetector;

use crate::{
    aggregator::ProgressAggregator, cancel::CancelSignal, policy::RetryPolicy,
    rate_limiter::RateLimiter, recorder::OutcomeRecorder, sender::Message, MessageSender,
};

/// Outcomes that were resolved but could not be persisted
pub type UnrecordedLog = Arc<Mutex<Vec<RecipientOutcome>>>;

/// Recipients still waiting for a worker
#[derive(Debug, Default)]
pub struct RecipientQueue {
    inner: Mutex<VecDeque<Recipient>>,
}

impl RecipientQueue {
    #[must_use]
    pub fn new(recipients: Vec<Recipient>) -> Self {
        Self {
            inner: Mutex::new(recipients.into()),
        }
    }

    pub fn pop(&self) -> Option<Recipient> {
        self.inner.lock().pop_front()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }
}

/// Everything a worker needs, shared by all workers of one run
#[derive(Debug)]
pub struct RunContext {
    pub campaign_id: CampaignId,
    pub message: Message,
    pub sender: Arc<dyn MessageSender>,
    pub limiter: Arc<RateLimiter>,
    pub recorder: OutcomeRecorder,
    pub aggregator: Arc<ProgressAggregator>,
    pub retry: RetryPolicy,
    /// Raised by a cancel request or by an abort
    pub stop: CancelSignal,
    pub outage: OutageDetector,
    pub unrecorded: UnrecordedLog,
    pub abort_reason: Mutex<Option<String>>,
}

impl RunContext {
    /// Stop the run because nothing more can be delivered
    ///
    /// The first reason wins.
    pub fn abort(&self, reason: impl Into<String>) {
        let reason = reason.into();
        {
            let mut current = self.abort_reason.lock();
            if current.is_none() {
                internal!(
                    level = WARN,
                    campaign_id = %self.campaign_id,
                    reason = %reason,
                    "Aborting run"
                );
                *current = Some(reason);
            }
        }
        self.stop.cancel();
    }

    #[must_use]
    pub fn aborted(&self) -> Option<String> {
        self.abort_reason.lock().clone()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WorkerPool {
    workers: usize,
}

impl WorkerPool {
    #[must_use]
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    /// Deliver to `recipients` until the queue is empty or the run stops
    ///
    /// Returns the number of recipients never handed to a worker.
    pub async fn run(&self, ctx: Arc<RunContext>, recipients: Vec<Recipient>) -> usize {
        let workers = self.workers.min(recipients.len());
        let queue = Arc::new(RecipientQueue::new(recipients));

        internal!(
            level = INFO,
            campaign_id = %ctx.campaign_id,
            workers,
            recipients = queue.len(),
            "Starting delivery workers"
        );

        let mut join_set = JoinSet::new();
        for id in 0..workers {
            let ctx = Arc::clone(&ctx);
            let queue = Arc::clone(&queue);
            join_set.spawn(worker::run(id, ctx, queue));
        }

        while let Some(joined) = join_set.join_next().await {
            if let Err(e) = joined {
                internal!(
                    level = ERROR,
                    campaign_id = %ctx.campaign_id,
                    error = %e,
                    "Delivery worker failed"
                );
                ctx.abort(format!("Delivery worker failed: {e}"));
            }
        }

        queue.len()
    }
}
