//! Campaign runs: starting, supervising, cancelling and reconciling them
//!
//! A run moves its campaign from `pending` to `processing`, hands the
//! recipients to a [`WorkerPool`] and, once the pool has stopped, settles the
//! campaign as `completed` or `failed`. At most one run per campaign exists
//! at a time; a second start request is refused while the first is active.

use std::{collections::HashSet, sync::Arc, time::Duration};

use dashmap::{DashMap, mapref::entry::Entry};
use herald_common::{
    Campaign, CampaignId, CampaignStatus, ProgressEvent, ProgressSnapshot, Recipient,
    RecipientOutcome, internal,
    tracing::{debug, error, info, warn},
};
use herald_store::{CampaignStore, OutcomeStore, StoreError};
use parking_lot::Mutex;
use tokio::{sync::broadcast, task::JoinHandle};

use crate::{
    MessageSender,
    aggregator::ProgressAggregator,
    cancel::CancelSignal,
    config::EngineConfig,
    error::{CancelError, EngineError, StartError},
    pool::{OutageDetector, RunContext, UnrecordedLog, WorkerPool},
    rate_limiter::RateLimiter,
    recorder::OutcomeRecorder,
    sender::{Message, SenderRegistry},
};

/// Reason recorded on a campaign stopped by a cancel request
pub const CANCELLED_REASON: &str = "Cancelled before all recipients were resolved";

/// A started run
///
/// Dropping the handle does not stop the run.
#[derive(Debug)]
pub struct RunHandle {
    campaign_id: CampaignId,
    stop: CancelSignal,
    events: broadcast::Receiver<ProgressEvent>,
    aggregator: Arc<ProgressAggregator>,
    task: JoinHandle<ProgressSnapshot>,
}

impl RunHandle {
    #[must_use]
    pub const fn campaign_id(&self) -> &CampaignId {
        &self.campaign_id
    }

    /// Events of this run, subscribed before the first send
    pub const fn events(&mut self) -> &mut broadcast::Receiver<ProgressEvent> {
        &mut self.events
    }

    /// An additional subscriber that sees events from now on
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.events.resubscribe()
    }

    /// Live counters; `None` once the run has settled and released them
    #[must_use]
    pub fn snapshot(&self) -> Option<ProgressSnapshot> {
        self.aggregator.snapshot(&self.campaign_id)
    }

    /// Ask the run to stop; returns `false` if it was already asked
    pub fn cancel(&self) -> bool {
        self.stop.cancel()
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the run to settle and return the final snapshot
    ///
    /// # Errors
    /// If the run task panicked
    pub async fn wait(self) -> Result<ProgressSnapshot, EngineError> {
        Ok(self.task.await?)
    }
}

/// A campaign validated and moved to `processing`, ready to be driven
struct PreparedRun {
    campaign: Campaign,
    sender: Arc<dyn MessageSender>,
    recipients: Vec<Recipient>,
    events: broadcast::Receiver<ProgressEvent>,
}

#[derive(Debug)]
pub struct Orchestrator {
    config: EngineConfig,
    campaigns: Arc<dyn CampaignStore>,
    recorder: OutcomeRecorder,
    senders: SenderRegistry,
    aggregator: Arc<ProgressAggregator>,
    shared_limiter: Arc<RateLimiter>,
    runs: DashMap<CampaignId, CancelSignal>,
    unrecorded: DashMap<CampaignId, UnrecordedLog>,
}

impl Orchestrator {
    #[must_use]
    pub fn new(
        config: EngineConfig,
        campaigns: Arc<dyn CampaignStore>,
        outcomes: Arc<dyn OutcomeStore>,
        senders: SenderRegistry,
    ) -> Self {
        Self {
            recorder: OutcomeRecorder::new(outcomes, config.recorder.clone()),
            aggregator: Arc::new(ProgressAggregator::new(
                config.progress_every,
                config.event_buffer,
            )),
            shared_limiter: Arc::new(RateLimiter::new(config.rate_limit.clone())),
            runs: DashMap::new(),
            unrecorded: DashMap::new(),
            config,
            campaigns,
            senders,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Start delivering a `pending` campaign
    ///
    /// Returns as soon as the campaign is `processing`; delivery continues in
    /// the background.
    ///
    /// # Errors
    /// - `AlreadyRunning` if a run exists or the campaign is `processing`
    /// - `InvalidCampaign` if the campaign is unknown, finished, has no
    ///   usable sender identity, no recipients, or no sender for its channel
    /// - `Store` if the campaign could not be loaded or saved
    #[tracing::instrument(skip_all, fields(campaign_id = %campaign_id))]
    pub async fn start(self: &Arc<Self>, campaign_id: &CampaignId) -> Result<RunHandle, StartError> {
        let stop = CancelSignal::new();
        match self.runs.entry(campaign_id.clone()) {
            Entry::Occupied(_) => return Err(StartError::AlreadyRunning(campaign_id.clone())),
            Entry::Vacant(entry) => {
                entry.insert(stop.clone());
            }
        }

        let run = match self.prepare(campaign_id).await {
            Ok(run) => run,
            Err(e) => {
                self.runs.remove(campaign_id);
                internal!(level = WARN, error = %e, "Campaign not started");
                return Err(e);
            }
        };

        let unrecorded = UnrecordedLog::default();
        self.unrecorded
            .insert(campaign_id.clone(), Arc::clone(&unrecorded));

        let limiter = if self.config.shared_rate_limit {
            Arc::clone(&self.shared_limiter)
        } else {
            Arc::new(RateLimiter::new(self.config.rate_limit.clone()))
        };

        let ctx = Arc::new(RunContext {
            campaign_id: campaign_id.clone(),
            message: Message {
                channel: run.campaign.channel,
                sender: run.campaign.sender.clone().unwrap_or_default(),
                payload: run.campaign.payload.clone(),
            },
            sender: Arc::clone(&run.sender),
            limiter,
            recorder: self.recorder.clone(),
            aggregator: Arc::clone(&self.aggregator),
            retry: self.config.retry.clone(),
            stop: stop.clone(),
            outage: OutageDetector::new(self.config.abort_after_consecutive_failures),
            unrecorded,
            abort_reason: Mutex::new(None),
        });

        info!(
            channel = %run.campaign.channel,
            recipients = run.recipients.len(),
            "Campaign started"
        );

        let PreparedRun {
            campaign,
            recipients,
            events,
            ..
        } = run;
        let task = tokio::spawn(Arc::clone(self).drive(campaign, recipients, ctx));

        Ok(RunHandle {
            campaign_id: campaign_id.clone(),
            stop,
            events,
            aggregator: Arc::clone(&self.aggregator),
            task,
        })
    }

    async fn prepare(&self, campaign_id: &CampaignId) -> Result<PreparedRun, StartError> {
        let invalid = |reason: &str| StartError::InvalidCampaign {
            id: campaign_id.clone(),
            reason: reason.to_string(),
        };

        let mut campaign = match self.campaigns.load(campaign_id).await {
            Ok(campaign) => campaign,
            Err(StoreError::CampaignNotFound(_)) => return Err(invalid("unknown campaign")),
            Err(e) => return Err(e.into()),
        };

        match campaign.status {
            CampaignStatus::Pending => {}
            CampaignStatus::Processing => {
                return Err(StartError::AlreadyRunning(campaign_id.clone()));
            }
            status @ (CampaignStatus::Completed | CampaignStatus::Failed) => {
                return Err(invalid(&format!("campaign already {status}")));
            }
        }

        if campaign.sender.as_ref().is_none_or(|sender| sender.is_blank()) {
            return Err(invalid("missing sender identity"));
        }

        let Some(sender) = self.senders.get(campaign.channel) else {
            return Err(invalid(&format!(
                "no sender registered for channel {}",
                campaign.channel
            )));
        };

        let recipients = campaign.unique_recipients();
        if recipients.is_empty() {
            return Err(invalid("no recipients"));
        }
        if recipients.len() < campaign.recipients.len() {
            debug!(
                listed = campaign.recipients.len(),
                unique = recipients.len(),
                "Collapsed duplicate recipients"
            );
        }

        self.recorder.register(campaign_id, &recipients).await?;

        campaign.total_recipients = recipients.len() as u64;
        let events = self.aggregator.track(&campaign);
        let snapshot = match self.aggregator.begin(campaign_id) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.aggregator.forget(campaign_id);
                return Err(invalid(&e.to_string()));
            }
        };
        campaign.apply_snapshot(&snapshot);

        if let Err(e) = self.campaigns.save(&campaign).await {
            self.aggregator.forget(campaign_id);
            return Err(e.into());
        }

        Ok(PreparedRun {
            campaign,
            sender,
            recipients,
            events,
        })
    }

    /// Run the pool to completion and settle the campaign
    async fn drive(
        self: Arc<Self>,
        mut campaign: Campaign,
        recipients: Vec<Recipient>,
        ctx: Arc<RunContext>,
    ) -> ProgressSnapshot {
        let campaign_id = campaign.id.clone();

        match ctx.sender.preflight(&ctx.message.sender).await {
            Ok(()) => {
                let undispatched = WorkerPool::new(self.config.workers())
                    .run(Arc::clone(&ctx), recipients)
                    .await;
                if undispatched > 0 {
                    debug!(campaign_id = %campaign_id, undispatched, "Run stopped early");
                }
            }
            Err(e) => {
                error!(campaign_id = %campaign_id, error = %e, "Sender preflight failed");
                ctx.abort(format!("Preflight failed: {e}"));
            }
        }

        let (status, reason) = self.verdict(&campaign_id, &ctx);
        let snapshot = match self.aggregator.finish(&campaign_id, status, reason) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!(campaign_id = %campaign_id, error = %e, "Failed to settle campaign");
                self.aggregator
                    .snapshot(&campaign_id)
                    .unwrap_or_else(|| campaign.snapshot())
            }
        };

        campaign.apply_snapshot(&snapshot);
        self.persist(&campaign).await;
        self.runs.remove(&campaign_id);
        self.release(&campaign_id);

        info!(
            campaign_id = %campaign_id,
            status = %snapshot.status,
            sent = snapshot.sent,
            failed = snapshot.failed,
            total = snapshot.total,
            unrecorded = snapshot.unrecorded,
            "Campaign finished"
        );

        snapshot
    }

    /// A run that resolved every recipient completed, whatever stopped it
    fn verdict(
        &self,
        campaign_id: &CampaignId,
        ctx: &RunContext,
    ) -> (CampaignStatus, Option<String>) {
        let drained = self
            .aggregator
            .snapshot(campaign_id)
            .is_some_and(|snapshot| snapshot.is_drained());

        if drained {
            (CampaignStatus::Completed, None)
        } else if let Some(reason) = ctx.aborted() {
            (CampaignStatus::Failed, Some(reason))
        } else {
            (CampaignStatus::Failed, Some(CANCELLED_REASON.to_string()))
        }
    }

    /// Save the settled campaign, retrying transient store errors
    ///
    /// If every attempt fails the store still holds the campaign as
    /// `processing`, and later starts are refused with `AlreadyRunning`. The
    /// returned snapshot is then the only record of the final counters; the
    /// host has to write it back to its store itself.
    async fn persist(&self, campaign: &Campaign) {
        let attempts = self.config.recorder.attempts.max(1);
        let delay = Duration::from_millis(self.config.recorder.retry_delay_ms);

        for attempt in 1..=attempts {
            match self.campaigns.save(campaign).await {
                Ok(()) => return,
                Err(e) if e.is_retryable() && attempt < attempts => {
                    warn!(campaign_id = %campaign.id, attempt, error = %e, "Failed to save campaign, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    error!(campaign_id = %campaign.id, attempt, error = %e, "Failed to save campaign");
                    return;
                }
            }
        }
    }

    /// Drop the live counters and outcome log of a settled campaign, unless
    /// outcomes are still waiting to be reconciled
    fn release(&self, campaign_id: &CampaignId) {
        let settled = self
            .unrecorded
            .remove_if(campaign_id, |_, log| log.lock().is_empty())
            .is_some();
        if settled {
            self.aggregator.forget(campaign_id);
        }
    }

    /// Ask a running campaign to stop
    ///
    /// In-flight sends finish; nothing new is dispatched. Recipients not yet
    /// resolved stay `pending`.
    ///
    /// # Errors
    /// `NotRunning` if the campaign has no active run
    #[tracing::instrument(skip_all, fields(campaign_id = %campaign_id))]
    pub fn cancel(&self, campaign_id: &CampaignId) -> Result<(), CancelError> {
        let stop = self
            .runs
            .get(campaign_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| CancelError::NotRunning(campaign_id.clone()))?;

        if stop.cancel() {
            internal!(level = INFO, "Cancel requested");
        }
        Ok(())
    }

    #[must_use]
    pub fn is_running(&self, campaign_id: &CampaignId) -> bool {
        self.runs.contains_key(campaign_id)
    }

    /// Live counters of a running campaign
    ///
    /// Also kept after the run for a campaign with unrecorded outcomes, until
    /// [`reconcile`](Self::reconcile) has persisted them all.
    #[must_use]
    pub fn snapshot(&self, campaign_id: &CampaignId) -> Option<ProgressSnapshot> {
        self.aggregator.snapshot(campaign_id)
    }

    /// Events of a campaign from now on
    #[must_use]
    pub fn subscribe(&self, campaign_id: &CampaignId) -> Option<broadcast::Receiver<ProgressEvent>> {
        self.aggregator.subscribe(campaign_id)
    }

    /// All outcome records of a campaign
    ///
    /// # Errors
    /// If the outcome store cannot be read
    pub async fn outcomes(
        &self,
        campaign_id: &CampaignId,
    ) -> Result<Vec<RecipientOutcome>, EngineError> {
        Ok(self.recorder.outcomes(campaign_id).await?)
    }

    /// Recipients of a campaign still without a terminal outcome
    ///
    /// # Errors
    /// If the outcome store cannot be read
    pub async fn pending_recipients(
        &self,
        campaign_id: &CampaignId,
    ) -> Result<Vec<Recipient>, EngineError> {
        Ok(self.recorder.pending(campaign_id).await?)
    }

    /// Retry persisting outcomes that were resolved but not recorded
    ///
    /// Returns how many remain unrecorded; 0 for a campaign with nothing
    /// outstanding. Outcomes the store still refuses stay in the log.
    #[tracing::instrument(skip_all, fields(campaign_id = %campaign_id))]
    pub async fn reconcile(&self, campaign_id: &CampaignId) -> u64 {
        let Some(log) = self
            .unrecorded
            .get(campaign_id)
            .map(|entry| Arc::clone(entry.value()))
        else {
            return 0;
        };

        // Workers may still append while this runs, so the log is only
        // pruned of what was written here
        let outstanding = log.lock().clone();
        let mut written = HashSet::new();

        for outcome in outstanding {
            match self.recorder.record(&outcome).await {
                Ok(()) => {
                    written.insert(outcome.recipient);
                }
                Err(e) if matches!(e.source, StoreError::AlreadyTerminal { .. }) => {
                    written.insert(outcome.recipient);
                }
                Err(e) => {
                    warn!(recipient = %outcome.recipient, error = %e, "Outcome still unrecorded");
                }
            }
        }

        let left = {
            let mut log = log.lock();
            log.retain(|outcome| !written.contains(&outcome.recipient));
            log.len() as u64
        };

        if !written.is_empty()
            && let Err(e) = self
                .aggregator
                .mark_recorded(campaign_id, written.len() as u64)
        {
            warn!(error = %e, "Failed to update unrecorded count");
        }
        if !self.is_running(campaign_id) {
            self.release(campaign_id);
        }

        internal!(level = INFO, recorded = written.len(), remaining = left, "Reconciled outcomes");
        left
    }

    /// Delete a campaign and all of its outcome records
    ///
    /// # Errors
    /// - `Running` while a run is active
    /// - `Store` if the campaign does not exist or the store fails
    #[tracing::instrument(skip_all, fields(campaign_id = %campaign_id))]
    pub async fn delete(&self, campaign_id: &CampaignId) -> Result<(), EngineError> {
        if self.is_running(campaign_id) {
            return Err(EngineError::Running(campaign_id.clone()));
        }

        self.campaigns.delete(campaign_id).await?;
        self.aggregator.forget(campaign_id);
        self.unrecorded.remove(campaign_id);

        internal!(level = INFO, "Campaign deleted");
        Ok(())
    }
}
