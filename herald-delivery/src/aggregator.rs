//! Aggregate counters and the campaign status machine
//!
//! Every counter change and status transition for a campaign goes through a
//! single lock, and the resulting event is published while that lock is
//! held. Observers therefore always see counters that match the set of
//! terminal outcomes applied so far, and events arrive in counter order.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use herald_common::{
    Campaign, CampaignId, CampaignStatus, OutcomeState, ProgressEvent, ProgressSnapshot,
    RecipientOutcome,
};
use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::{error::AggregateError, publisher::ProgressPublisher};

#[derive(Debug)]
struct Counters {
    total: u64,
    sent: u64,
    failed: u64,
    unrecorded: u64,
    status: CampaignStatus,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    failure_reason: Option<String>,
}

impl Counters {
    fn snapshot(&self, campaign_id: &CampaignId) -> ProgressSnapshot {
        ProgressSnapshot {
            campaign_id: campaign_id.clone(),
            total: self.total,
            sent: self.sent,
            failed: self.failed,
            unrecorded: self.unrecorded,
            status: self.status,
            started_at: self.started_at,
            completed_at: self.completed_at,
            failure_reason: self.failure_reason.clone(),
        }
    }
}

#[derive(Debug)]
struct Tracker {
    campaign_id: CampaignId,
    counters: Mutex<Counters>,
    publisher: ProgressPublisher,
}

/// Owner of every campaign's live counters and status
#[derive(Debug)]
pub struct ProgressAggregator {
    campaigns: DashMap<CampaignId, Arc<Tracker>>,
    progress_every: u64,
    event_buffer: usize,
}

impl ProgressAggregator {
    #[must_use]
    pub fn new(progress_every: u64, event_buffer: usize) -> Self {
        Self {
            campaigns: DashMap::new(),
            progress_every,
            event_buffer,
        }
    }

    fn tracker(&self, campaign_id: &CampaignId) -> Result<Arc<Tracker>, AggregateError> {
        self.campaigns
            .get(campaign_id)
            .map(|tracker| Arc::clone(tracker.value()))
            .ok_or_else(|| AggregateError::Untracked(campaign_id.clone()))
    }

    /// Start tracking a campaign from its persisted state
    ///
    /// Returns a receiver subscribed before any event can be published.
    pub fn track(&self, campaign: &Campaign) -> broadcast::Receiver<ProgressEvent> {
        let publisher = ProgressPublisher::new(self.progress_every, self.event_buffer);
        let rx = publisher.subscribe();

        let tracker = Tracker {
            campaign_id: campaign.id.clone(),
            counters: Mutex::new(Counters {
                total: campaign.total_recipients,
                sent: campaign.sent_count,
                failed: campaign.failed_count,
                unrecorded: 0,
                status: campaign.status,
                started_at: campaign.started_at,
                completed_at: campaign.completed_at,
                failure_reason: campaign.failure_reason.clone(),
            }),
            publisher,
        };
        self.campaigns
            .insert(campaign.id.clone(), Arc::new(tracker));

        rx
    }

    /// Stop tracking a campaign
    pub fn forget(&self, campaign_id: &CampaignId) {
        self.campaigns.remove(campaign_id);
    }

    #[must_use]
    pub fn subscribe(&self, campaign_id: &CampaignId) -> Option<broadcast::Receiver<ProgressEvent>> {
        self.campaigns
            .get(campaign_id)
            .map(|tracker| tracker.publisher.subscribe())
    }

    #[must_use]
    pub fn snapshot(&self, campaign_id: &CampaignId) -> Option<ProgressSnapshot> {
        self.campaigns
            .get(campaign_id)
            .map(|tracker| tracker.counters.lock().snapshot(campaign_id))
    }

    /// Move a tracked campaign from `pending` to `processing`
    ///
    /// # Errors
    /// If the campaign is untracked or not `pending`
    pub fn begin(&self, campaign_id: &CampaignId) -> Result<ProgressSnapshot, AggregateError> {
        let tracker = self.tracker(campaign_id)?;
        let mut counters = tracker.counters.lock();

        counters.status = counters.status.transition(CampaignStatus::Processing)?;
        counters.started_at = Some(Utc::now());

        let snapshot = counters.snapshot(&tracker.campaign_id);
        tracker.publisher.publish(&snapshot);
        drop(counters);

        Ok(snapshot)
    }

    /// Count one terminal outcome
    ///
    /// `recorded` is `false` when the outcome could not be persisted; the
    /// counters still advance and the snapshot's `unrecorded` grows.
    ///
    /// # Errors
    /// - `NotTerminal` for a pending outcome
    /// - `NotProcessing` once the run has ended; terminal campaigns are frozen
    /// - `Overflow` if every recipient is already accounted for
    pub fn apply(
        &self,
        outcome: &RecipientOutcome,
        recorded: bool,
    ) -> Result<ProgressSnapshot, AggregateError> {
        let tracker = self.tracker(&outcome.campaign_id)?;
        let mut counters = tracker.counters.lock();

        if counters.status != CampaignStatus::Processing {
            return Err(AggregateError::NotProcessing(outcome.campaign_id.clone()));
        }
        if counters.sent + counters.failed >= counters.total {
            return Err(AggregateError::Overflow(outcome.campaign_id.clone()));
        }

        match outcome.state {
            OutcomeState::Sent => counters.sent += 1,
            OutcomeState::Failed => counters.failed += 1,
            OutcomeState::Pending => return Err(AggregateError::NotTerminal),
        }
        if !recorded {
            counters.unrecorded += 1;
        }

        let snapshot = counters.snapshot(&tracker.campaign_id);
        tracker.publisher.publish(&snapshot);
        drop(counters);

        Ok(snapshot)
    }

    /// End a run, setting `completed_at` and publishing the terminal event
    ///
    /// # Errors
    /// If the campaign is untracked or not `processing`
    pub fn finish(
        &self,
        campaign_id: &CampaignId,
        status: CampaignStatus,
        failure_reason: Option<String>,
    ) -> Result<ProgressSnapshot, AggregateError> {
        let tracker = self.tracker(campaign_id)?;
        let mut counters = tracker.counters.lock();

        counters.status = counters.status.transition(status)?;
        counters.completed_at = Some(Utc::now());
        if status == CampaignStatus::Failed {
            counters.failure_reason = failure_reason;
        }

        let snapshot = counters.snapshot(&tracker.campaign_id);
        tracker.publisher.publish(&snapshot);
        drop(counters);

        Ok(snapshot)
    }

    /// Note that `count` previously unrecorded outcomes have been persisted
    ///
    /// # Errors
    /// If the campaign is untracked
    pub fn mark_recorded(
        &self,
        campaign_id: &CampaignId,
        count: u64,
    ) -> Result<ProgressSnapshot, AggregateError> {
        let tracker = self.tracker(campaign_id)?;
        let mut counters = tracker.counters.lock();
        counters.unrecorded = counters.unrecorded.saturating_sub(count);
        Ok(counters.snapshot(&tracker.campaign_id))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use herald_common::{Channel, EventKind, FailureClass, Payload, Recipient, SenderIdentity};

    use super::*;

    fn campaign(total: u64) -> Campaign {
        let recipients = (0..total)
            .map(|i| Recipient::new(format!("user{i}@example.com")))
            .collect();
        let mut campaign = Campaign::new(
            Channel::Email,
            Payload::text("hi"),
            SenderIdentity::new("news@example.com"),
            recipients,
        );
        campaign.total_recipients = total;
        campaign
    }

    fn sent(campaign: &Campaign, i: usize) -> RecipientOutcome {
        RecipientOutcome::sent(campaign.id.clone(), campaign.recipients[i].clone(), 1)
    }

    #[test]
    fn counts_and_freezes() {
        let aggregator = ProgressAggregator::new(5, 16);
        let campaign = campaign(3);
        let _rx = aggregator.track(&campaign);

        assert!(matches!(
            aggregator.apply(&sent(&campaign, 0), true),
            Err(AggregateError::NotProcessing(_))
        ));

        aggregator.begin(&campaign.id).unwrap();
        aggregator.apply(&sent(&campaign, 0), true).unwrap();
        let snapshot = aggregator
            .apply(
                &RecipientOutcome::failed(
                    campaign.id.clone(),
                    campaign.recipients[1].clone(),
                    1,
                    FailureClass::Permanent,
                    "bad address",
                ),
                false,
            )
            .unwrap();
        assert_eq!((snapshot.sent, snapshot.failed, snapshot.unrecorded), (1, 1, 1));

        let done = aggregator
            .finish(&campaign.id, CampaignStatus::Completed, None)
            .unwrap();
        assert!(done.completed_at.is_some());
        assert!(matches!(
            aggregator.apply(&sent(&campaign, 2), true),
            Err(AggregateError::NotProcessing(_))
        ));
        assert!(matches!(
            aggregator.finish(&campaign.id, CampaignStatus::Failed, None),
            Err(AggregateError::Transition(_))
        ));

        let snapshot = aggregator.mark_recorded(&campaign.id, 1).unwrap();
        assert_eq!(snapshot.unrecorded, 0);
        assert_eq!(snapshot.status, CampaignStatus::Completed);
    }

    #[test]
    fn rejects_overflow_and_pending() {
        let aggregator = ProgressAggregator::new(5, 16);
        let campaign = campaign(1);
        let _rx = aggregator.track(&campaign);
        aggregator.begin(&campaign.id).unwrap();

        assert!(matches!(
            aggregator.apply(
                &RecipientOutcome::pending(campaign.id.clone(), campaign.recipients[0].clone()),
                true
            ),
            Err(AggregateError::NotTerminal)
        ));

        aggregator.apply(&sent(&campaign, 0), true).unwrap();
        assert!(matches!(
            aggregator.apply(&sent(&campaign, 0), true),
            Err(AggregateError::Overflow(_))
        ));
    }

    #[test]
    fn untracked_campaign() {
        let aggregator = ProgressAggregator::new(5, 16);
        assert!(aggregator.snapshot(&CampaignId::generate()).is_none());
        assert!(matches!(
            aggregator.begin(&CampaignId::generate()),
            Err(AggregateError::Untracked(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_applies_lose_nothing() {
        let aggregator = Arc::new(ProgressAggregator::new(10, 1024));
        let campaign = Arc::new(campaign(500));
        let mut rx = aggregator.track(&campaign);
        aggregator.begin(&campaign.id).unwrap();

        let mut tasks = tokio::task::JoinSet::new();
        for i in 0..500 {
            let aggregator = Arc::clone(&aggregator);
            let campaign = Arc::clone(&campaign);
            tasks.spawn(async move {
                let outcome = if i % 3 == 0 {
                    RecipientOutcome::failed(
                        campaign.id.clone(),
                        campaign.recipients[i].clone(),
                        1,
                        FailureClass::Permanent,
                        "rejected",
                    )
                } else {
                    sent(&campaign, i)
                };
                let snapshot = aggregator.apply(&outcome, true).unwrap();
                assert!(snapshot.processed() <= snapshot.total);
            });
        }
        while let Some(result) = tasks.join_next().await {
            result.unwrap();
        }

        let snapshot = aggregator.snapshot(&campaign.id).unwrap();
        assert_eq!(snapshot.failed, 167);
        assert_eq!(snapshot.sent, 333);

        // Progress events arrive in strictly increasing order
        let mut last = 0;
        let mut count = 0;
        while let Ok(event) = rx.try_recv() {
            assert_eq!(event.event, EventKind::Progress);
            assert!(event.processed() > last);
            last = event.processed();
            count += 1;
        }
        assert_eq!(count, 49);
    }
}
