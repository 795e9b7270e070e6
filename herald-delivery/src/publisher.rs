//! Progress events for subscribers

use herald_common::{CampaignStatus, EventKind, ProgressEvent, ProgressSnapshot, tracing::trace};
use tokio::sync::broadcast;

/// Pushes progress events for one campaign at a bounded cadence
///
/// A `progress` event goes out every `every` resolved recipients (never for
/// the last one) and exactly one `completed` or `failed` event when the run
/// ends. Publishing is fire-and-forget: having no subscribers, or lagging
/// ones, never affects the run.
#[derive(Debug, Clone)]
pub struct ProgressPublisher {
    tx: broadcast::Sender<ProgressEvent>,
    every: u64,
}

impl ProgressPublisher {
    /// `every == 0` disables intermediate progress events
    #[must_use]
    pub fn new(every: u64, capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx, every }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.tx.subscribe()
    }

    /// Event to emit for this snapshot, if any
    #[must_use]
    pub const fn event_for(&self, snapshot: &ProgressSnapshot) -> Option<EventKind> {
        match snapshot.status {
            CampaignStatus::Completed => Some(EventKind::Completed),
            CampaignStatus::Failed => Some(EventKind::Failed),
            CampaignStatus::Pending => None,
            CampaignStatus::Processing => {
                let processed = snapshot.processed();
                if self.every > 0
                    && processed > 0
                    && processed < snapshot.total
                    && processed % self.every == 0
                {
                    Some(EventKind::Progress)
                } else {
                    None
                }
            }
        }
    }

    /// Publish the event this snapshot calls for
    ///
    /// Callers must serialize calls per campaign so that events go out in
    /// counter order.
    pub fn publish(&self, snapshot: &ProgressSnapshot) -> Option<EventKind> {
        let kind = self.event_for(snapshot)?;
        let event = ProgressEvent::new(kind, snapshot);

        if self.tx.send(event).is_err() {
            trace!(
                campaign_id = %snapshot.campaign_id,
                event = ?kind,
                "No subscribers for progress event"
            );
        }

        Some(kind)
    }
}
