//! Aggregate progress and the events pushed to subscribers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{CampaignId, CampaignStatus};

/// Counters and status of a campaign at one point in time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub campaign_id: CampaignId,
    pub total: u64,
    pub sent: u64,
    pub failed: u64,
    /// Resolved outcomes whose record could not be persisted yet
    #[serde(default)]
    pub unrecorded: u64,
    pub status: CampaignStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub failure_reason: Option<String>,
}

impl ProgressSnapshot {
    /// Recipients with a terminal outcome
    #[must_use]
    pub const fn processed(&self) -> u64 {
        self.sent + self.failed
    }

    #[must_use]
    pub const fn remaining(&self) -> u64 {
        self.total.saturating_sub(self.processed())
    }

    #[must_use]
    pub const fn is_drained(&self) -> bool {
        self.processed() == self.total
    }

    /// `(sent + failed) / total * 100`, or 0 for an empty campaign
    #[must_use]
    #[allow(clippy::cast_precision_loss, reason = "Percentages need no u64 precision")]
    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.processed() as f64 / self.total as f64 * 100.0
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Progress,
    Completed,
    Failed,
}

/// Progress notification pushed to subscribers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub campaign_id: CampaignId,
    pub event: EventKind,
    pub total: u64,
    pub sent: u64,
    pub failed: u64,
    pub percentage: f64,
    pub timestamp: DateTime<Utc>,
}

impl ProgressEvent {
    #[must_use]
    pub fn new(event: EventKind, snapshot: &ProgressSnapshot) -> Self {
        Self {
            campaign_id: snapshot.campaign_id.clone(),
            event,
            total: snapshot.total,
            sent: snapshot.sent,
            failed: snapshot.failed,
            percentage: snapshot.percentage(),
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub const fn processed(&self) -> u64 {
        self.sent + self.failed
    }

    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self.event, EventKind::Completed | EventKind::Failed)
    }
}
