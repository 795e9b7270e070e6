//! Per-recipient delivery results

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{CampaignId, Recipient};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeState {
    #[default]
    Pending,
    Sent,
    Failed,
}

impl OutcomeState {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Why a recipient ended up failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    /// Rejected outright, never retried
    Permanent,
    /// Kept failing transiently until the retry budget ran out
    TransientExhausted,
}

impl FailureClass {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Permanent => "permanent",
            Self::TransientExhausted => "transient_exhausted",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub class: FailureClass,
    pub detail: String,
}

/// The delivery record for one recipient of one campaign
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientOutcome {
    pub campaign_id: CampaignId,
    pub recipient: Recipient,
    pub state: OutcomeState,
    #[serde(default)]
    pub failure: Option<Failure>,
    /// Number of send attempts made for this recipient
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl RecipientOutcome {
    #[must_use]
    pub const fn pending(campaign_id: CampaignId, recipient: Recipient) -> Self {
        Self {
            campaign_id,
            recipient,
            state: OutcomeState::Pending,
            failure: None,
            attempts: 0,
            completed_at: None,
        }
    }

    #[must_use]
    pub fn sent(campaign_id: CampaignId, recipient: Recipient, attempts: u32) -> Self {
        Self {
            campaign_id,
            recipient,
            state: OutcomeState::Sent,
            failure: None,
            attempts,
            completed_at: Some(Utc::now()),
        }
    }

    #[must_use]
    pub fn failed(
        campaign_id: CampaignId,
        recipient: Recipient,
        attempts: u32,
        class: FailureClass,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            campaign_id,
            recipient,
            state: OutcomeState::Failed,
            failure: Some(Failure {
                class,
                detail: detail.into(),
            }),
            attempts,
            completed_at: Some(Utc::now()),
        }
    }

    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    #[must_use]
    pub fn failure_class(&self) -> Option<FailureClass> {
        self.failure.as_ref().map(|failure| failure.class)
    }
}
