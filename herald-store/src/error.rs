//! Error types for the herald-store crate.

use herald_common::{CampaignId, Recipient};
use thiserror::Error;

/// Top-level store error type.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Campaign does not exist.
    #[error("Campaign not found: {0}")]
    CampaignNotFound(CampaignId),

    /// No outcome record was registered for this recipient.
    #[error("No outcome record for {recipient} in campaign {campaign_id}")]
    OutcomeNotFound {
        campaign_id: CampaignId,
        recipient: Recipient,
    },

    /// The recipient already has a terminal outcome; records are write-once.
    #[error("Outcome for {recipient} in campaign {campaign_id} is already terminal")]
    AlreadyTerminal {
        campaign_id: CampaignId,
        recipient: Recipient,
    },

    /// Attempted to record a pending outcome as terminal.
    #[error("Outcome for {0} is not terminal")]
    NotTerminal(Recipient),

    /// Backend is unavailable or refused the write.
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// Internal error (lock poisoning, etc.).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl StoreError {
    /// Returns `true` if repeating the same call may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Internal(_))
    }
}

/// Specialized `Result` type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

impl<T> From<std::sync::PoisonError<T>> for StoreError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        Self::Internal(format!("Lock poisoned: {e}"))
    }
}
