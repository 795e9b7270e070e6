use std::fmt::Debug;

use async_trait::async_trait;
use herald_common::{Campaign, CampaignId, Recipient, RecipientOutcome};

/// Campaign metadata persistence
#[async_trait]
pub trait CampaignStore: Send + Sync + Debug {
    /// Load a campaign by id
    ///
    /// # Errors
    /// `StoreError::CampaignNotFound` if there is no such campaign, or a
    /// backend error
    async fn load(&self, id: &CampaignId) -> crate::Result<Campaign>;

    /// Insert or replace a campaign
    ///
    /// # Errors
    /// If the backend refuses the write
    async fn save(&self, campaign: &Campaign) -> crate::Result<()>;

    /// Delete a campaign together with all of its outcome records
    ///
    /// # Errors
    /// `StoreError::CampaignNotFound` if there is no such campaign, or a
    /// backend error
    async fn delete(&self, id: &CampaignId) -> crate::Result<()>;
}

/// Per-recipient outcome persistence
///
/// Each recipient's record is independent; implementations must allow
/// concurrent writes for different recipients of the same campaign.
#[async_trait]
pub trait OutcomeStore: Send + Sync + Debug {
    /// Create `pending` records for recipients that have none yet
    ///
    /// Existing records are left untouched.
    ///
    /// # Errors
    /// If the backend refuses the write
    async fn register(&self, campaign_id: &CampaignId, recipients: &[Recipient])
    -> crate::Result<()>;

    /// Move a `pending` record to its terminal state
    ///
    /// # Errors
    /// - `StoreError::NotTerminal` if `outcome` is still pending
    /// - `StoreError::OutcomeNotFound` if the recipient was never registered
    /// - `StoreError::AlreadyTerminal` if a terminal outcome exists
    /// - a backend error
    async fn complete(&self, outcome: &RecipientOutcome) -> crate::Result<()>;

    /// All records of a campaign, ordered by recipient
    ///
    /// # Errors
    /// If the backend cannot be read
    async fn outcomes(&self, campaign_id: &CampaignId) -> crate::Result<Vec<RecipientOutcome>>;
}
