//! Write-once persistence of per-recipient outcomes

use std::{sync::Arc, time::Duration};

use herald_common::{
    CampaignId, Recipient, RecipientOutcome,
    tracing::{debug, warn},
};
use herald_store::{OutcomeStore, StoreError};
use serde::{Deserialize, Serialize};

use crate::error::RecordError;

/// Bounded retry for outcome writes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecorderConfig {
    /// Total write attempts per outcome (at least one is always made)
    ///
    /// Default: 3
    #[serde(default = "default_attempts")]
    pub attempts: u32,

    /// Pause between attempts (in milliseconds)
    ///
    /// Default: 50 ms
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

const fn default_attempts() -> u32 {
    3
}

const fn default_retry_delay_ms() -> u64 {
    50
}

/// Persists each recipient's terminal outcome exactly once
///
/// Records are keyed by campaign and recipient in the underlying store, so
/// concurrent workers never share mutable state here.
#[derive(Debug, Clone)]
pub struct OutcomeRecorder {
    store: Arc<dyn OutcomeStore>,
    config: RecorderConfig,
}

impl OutcomeRecorder {
    #[must_use]
    pub fn new(store: Arc<dyn OutcomeStore>, config: RecorderConfig) -> Self {
        Self { store, config }
    }

    /// Create the `pending` records for a run
    ///
    /// # Errors
    /// If the store refuses the write
    pub async fn register(
        &self,
        campaign_id: &CampaignId,
        recipients: &[Recipient],
    ) -> Result<(), StoreError> {
        self.store.register(campaign_id, recipients).await
    }

    /// Persist a terminal outcome
    ///
    /// Retryable store errors are retried up to the configured number of
    /// attempts. A write-once violation is reported immediately.
    ///
    /// # Errors
    /// The last store error, once attempts are exhausted or the error is not
    /// retryable
    pub async fn record(&self, outcome: &RecipientOutcome) -> Result<(), RecordError> {
        let attempts = self.config.attempts.max(1);
        let mut attempt = 1;

        loop {
            match self.store.complete(outcome).await {
                Ok(()) => {
                    debug!(
                        campaign_id = %outcome.campaign_id,
                        recipient = %outcome.recipient,
                        state = ?outcome.state,
                        "Outcome recorded"
                    );
                    return Ok(());
                }
                Err(e) if e.is_retryable() && attempt < attempts => {
                    warn!(
                        campaign_id = %outcome.campaign_id,
                        recipient = %outcome.recipient,
                        attempt,
                        error = %e,
                        "Failed to record outcome, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(self.config.retry_delay_ms)).await;
                    attempt += 1;
                }
                Err(source) => {
                    return Err(RecordError {
                        recipient: outcome.recipient.clone(),
                        attempts: attempt,
                        source,
                    });
                }
            }
        }
    }

    /// All outcome records of a campaign
    ///
    /// # Errors
    /// If the store cannot be read
    pub async fn outcomes(
        &self,
        campaign_id: &CampaignId,
    ) -> Result<Vec<RecipientOutcome>, StoreError> {
        self.store.outcomes(campaign_id).await
    }

    /// Recipients of a campaign without a terminal outcome
    ///
    /// # Errors
    /// If the store cannot be read
    pub async fn pending(&self, campaign_id: &CampaignId) -> Result<Vec<Recipient>, StoreError> {
        Ok(self
            .store
            .outcomes(campaign_id)
            .await?
            .into_iter()
            .filter(|outcome| !outcome.is_terminal())
            .map(|outcome| outcome.recipient)
            .collect())
    }
}
