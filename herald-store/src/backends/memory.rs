use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use async_trait::async_trait;
use dashmap::DashMap;
use herald_common::{Campaign, CampaignId, Recipient, RecipientOutcome};
use tracing::debug;

use crate::{CampaignStore, OutcomeStore, StoreError};

type Outcomes = DashMap<Recipient, RecipientOutcome>;

/// In-memory store for campaigns and their outcomes
///
/// Campaigns live in a `HashMap` behind an `RwLock`; they are written rarely.
/// Outcomes live in a `DashMap` per campaign so that workers completing
/// different recipients only contend on a shard lock.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    pub(crate) campaigns: Arc<RwLock<HashMap<CampaignId, Campaign>>>,
    pub(crate) outcomes: Arc<DashMap<CampaignId, Outcomes>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored campaigns
    ///
    /// Recovers gracefully if the lock is poisoned by accessing the underlying data.
    #[must_use]
    pub fn len(&self) -> usize {
        self.campaigns
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of outcome records of a campaign that are terminal
    #[must_use]
    pub fn terminal_count(&self, campaign_id: &CampaignId) -> usize {
        self.outcomes.get(campaign_id).map_or(0, |outcomes| {
            outcomes
                .iter()
                .filter(|entry| entry.value().is_terminal())
                .count()
        })
    }
}

#[async_trait]
impl CampaignStore for MemoryStore {
    async fn load(&self, id: &CampaignId) -> crate::Result<Campaign> {
        self.campaigns
            .read()?
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::CampaignNotFound(id.clone()))
    }

    async fn save(&self, campaign: &Campaign) -> crate::Result<()> {
        self.campaigns
            .write()?
            .insert(campaign.id.clone(), campaign.clone());
        Ok(())
    }

    async fn delete(&self, id: &CampaignId) -> crate::Result<()> {
        self.campaigns
            .write()?
            .remove(id)
            .ok_or_else(|| StoreError::CampaignNotFound(id.clone()))?;
        let removed = self
            .outcomes
            .remove(id)
            .map_or(0, |(_, outcomes)| outcomes.len());

        debug!(campaign_id = %id, outcomes = removed, "Deleted campaign");
        Ok(())
    }
}

#[async_trait]
impl OutcomeStore for MemoryStore {
    async fn register(
        &self,
        campaign_id: &CampaignId,
        recipients: &[Recipient],
    ) -> crate::Result<()> {
        let outcomes = self.outcomes.entry(campaign_id.clone()).or_default();
        let before = outcomes.len();
        for recipient in recipients {
            outcomes.entry(recipient.clone()).or_insert_with(|| {
                RecipientOutcome::pending(campaign_id.clone(), recipient.clone())
            });
        }

        debug!(
            campaign_id = %campaign_id,
            registered = outcomes.len() - before,
            "Registered recipients"
        );
        Ok(())
    }

    async fn complete(&self, outcome: &RecipientOutcome) -> crate::Result<()> {
        if !outcome.is_terminal() {
            return Err(StoreError::NotTerminal(outcome.recipient.clone()));
        }

        let not_found = || StoreError::OutcomeNotFound {
            campaign_id: outcome.campaign_id.clone(),
            recipient: outcome.recipient.clone(),
        };

        let outcomes = self.outcomes.get(&outcome.campaign_id).ok_or_else(not_found)?;
        let mut record = outcomes.get_mut(&outcome.recipient).ok_or_else(not_found)?;

        if record.is_terminal() {
            return Err(StoreError::AlreadyTerminal {
                campaign_id: outcome.campaign_id.clone(),
                recipient: outcome.recipient.clone(),
            });
        }

        *record = outcome.clone();
        Ok(())
    }

    async fn outcomes(&self, campaign_id: &CampaignId) -> crate::Result<Vec<RecipientOutcome>> {
        let mut records: Vec<_> = self
            .outcomes
            .get(campaign_id)
            .map(|outcomes| {
                outcomes
                    .iter()
                    .map(|entry| entry.value().clone())
                    .collect()
            })
            .unwrap_or_default();

        records.sort_by(|a, b| a.recipient.cmp(&b.recipient));

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use herald_common::{
        CampaignStatus, Channel, FailureClass, OutcomeState, Payload, SenderIdentity,
    };

    use super::*;

    fn campaign() -> Campaign {
        Campaign::new(
            Channel::Email,
            Payload::text("hi"),
            SenderIdentity::new("news@example.com"),
            vec![Recipient::from("a@example.com"), Recipient::from("b@example.com")],
        )
    }

    #[tokio::test]
    async fn campaign_load_save_delete() {
        let store = MemoryStore::new();
        let mut campaign = campaign();

        store.save(&campaign).await.expect("Failed to save");
        assert_eq!(store.len(), 1);

        campaign.status = CampaignStatus::Processing;
        store.save(&campaign).await.expect("Failed to save");
        let loaded = store.load(&campaign.id).await.expect("Failed to load");
        assert_eq!(loaded.status, CampaignStatus::Processing);

        store.delete(&campaign.id).await.expect("Failed to delete");
        assert!(store.is_empty());
        assert!(matches!(
            store.load(&campaign.id).await,
            Err(StoreError::CampaignNotFound(_))
        ));
    }

    #[tokio::test]
    async fn outcomes_are_write_once() {
        let store = MemoryStore::new();
        let campaign = campaign();
        store
            .register(&campaign.id, &campaign.recipients)
            .await
            .expect("Failed to register");

        let a = Recipient::from("a@example.com");
        store
            .complete(&RecipientOutcome::sent(campaign.id.clone(), a.clone(), 1))
            .await
            .expect("First completion should succeed");

        let second = store
            .complete(&RecipientOutcome::failed(
                campaign.id.clone(),
                a,
                1,
                FailureClass::Permanent,
                "rejected",
            ))
            .await;
        assert!(matches!(second, Err(StoreError::AlreadyTerminal { .. })));

        let outcomes = store.outcomes(&campaign.id).await.expect("Failed to list");
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].state, OutcomeState::Sent);
        assert_eq!(outcomes[1].state, OutcomeState::Pending);
        assert_eq!(store.terminal_count(&campaign.id), 1);
    }

    #[tokio::test]
    async fn register_keeps_existing_records() {
        let store = MemoryStore::new();
        let campaign = campaign();
        let a = Recipient::from("a@example.com");

        store
            .register(&campaign.id, &campaign.recipients)
            .await
            .expect("Failed to register");
        store
            .complete(&RecipientOutcome::sent(campaign.id.clone(), a.clone(), 1))
            .await
            .expect("Failed to complete");
        store
            .register(&campaign.id, &campaign.recipients)
            .await
            .expect("Failed to register again");

        assert_eq!(store.terminal_count(&campaign.id), 1);
    }

    #[tokio::test]
    async fn rejects_unknown_and_pending_outcomes() {
        let store = MemoryStore::new();
        let id = CampaignId::generate();
        let r = Recipient::from("a@example.com");

        assert!(matches!(
            store.complete(&RecipientOutcome::sent(id.clone(), r.clone(), 1)).await,
            Err(StoreError::OutcomeNotFound { .. })
        ));
        assert!(matches!(
            store.complete(&RecipientOutcome::pending(id, r)).await,
            Err(StoreError::NotTerminal(_))
        ));
    }

    #[tokio::test]
    async fn delete_cascades_to_outcomes() {
        let store = MemoryStore::new();
        let campaign = campaign();
        store.save(&campaign).await.expect("Failed to save");
        store
            .register(&campaign.id, &campaign.recipients)
            .await
            .expect("Failed to register");

        store.delete(&campaign.id).await.expect("Failed to delete");

        assert!(
            store
                .outcomes(&campaign.id)
                .await
                .expect("Failed to list")
                .is_empty()
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_completions() {
        let store = MemoryStore::new();
        let id = CampaignId::generate();
        let recipients: Vec<_> = (0..200)
            .map(|i| Recipient::new(format!("user{i}@example.com")))
            .collect();
        store.register(&id, &recipients).await.expect("Failed to register");

        let mut tasks = tokio::task::JoinSet::new();
        for recipient in recipients {
            let store = store.clone();
            let id = id.clone();
            tasks.spawn(async move {
                store
                    .complete(&RecipientOutcome::sent(id, recipient, 1))
                    .await
            });
        }
        while let Some(result) = tasks.join_next().await {
            result.expect("task panicked").expect("Failed to complete");
        }

        assert_eq!(store.terminal_count(&id), 200);
    }
}
