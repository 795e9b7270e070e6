//! Loads a campaign file and drives it through the engine

use std::{path::Path, sync::Arc};

use herald_common::{
    internal,
    tracing::{info, warn},
};
use herald_delivery::{
    Campaign, CampaignId, Channel, Orchestrator, Payload, ProgressSnapshot, Recipient,
    SenderIdentity, SenderRegistry,
};
use herald_store::{CampaignStore, MemoryStore, OutcomeStore};
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;

use crate::{
    config::HeraldConfig,
    sender::{DryRunSender, is_valid_address, is_valid_sender},
};

/// A campaign as written by hand, without engine-managed fields
#[derive(Debug, Clone, Deserialize)]
pub struct CampaignFile {
    #[serde(default)]
    pub name: String,
    pub channel: Channel,
    #[serde(default)]
    pub sender: Option<SenderIdentity>,
    pub payload: Payload,
    #[serde(default)]
    pub recipients: Vec<Recipient>,
}

impl CampaignFile {
    /// # Errors
    /// If the file cannot be read or is not a valid campaign
    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            anyhow::anyhow!("Failed to read campaign from {}: {}", path.display(), e)
        })?;
        ron::from_str(&content).map_err(|e| {
            anyhow::anyhow!("Failed to parse campaign from {}: {}", path.display(), e)
        })
    }

    #[must_use]
    pub fn into_campaign(self) -> Campaign {
        let mut campaign = Campaign::new(
            self.channel,
            self.payload,
            SenderIdentity::default(),
            self.recipients,
        )
        .named(self.name);
        campaign.sender = self.sender;
        campaign
    }

    /// Validate the campaign without sending anything
    #[must_use]
    pub fn check(&self) -> CheckReport {
        let campaign = self.clone().into_campaign();
        let unique = campaign.unique_recipients();
        let invalid = unique
            .iter()
            .filter(|recipient| !is_valid_address(self.channel, recipient.as_str()))
            .cloned()
            .collect();

        CheckReport {
            listed: self.recipients.len(),
            unique: unique.len(),
            invalid,
            sender_valid: self
                .sender
                .as_ref()
                .is_some_and(|sender| is_valid_sender(self.channel, sender)),
        }
    }
}

/// What `herald check` found in a campaign file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckReport {
    pub listed: usize,
    pub unique: usize,
    /// Recipients that would fail permanently
    pub invalid: Vec<Recipient>,
    pub sender_valid: bool,
}

impl CheckReport {
    /// Whether a run could start at all
    #[must_use]
    pub const fn is_startable(&self) -> bool {
        self.sender_valid && self.unique > 0
    }
}

/// One engine over an in-memory store with dry-run senders
#[derive(Debug)]
pub struct Herald {
    store: Arc<MemoryStore>,
    orchestrator: Arc<Orchestrator>,
}

impl Herald {
    #[must_use]
    pub fn new(config: &HeraldConfig) -> Self {
        let senders = [Channel::Email, Channel::WhatsApp]
            .into_iter()
            .fold(SenderRegistry::new(), |registry, channel| {
                registry.with(channel, Arc::new(DryRunSender::new(channel, &config.dry_run)))
            });

        let store = Arc::new(MemoryStore::new());
        let orchestrator = Orchestrator::new(
            config.engine.clone(),
            Arc::clone(&store) as Arc<dyn CampaignStore>,
            Arc::clone(&store) as Arc<dyn OutcomeStore>,
            senders,
        );

        Self {
            store,
            orchestrator: Arc::new(orchestrator),
        }
    }

    #[must_use]
    pub const fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    /// Store a campaign so it can be started
    ///
    /// # Errors
    /// If the store refuses it
    pub async fn submit(&self, file: CampaignFile) -> anyhow::Result<CampaignId> {
        let campaign = file.into_campaign();
        self.store.save(&campaign).await?;

        internal!(
            level = INFO,
            campaign_id = %campaign.id,
            name = %campaign.name,
            recipients = campaign.recipients.len(),
            "Campaign submitted"
        );
        Ok(campaign.id)
    }

    /// Run a submitted campaign to the end, cancelling it on CTRL+C
    ///
    /// # Errors
    /// If the campaign cannot be started or its run task fails
    pub async fn run(&self, campaign_id: &CampaignId) -> anyhow::Result<ProgressSnapshot> {
        let mut handle = self.orchestrator.start(campaign_id).await?;

        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);
        let mut cancelled = false;

        loop {
            tokio::select! {
                event = handle.events().recv() => match event {
                    Ok(event) => {
                        info!(
                            campaign_id = %event.campaign_id,
                            event = ?event.event,
                            sent = event.sent,
                            failed = event.failed,
                            total = event.total,
                            percentage = format_args!("{:.1}", event.percentage),
                            "Progress"
                        );
                        if event.is_terminal() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Progress events skipped");
                    }
                    Err(RecvError::Closed) => break,
                },

                _ = &mut ctrl_c, if !cancelled => {
                    internal!(level = INFO, "CTRL+C entered -- cancelling campaign");
                    cancelled = true;
                    if let Err(e) = self.orchestrator.cancel(campaign_id) {
                        warn!(error = %e, "Cancel ignored");
                    }
                }
            }
        }

        Ok(handle.wait().await?)
    }

    /// Recipients left without a terminal outcome
    ///
    /// # Errors
    /// If the outcome store cannot be read
    pub async fn pending(&self, campaign_id: &CampaignId) -> anyhow::Result<Vec<Recipient>> {
        Ok(self.orchestrator.pending_recipients(campaign_id).await?)
    }
}
