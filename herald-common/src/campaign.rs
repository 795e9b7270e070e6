//! The campaign definition and its persisted counters

use std::{collections::HashSet, fmt, sync::Arc};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{CampaignId, CampaignStatus, ProgressSnapshot};

/// Delivery channel for a campaign
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Email,
    #[serde(rename = "whatsapp", alias = "whats_app")]
    WhatsApp,
}

impl Channel {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::WhatsApp => "whatsapp",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who a campaign is sent as: a from-address for email, a session or
/// device reference for WhatsApp
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SenderIdentity(pub String);

impl SenderIdentity {
    #[must_use]
    pub fn new(identity: impl Into<String>) -> Self {
        Self(identity.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for SenderIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A recipient address (email address, phone number, ...)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Recipient(pub String);

impl Recipient {
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Recipient {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// The already-rendered message. The engine hands it to senders untouched.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Payload {
    #[serde(default)]
    pub subject: Option<String>,
    pub body: Arc<str>,
}

impl Payload {
    #[must_use]
    pub fn text(body: &str) -> Self {
        Self {
            subject: None,
            body: Arc::from(body),
        }
    }

    #[must_use]
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }
}

/// One broadcast run over one channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Campaign {
    pub id: CampaignId,
    #[serde(default)]
    pub name: String,
    pub channel: Channel,
    pub payload: Payload,
    #[serde(default)]
    pub sender: Option<SenderIdentity>,
    #[serde(default)]
    pub recipients: Vec<Recipient>,
    #[serde(default)]
    pub total_recipients: u64,
    #[serde(default)]
    pub sent_count: u64,
    #[serde(default)]
    pub failed_count: u64,
    #[serde(default)]
    pub status: CampaignStatus,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub failure_reason: Option<String>,
}

impl Campaign {
    #[must_use]
    pub fn new(
        channel: Channel,
        payload: Payload,
        sender: SenderIdentity,
        recipients: Vec<Recipient>,
    ) -> Self {
        Self {
            id: CampaignId::generate(),
            name: String::default(),
            channel,
            payload,
            sender: Some(sender),
            recipients,
            total_recipients: 0,
            sent_count: 0,
            failed_count: 0,
            status: CampaignStatus::Pending,
            started_at: None,
            completed_at: None,
            failure_reason: None,
        }
    }

    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Recipients with duplicates removed, first occurrence wins
    #[must_use]
    pub fn unique_recipients(&self) -> Vec<Recipient> {
        let mut seen = HashSet::with_capacity(self.recipients.len());
        self.recipients
            .iter()
            .filter(|recipient| seen.insert(*recipient))
            .cloned()
            .collect()
    }

    /// The persisted view of this campaign's progress
    #[must_use]
    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            campaign_id: self.id.clone(),
            total: self.total_recipients,
            sent: self.sent_count,
            failed: self.failed_count,
            unrecorded: 0,
            status: self.status,
            started_at: self.started_at,
            completed_at: self.completed_at,
            failure_reason: self.failure_reason.clone(),
        }
    }

    /// Copy counters, status and timestamps from a live snapshot
    pub fn apply_snapshot(&mut self, snapshot: &ProgressSnapshot) {
        self.total_recipients = snapshot.total;
        self.sent_count = snapshot.sent;
        self.failed_count = snapshot.failed;
        self.status = snapshot.status;
        self.started_at = snapshot.started_at;
        self.completed_at = snapshot.completed_at;
        self.failure_reason.clone_from(&snapshot.failure_reason);
    }
}
