//! The send-one-message capability supplied by the host

use std::{collections::HashMap, fmt::Debug, sync::Arc};

use async_trait::async_trait;
use herald_common::{Channel, Payload, Recipient, SenderIdentity};

use crate::DeliveryError;

/// What a sender needs besides the recipient
#[derive(Debug, Clone)]
pub struct Message {
    pub channel: Channel,
    pub sender: SenderIdentity,
    pub payload: Payload,
}

/// Delivers one message to one recipient over an external gateway
///
/// Implementations classify their failures through [`DeliveryError`]; the
/// engine retries transient ones, records permanent ones and aborts the run
/// on systemic ones.
#[async_trait]
pub trait MessageSender: Send + Sync + Debug {
    /// Send `message` to `recipient`
    ///
    /// # Errors
    /// A classified delivery failure
    async fn send(&self, recipient: &Recipient, message: &Message) -> Result<(), DeliveryError>;

    /// Check the sender identity before any recipient is contacted
    ///
    /// # Errors
    /// Usually `DeliveryError::Systemic` when the identity is unusable
    async fn preflight(&self, _sender: &SenderIdentity) -> Result<(), DeliveryError> {
        Ok(())
    }
}

/// The concrete sender for each channel
///
/// The engine resolves a campaign's sender here once per run and never looks
/// at the channel again.
#[derive(Debug, Clone, Default)]
pub struct SenderRegistry {
    senders: HashMap<Channel, Arc<dyn MessageSender>>,
}

impl SenderRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the sender for a channel
    #[must_use]
    pub fn with(mut self, channel: Channel, sender: Arc<dyn MessageSender>) -> Self {
        self.register(channel, sender);
        self
    }

    pub fn register(&mut self, channel: Channel, sender: Arc<dyn MessageSender>) {
        self.senders.insert(channel, sender);
    }

    #[must_use]
    pub fn get(&self, channel: Channel) -> Option<Arc<dyn MessageSender>> {
        self.senders.get(&channel).cloned()
    }
}
