//! Senders that validate and log instead of contacting a gateway

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use herald_common::dispatch;
use herald_delivery::{
    Channel, DeliveryError, Message, MessageSender, PermanentError, Recipient, SenderIdentity,
    SystemicError,
};

use crate::config::DryRunConfig;

/// Shortest and longest phone number accepted, in digits
const PHONE_DIGITS: std::ops::RangeInclusive<usize> = 8..=15;

fn is_email(address: &str) -> bool {
    let Some((local, domain)) = address.split_once('@') else {
        return false;
    };

    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !address.chars().any(char::is_whitespace)
}

fn is_phone(number: &str) -> bool {
    let digits = number.strip_prefix('+').unwrap_or(number);
    PHONE_DIGITS.contains(&digits.len()) && digits.chars().all(|c| c.is_ascii_digit())
}

/// Check that `address` has the shape `channel` expects
#[must_use]
pub fn is_valid_address(channel: Channel, address: &str) -> bool {
    match channel {
        Channel::Email => is_email(address),
        Channel::WhatsApp => is_phone(address),
    }
}

/// Email is sent from an address; a WhatsApp sender is a device or session
/// reference of any shape
#[must_use]
pub fn is_valid_sender(channel: Channel, sender: &SenderIdentity) -> bool {
    match channel {
        Channel::Email => is_email(sender.as_str()),
        Channel::WhatsApp => !sender.is_blank(),
    }
}

#[derive(Debug)]
pub struct DryRunSender {
    channel: Channel,
    latency: Duration,
    sent: AtomicU64,
}

impl DryRunSender {
    #[must_use]
    pub const fn new(channel: Channel, config: &DryRunConfig) -> Self {
        Self {
            channel,
            latency: Duration::from_millis(config.latency_ms),
            sent: AtomicU64::new(0),
        }
    }

    /// Messages accepted so far
    #[must_use]
    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl MessageSender for DryRunSender {
    async fn send(&self, recipient: &Recipient, message: &Message) -> Result<(), DeliveryError> {
        if !is_valid_address(self.channel, recipient.as_str()) {
            return Err(PermanentError::InvalidRecipient(format!(
                "{recipient} is not a valid {} address",
                self.channel
            ))
            .into());
        }

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        dispatch!(
            level = DEBUG,
            channel = %self.channel,
            sender = %message.sender,
            recipient = %recipient,
            subject = ?message.payload.subject,
            "Dry run, message not sent"
        );
        self.sent.fetch_add(1, Ordering::Relaxed);

        Ok(())
    }

    async fn preflight(&self, sender: &SenderIdentity) -> Result<(), DeliveryError> {
        if is_valid_sender(self.channel, sender) {
            Ok(())
        } else {
            Err(SystemicError::InvalidSender(format!(
                "{sender} cannot send over {}",
                self.channel
            ))
            .into())
        }
    }
}
