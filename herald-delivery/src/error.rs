//! Typed error handling for delivery operations.
//!
//! Send failures are split three ways:
//! - Permanent failures (bad address, rejected content) - never retried
//! - Transient failures (timeouts, gateway busy) - retried with backoff
//! - Systemic failures (gateway unreachable, bad credentials) - abort the run
//!
//! The engine's own entry points have their own error types below.

use herald_common::{CampaignId, FailureClass, TransitionError};
use herald_store::StoreError;
use thiserror::Error;

/// Error returned by a [`MessageSender`](crate::MessageSender).
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// Permanent failure that should not be retried.
    #[error("Permanent failure: {0}")]
    Permanent(#[from] PermanentError),

    /// Failure that may succeed if the send is repeated after a delay.
    #[error("Transient failure: {0}")]
    Transient(#[from] TransientError),

    /// Failure of the gateway or the sender identity itself; no other
    /// recipient can succeed either.
    #[error("Systemic failure: {0}")]
    Systemic(#[from] SystemicError),
}

/// Errors that should not be retried.
#[derive(Debug, Error)]
pub enum PermanentError {
    /// Recipient address is malformed or unknown to the provider.
    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),

    /// Provider refused to deliver to this recipient (opted out, blocked).
    #[error("Recipient rejected: {0}")]
    RecipientRejected(String),

    /// Provider refused the message content.
    #[error("Message rejected: {0}")]
    MessageRejected(String),
}

/// Errors that should be retried with exponential backoff.
#[derive(Debug, Error)]
pub enum TransientError {
    /// The call to the gateway timed out.
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Gateway is temporarily unavailable.
    #[error("Gateway unavailable: {0}")]
    Unavailable(String),

    /// Provider-side rate limit hit.
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Connection dropped or could not be established.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
}

/// Errors that make the whole run pointless.
#[derive(Debug, Error)]
pub enum SystemicError {
    /// Credentials of the sender identity were refused.
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Sender identity is unknown or disabled at the gateway.
    #[error("Invalid sender identity: {0}")]
    InvalidSender(String),

    /// Gateway cannot be reached at all.
    #[error("Gateway unreachable: {0}")]
    GatewayUnreachable(String),

    /// Too many consecutive recipients exhausted their retries.
    #[error("Gateway outage: {0} consecutive recipients failed after retries")]
    GatewayOutage(u32),
}

impl DeliveryError {
    /// Returns `true` if this error is transient and should be retried.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Returns `true` if this error is permanent and should not be retried.
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(self, Self::Permanent(_))
    }

    /// Returns `true` if this error should abort the whole run.
    #[must_use]
    pub const fn is_systemic(&self) -> bool {
        matches!(self, Self::Systemic(_))
    }

    /// The class recorded on a recipient failed with this error.
    ///
    /// Systemic errors are never recorded against a recipient.
    #[must_use]
    pub const fn failure_class(&self) -> Option<FailureClass> {
        match self {
            Self::Permanent(_) => Some(FailureClass::Permanent),
            Self::Transient(_) => Some(FailureClass::TransientExhausted),
            Self::Systemic(_) => None,
        }
    }
}

/// Rejection of a start request.
#[derive(Debug, Error)]
pub enum StartError {
    /// A run for this campaign is already in progress.
    #[error("Campaign {0} is already running")]
    AlreadyRunning(CampaignId),

    /// The campaign cannot be started as defined.
    #[error("Invalid campaign {id}: {reason}")]
    InvalidCampaign { id: CampaignId, reason: String },

    /// The campaign store failed while preparing the run.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Rejection of a cancel request.
#[derive(Debug, Error)]
pub enum CancelError {
    #[error("Campaign {0} is not running")]
    NotRunning(CampaignId),
}

/// Failure to persist a recipient outcome.
#[derive(Debug, Error)]
#[error("Failed to record outcome for {recipient} after {attempts} attempt(s): {source}")]
pub struct RecordError {
    pub recipient: herald_common::Recipient,
    pub attempts: u32,
    #[source]
    pub source: StoreError,
}

/// Rejected update to the aggregate counters.
#[derive(Debug, Error)]
pub enum AggregateError {
    #[error("Campaign {0} is not tracked")]
    Untracked(CampaignId),

    #[error("Campaign {0} is not processing; counters are frozen")]
    NotProcessing(CampaignId),

    #[error("Campaign {0} already has an outcome for every recipient")]
    Overflow(CampaignId),

    #[error("Pending outcomes cannot be applied")]
    NotTerminal,

    #[error(transparent)]
    Transition(#[from] TransitionError),
}

/// Failure while waiting on or reconciling a run.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Campaign {0} is running")]
    Running(CampaignId),

    #[error("Run task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}
