//! Broadcast delivery engine
//!
//! This crate provides functionality to:
//! - Run a campaign's recipient list through a bounded pool of workers
//! - Retry transient send failures with jittered exponential backoff
//! - Throttle sends per channel with token buckets
//! - Record one terminal outcome per recipient, exactly once
//! - Keep aggregate counters and publish progress events while a run is live
//! - Cancel a run cooperatively, leaving unresolved recipients pending

mod aggregator;
mod cancel;
mod config;
mod error;
mod orchestrator;
pub mod policy;
mod pool;
mod publisher;
mod rate_limiter;
mod recorder;
mod sender;

pub use aggregator::ProgressAggregator;
pub use cancel::{CancelSignal, Cancelled};
pub use config::{EngineConfig, MAX_CONCURRENCY};
// Re-export common types
pub use herald_common::{
    Campaign, CampaignId, CampaignStatus, Channel, EventKind, Failure, FailureClass, OutcomeState,
    Payload, ProgressEvent, ProgressSnapshot, Recipient, RecipientOutcome, SenderIdentity,
};
// Re-export error types
pub use error::{
    AggregateError, CancelError, DeliveryError, EngineError, PermanentError, RecordError,
    StartError, SystemicError, TransientError,
};
pub use orchestrator::{CANCELLED_REASON, Orchestrator, RunHandle};
pub use policy::RetryPolicy;
pub use publisher::ProgressPublisher;
pub use rate_limiter::{ChannelRateLimit, RateLimitConfig, RateLimiter};
pub use recorder::{OutcomeRecorder, RecorderConfig};
pub use sender::{Message, MessageSender, SenderRegistry};
