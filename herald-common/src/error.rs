//! Error types shared across the herald crates.

use thiserror::Error;

use crate::CampaignStatus;

/// A campaign status change that the lifecycle does not allow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Invalid status transition: {from} -> {to}")]
pub struct TransitionError {
    pub from: CampaignStatus,
    pub to: CampaignStatus,
}
