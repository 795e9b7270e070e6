use core::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::error::TransitionError;

/// Lifecycle of a campaign run
///
/// ```text
/// Pending ──> Processing ──> Completed
///                  └───────> Failed
/// ```
///
/// `Completed` and `Failed` are terminal.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

impl CampaignStatus {
    /// Checks if no further transition is possible
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Processing)
                | (Self::Processing, Self::Completed | Self::Failed)
        )
    }

    /// Validate a transition, returning the new status
    ///
    /// # Errors
    ///
    /// If `next` is not reachable from `self`
    pub const fn transition(self, next: Self) -> Result<Self, TransitionError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(TransitionError {
                from: self,
                to: next,
            })
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl Display for CampaignStatus {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        fmt.write_str(self.as_str())
    }
}
