pub mod campaign;
pub mod error;
pub mod id;
pub mod logging;
pub mod outcome;
pub mod progress;
pub mod status;

pub use campaign::{Campaign, Channel, Payload, Recipient, SenderIdentity};
pub use error::TransitionError;
pub use id::CampaignId;
pub use outcome::{Failure, FailureClass, OutcomeState, RecipientOutcome};
pub use progress::{EventKind, ProgressEvent, ProgressSnapshot};
pub use status::CampaignStatus;
pub use tracing;

