//! Storage consumed by the delivery engine
//!
//! The engine only needs simple load/save calls for campaigns and a keyed,
//! write-once store for per-recipient outcomes. Hosts plug in their own
//! database by implementing [`CampaignStore`] and [`OutcomeStore`].

pub mod backends;
pub mod error;
pub mod store;

pub use backends::{MemoryStore, TestStore};
pub use error::{Result, StoreError};
pub use store::{CampaignStore, OutcomeStore};
