pub mod config;
pub mod controller;
pub mod sender;

pub use config::{DryRunConfig, HeraldConfig};
pub use controller::{CampaignFile, CheckReport, Herald};
pub use sender::DryRunSender;
