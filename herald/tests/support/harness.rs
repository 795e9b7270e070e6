//! End-to-end test harness for herald
#![allow(dead_code)] // Test utility module - not all methods used in every test
//!
//! # Example
//!
//! ```no_run
//! use support::harness::E2ETestHarness;
//!
//! #[tokio::test]
//! async fn test_run() {
//!     let harness = E2ETestHarness::builder()
//!         .with_config("(dry_run: (latency_ms: 0))")
//!         .build()
//!         .unwrap();
//!
//!     let path = harness.write_campaign("launch.ron", "(channel: email, ...)");
//!     let snapshot = harness.run(&path).await.unwrap();
//! }
//! ```

use std::path::{Path, PathBuf};

use herald::{CampaignFile, Herald, HeraldConfig};
use herald_delivery::{CampaignId, ProgressSnapshot, Recipient};
use tempfile::TempDir;

/// Default configuration: no simulated latency, fast retries
pub const FAST_CONFIG: &str = r"(
    engine: (
        concurrency: 4,
        retry: (base_delay_ms: 1, max_delay_ms: 5, jitter_factor: 0.0),
        rate_limit: (messages_per_second: 10000.0, burst_size: 10000),
    ),
    dry_run: (latency_ms: 0),
)";

pub struct E2ETestHarness {
    /// Holds the config and campaign files for the lifetime of the test
    dir: TempDir,
    config_path: PathBuf,
    herald: Herald,
}

#[derive(Default)]
pub struct E2ETestHarnessBuilder {
    config: Option<String>,
}

impl E2ETestHarnessBuilder {
    /// Use this RON text as the configuration file
    pub fn with_config(mut self, config: &str) -> Self {
        self.config = Some(config.to_string());
        self
    }

    pub fn build(self) -> anyhow::Result<E2ETestHarness> {
        let dir = tempfile::tempdir()?;
        let config_path = dir.path().join("herald.config.ron");
        std::fs::write(
            &config_path,
            self.config.as_deref().unwrap_or(FAST_CONFIG),
        )?;

        let config = HeraldConfig::load(Some(&config_path))?;
        Ok(E2ETestHarness {
            dir,
            config_path,
            herald: Herald::new(&config),
        })
    }
}

impl E2ETestHarness {
    pub fn builder() -> E2ETestHarnessBuilder {
        E2ETestHarnessBuilder::default()
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub const fn herald(&self) -> &Herald {
        &self.herald
    }

    /// Write a campaign file into the harness directory
    pub fn write_campaign(&self, name: &str, content: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, content).expect("Failed to write campaign file");
        path
    }

    /// Load, submit and run a campaign file
    pub async fn run(&self, path: &Path) -> anyhow::Result<(CampaignId, ProgressSnapshot)> {
        let file = CampaignFile::from_path(path)?;
        let campaign_id = self.herald.submit(file).await?;
        let snapshot = self.herald.run(&campaign_id).await?;
        Ok((campaign_id, snapshot))
    }

    pub async fn pending(&self, campaign_id: &CampaignId) -> Vec<Recipient> {
        self.herald
            .pending(campaign_id)
            .await
            .expect("Failed to list pending recipients")
    }
}
