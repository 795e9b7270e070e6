#![allow(dead_code)]

pub mod mock_sender;

use std::sync::Arc;

use herald_delivery::{
    Campaign, Channel, EngineConfig, MessageSender, Orchestrator, Payload, RateLimitConfig,
    Recipient, RecorderConfig, RetryPolicy, SenderIdentity, SenderRegistry,
};
use herald_store::{CampaignStore, TestStore};

pub use mock_sender::MockSender;

/// Engine settings that keep tests fast: tiny backoff, no throttling
pub fn fast_config() -> EngineConfig {
    EngineConfig {
        retry: RetryPolicy {
            max_retries: 2,
            base_delay_ms: 1,
            max_delay_ms: 5,
            jitter_factor: 0.0,
        },
        rate_limit: RateLimitConfig {
            messages_per_second: 100_000.0,
            burst_size: 100_000,
            ..RateLimitConfig::default()
        },
        recorder: RecorderConfig {
            attempts: 3,
            retry_delay_ms: 1,
        },
        ..EngineConfig::default()
    }
}

pub fn recipients(count: usize) -> Vec<Recipient> {
    (0..count)
        .map(|i| Recipient::new(format!("user{i}@example.com")))
        .collect()
}

pub fn email_campaign(recipients: Vec<Recipient>) -> Campaign {
    Campaign::new(
        Channel::Email,
        Payload::text("Our spring sale starts today").with_subject("Spring sale"),
        SenderIdentity::new("news@example.com"),
        recipients,
    )
}

/// An orchestrator over a fresh test store with `sender` on every channel
pub fn engine(
    config: EngineConfig,
    sender: Arc<dyn MessageSender>,
) -> (Arc<Orchestrator>, TestStore) {
    let store = TestStore::new();
    let senders = SenderRegistry::new()
        .with(Channel::Email, Arc::clone(&sender))
        .with(Channel::WhatsApp, sender);
    let orchestrator = Orchestrator::new(
        config,
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        senders,
    );
    (Arc::new(orchestrator), store)
}

pub async fn seed(store: &TestStore, campaign: &Campaign) {
    store.save(campaign).await.expect("failed to seed campaign");
}
