//! Scripted message sender for exercising delivery scenarios
#![allow(dead_code)] // Test utility module - not all methods used in every test
//!
//! The sender can:
//! - Fail chosen recipients permanently, transiently or systemically
//! - Delay chosen recipients (or every recipient)
//! - Hold every send at a gate until the test releases it
//! - Track calls, completion order and peak concurrency for verification
//!
//! # Example
//!
//! ```rust,no_run
//! use support::mock_sender::MockSender;
//!
//! let sender = MockSender::builder()
//!     .permanent("bad@example.com")
//!     .transient("flaky@example.com", 2) // two timeouts, then success
//!     .build();
//! ```

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use herald_delivery::{
    DeliveryError, Message, MessageSender, PermanentError, Recipient, SenderIdentity,
    SystemicError, TransientError,
};
use parking_lot::Mutex;
use tokio::sync::Semaphore;

#[derive(Debug, Clone, Copy)]
enum Rule {
    Permanent,
    /// Fail this many more times, then succeed
    Transient(u32),
    Systemic,
}

#[derive(Debug, Default)]
pub struct MockSenderBuilder {
    rules: HashMap<Recipient, Rule>,
    delays: HashMap<Recipient, Duration>,
    default_delay: Duration,
    gated: bool,
    failing_preflight: bool,
}

impl MockSenderBuilder {
    pub fn permanent(mut self, recipient: &str) -> Self {
        self.rules.insert(Recipient::from(recipient), Rule::Permanent);
        self
    }

    /// Time out `times` times before succeeding
    pub fn transient(mut self, recipient: &str, times: u32) -> Self {
        self.rules
            .insert(Recipient::from(recipient), Rule::Transient(times));
        self
    }

    pub fn systemic(mut self, recipient: &str) -> Self {
        self.rules.insert(Recipient::from(recipient), Rule::Systemic);
        self
    }

    pub fn delay(mut self, recipient: &str, delay: Duration) -> Self {
        self.delays.insert(Recipient::from(recipient), delay);
        self
    }

    pub const fn default_delay(mut self, delay: Duration) -> Self {
        self.default_delay = delay;
        self
    }

    /// Hold every send until [`MockSender::release`] lets it through
    pub const fn gated(mut self) -> Self {
        self.gated = true;
        self
    }

    pub const fn failing_preflight(mut self) -> Self {
        self.failing_preflight = true;
        self
    }

    pub fn build(self) -> Arc<MockSender> {
        Arc::new(MockSender {
            rules: Mutex::new(self.rules),
            delays: self.delays,
            default_delay: self.default_delay,
            gate: self.gated.then(|| Semaphore::new(0)),
            failing_preflight: self.failing_preflight,
            calls: Mutex::default(),
            completed: Mutex::default(),
            started: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            preflights: AtomicUsize::new(0),
        })
    }
}

#[derive(Debug)]
pub struct MockSender {
    rules: Mutex<HashMap<Recipient, Rule>>,
    delays: HashMap<Recipient, Duration>,
    default_delay: Duration,
    gate: Option<Semaphore>,
    failing_preflight: bool,
    calls: Mutex<HashMap<Recipient, u32>>,
    completed: Mutex<Vec<Recipient>>,
    started: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    preflights: AtomicUsize,
}

impl MockSender {
    pub fn builder() -> MockSenderBuilder {
        MockSenderBuilder::default()
    }

    /// A sender that accepts everything
    pub fn accepting() -> Arc<Self> {
        Self::builder().build()
    }

    /// Let `permits` gated sends through
    pub fn release(&self, permits: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(permits);
        }
    }

    /// Send calls made for `recipient`
    pub fn calls(&self, recipient: &str) -> u32 {
        self.calls
            .lock()
            .get(&Recipient::from(recipient))
            .copied()
            .unwrap_or_default()
    }

    /// Send calls made in total
    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    /// Recipients in the order their sends returned
    pub fn completed(&self) -> Vec<Recipient> {
        self.completed.lock().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn preflights(&self) -> usize {
        self.preflights.load(Ordering::SeqCst)
    }

    /// Wait until at least `count` sends have started
    pub async fn wait_for_started(&self, count: usize, timeout: Duration) {
        tokio::time::timeout(timeout, async {
            while self.started() < count {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("sends did not start in time");
    }

    fn reply(&self, recipient: &Recipient) -> Result<(), DeliveryError> {
        let mut rules = self.rules.lock();
        match rules.get_mut(recipient) {
            None => Ok(()),
            Some(Rule::Permanent) => Err(PermanentError::InvalidRecipient(format!(
                "{recipient} does not exist"
            ))
            .into()),
            Some(Rule::Systemic) => {
                Err(SystemicError::GatewayUnreachable("connection refused".to_string()).into())
            }
            Some(Rule::Transient(0)) => Ok(()),
            Some(Rule::Transient(remaining)) => {
                *remaining -= 1;
                Err(TransientError::Timeout("gateway did not answer".to_string()).into())
            }
        }
    }
}

#[async_trait]
impl MessageSender for MockSender {
    async fn send(&self, recipient: &Recipient, _message: &Message) -> Result<(), DeliveryError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        *self.calls.lock().entry(recipient.clone()).or_default() += 1;
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate closed").forget();
        }

        let delay = self
            .delays
            .get(recipient)
            .copied()
            .unwrap_or(self.default_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let result = self.reply(recipient);
        self.completed.lock().push(recipient.clone());
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn preflight(&self, sender: &SenderIdentity) -> Result<(), DeliveryError> {
        self.preflights.fetch_add(1, Ordering::SeqCst);
        if self.failing_preflight {
            return Err(SystemicError::AuthenticationFailed(format!("{sender} is not verified")).into());
        }
        Ok(())
    }
}
