//! Delivery policy abstractions.
//!
//! Policies are plain configuration with behaviour attached, kept separate
//! from the worker pool so they can be reasoned about and tested alone.

pub mod retry;

pub use retry::RetryPolicy;
