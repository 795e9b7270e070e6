//! Test support utilities for end-to-end testing
//!
//! Campaigns and configuration go through real files on disk, the same way
//! the `herald` binary reads them.

pub mod harness;

pub use harness::E2ETestHarness;
