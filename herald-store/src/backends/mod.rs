//! Backend storage implementations
//!
//! - `memory`: in-memory storage for tests, demos and transient runs
//! - `test`: memory storage with fault injection and synchronization hooks

pub mod memory;

pub use memory::MemoryStore;
pub use test::TestStore;
