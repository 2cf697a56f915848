//! Test doubles for code built on this crate.
//!
//! [`MemoryAdapter`] speaks no protocol: it records statements, simulates transactions
//! and savepoints with a journal, and hands out numbered connections from a bounded
//! pool, so transaction semantics can be tested without a database.

mod memory;

pub use memory::{MemoryAdapter, RecordedStatement};
