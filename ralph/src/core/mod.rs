//! Deterministic, pure logic shared by the orchestrator.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod models;
pub mod retry;
pub mod selector;
pub mod stream;
pub mod types;
