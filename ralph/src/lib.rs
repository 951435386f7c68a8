//! Autonomous task loop driving external AI coding agents.
//!
//! A task list (`tasks.json`) is worked through one task per iteration: the
//! highest-priority pending task is handed to an agent CLI, an optional
//! validation command decides pass/fail, and a bounded retry policy settles
//! the task. The architecture keeps a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (selection, retry policy, stream
//!   normalization). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (filesystem, processes, prompts).
//! - **[`agents`]**: Adapters over the supported agent backends.
//!
//! [`orchestrator`] composes the three into the running loop and talks to its
//! host through bounded event and command channels.

pub mod agents;
pub mod core;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod orchestrator;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
