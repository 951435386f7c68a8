//! Iteration loop and its host-facing message channels.
//!
//! [`Orchestrator::new`] returns the loop plus [`HostChannels`]; the host drives
//! [`Orchestrator::run`] on a task and communicates only through the channels
//! and the shared cancellation token.

mod looping;
pub mod messages;

pub use looping::{LoopStop, Orchestrator};
pub use messages::{Command, Event, HostChannels, Snapshot};
