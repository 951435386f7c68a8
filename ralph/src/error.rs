//! Error conditions the loop must tell apart from generic failures.
//!
//! Everything else travels as `anyhow::Error`; these are recovered with
//! `downcast_ref` at the iteration boundary.

use thiserror::Error;

use crate::core::types::AgentType;

/// The shared cancellation token fired. Never retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("operation cancelled")]
pub struct Cancelled;

/// An agent invocation failed (spawn error, non-zero exit, failed result, timeout).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{agent} agent failed: {reason}")]
pub struct AgentFailed {
    pub agent: AgentType,
    pub reason: String,
}

/// Returns true if `err` (or anything in its chain) is a cancellation.
pub fn is_cancelled(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| cause.downcast_ref::<Cancelled>().is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn cancellation_is_found_through_context() {
        let err = Err::<(), _>(Cancelled)
            .context("run agent")
            .unwrap_err();
        assert!(is_cancelled(&err));

        let other = anyhow::anyhow!("disk full");
        assert!(!is_cancelled(&other));
    }
}
