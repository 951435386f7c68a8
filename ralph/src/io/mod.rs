//! Side-effecting helpers: filesystem stores, subprocesses, prompts.

pub mod atomic;
pub mod config;
pub mod paths;
pub mod process;
pub mod prompt;
pub mod run_state;
pub mod task_store;
pub mod validator;
