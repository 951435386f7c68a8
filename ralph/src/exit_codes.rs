//! Stable exit codes for ralph CLI commands.

/// Command succeeded: `ralph tasks` found pending work, or `ralph run` settled the list.
pub const OK: i32 = 0;
/// Command failed due to invalid config/task list/state or other errors.
pub const INVALID: i32 = 1;
/// `ralph tasks` found nothing pending.
pub const COMPLETE: i32 = 2;
/// `ralph run` was interrupted before the list was settled.
pub const CANCELLED: i32 = 130;
