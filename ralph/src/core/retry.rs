//! Retry policy applied to a task after an iteration.

use crate::core::types::{Task, TaskStatus};

/// Retry budget used when a task leaves `maxRetries` at zero.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Resolve the retry budget for `task`, substituting `default_max` for zero.
pub fn effective_max_retries(task: &Task, default_max: u32) -> u32 {
    if task.max_retries == 0 {
        default_max
    } else {
        task.max_retries
    }
}

/// Apply the outcome of one iteration to `task` and return the new status.
///
/// - pass: `completed`, retry count reset to 0.
/// - fail with budget left: back to `pending`, retry count incremented.
/// - fail with budget exhausted: `skipped`.
pub fn apply_iteration_outcome(task: &mut Task, passed: bool, default_max: u32) -> TaskStatus {
    if passed {
        task.status = TaskStatus::Completed;
        task.retry_count = 0;
    } else if task.retry_count < effective_max_retries(task, default_max) {
        task.status = TaskStatus::Pending;
        task.retry_count += 1;
    } else {
        task.status = TaskStatus::Skipped;
    }
    task.status
}


#[cfg(test)]
mod proptests {
    use super::*;
    use crate::test_support::task;
    use proptest::prelude::*;

    proptest! {
        /// Failures only ever raise the counter, a pass is the only reset, and
        /// a task is skipped exactly when its budget is spent.
        #[test]
        fn retry_count_is_monotonic_until_settled(
            max_retries in 0u32..6,
            default_max in 1u32..6,
            outcomes in proptest::collection::vec(any::<bool>(), 1..16),
        ) {
            let mut t = task("a", 0);
            t.max_retries = max_retries;
            let budget = effective_max_retries(&t, default_max);

            for passed in outcomes {
                let before = t.retry_count;
                let status = apply_iteration_outcome(&mut t, passed, default_max);
                if passed {
                    prop_assert_eq!(status, TaskStatus::Completed);
                    prop_assert_eq!(t.retry_count, 0);
                    break;
                }
                prop_assert!(t.retry_count >= before);
                prop_assert!(t.retry_count <= budget);
                if status == TaskStatus::Skipped {
                    prop_assert_eq!(before, budget);
                    prop_assert_eq!(t.retry_count, budget);
                    break;
                }
                prop_assert_eq!(status, TaskStatus::Pending);
                prop_assert_eq!(t.retry_count, before + 1);
            }
        }
    }
}
