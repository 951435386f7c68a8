//! Deterministic selection logic for the task list.

use crate::core::types::{Task, TaskStatus};

/// Index of the pending task with the lowest `priority`.
///
/// Ties keep list order (the first occurrence wins). Returns `None` when no
/// task is pending.
pub fn next_task_index(tasks: &[Task]) -> Option<usize> {
    tasks
        .iter()
        .enumerate()
        .filter(|(_, task)| task.status == TaskStatus::Pending)
        // `min_by_key` returns the first minimum, which keeps ties stable.
        .min_by_key(|(_, task)| task.priority)
        .map(|(idx, _)| idx)
}

/// Mutable reference to the next task, for in-place updates on the caller's copy.
pub fn next_task(tasks: &mut [Task]) -> Option<&mut Task> {
    let idx = next_task_index(tasks)?;
    tasks.get_mut(idx)
}

/// Returns true if every task has reached a settled status.
///
/// An empty list is not complete: it means no plan exists yet.
pub fn all_settled(tasks: &[Task]) -> bool {
    !tasks.is_empty() && tasks.iter().all(|task| task.status.is_settled())
}


#[cfg(test)]
mod proptests {
    use super::*;
    use crate::test_support::task_with_status;
    use proptest::prelude::*;

    const STATUSES: [TaskStatus; 5] = [
        TaskStatus::Pending,
        TaskStatus::InProgress,
        TaskStatus::Completed,
        TaskStatus::Failed,
        TaskStatus::Skipped,
    ];

    fn build(spec: &[(i64, usize)]) -> Vec<Task> {
        spec.iter()
            .enumerate()
            .map(|(i, (priority, status))| {
                task_with_status(&format!("t{i}"), *priority, STATUSES[*status])
            })
            .collect()
    }

    proptest! {
        /// The selection is a pending task that no other pending task beats on
        /// priority or, at equal priority, on position. Repeated calls agree.
        #[test]
        fn selection_is_minimal_and_deterministic(
            spec in proptest::collection::vec((-5i64..5, 0usize..5), 0..12)
        ) {
            let tasks = build(&spec);
            let first = next_task_index(&tasks);
            prop_assert_eq!(first, next_task_index(&tasks));
            prop_assert_eq!(first, next_task_index(&tasks.clone()));

            match first {
                None => prop_assert!(tasks.iter().all(|t| t.status != TaskStatus::Pending)),
                Some(idx) => {
                    let chosen = &tasks[idx];
                    prop_assert_eq!(chosen.status, TaskStatus::Pending);
                    for (other_idx, other) in tasks.iter().enumerate() {
                        if other.status != TaskStatus::Pending {
                            continue;
                        }
                        prop_assert!(other.priority >= chosen.priority);
                        if other.priority == chosen.priority {
                            prop_assert!(other_idx >= idx);
                        }
                    }
                }
            }
        }
    }
}
