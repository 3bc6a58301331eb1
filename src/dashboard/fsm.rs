//! The task status state machine (spec §3 Task, §8 invariant 1).

use chrono::Utc;

use crate::domain::{Task, TaskStatus};

/// Outcome of attempting a status transition.
pub struct Transition {
    pub ok: bool,
    pub message: String,
}

impl Transition {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            message: message.into(),
        }
    }

    fn rejected(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
        }
    }
}

/// Apply `next` to `task`, enforcing the FSM. `task` is mutated in place
/// only when the transition is accepted.
///
/// The only blocked transition is re-entering `in_progress` from a terminal
/// state (`completed`/`failed`/`cancelled`) — that must go through
/// `reopen_task` instead. Every other transition, including a direct
/// `pending -> failed` (a task can fail before ever starting), is allowed;
/// grounded on `original_source/src/managers/dashboard_manager.py`'s
/// `update_task_status`, which has no enumerated whitelist of legal edges.
pub fn apply_status(task: &mut Task, next: TaskStatus, progress: Option<u8>) -> Transition {
    use TaskStatus::*;

    if task.status.is_terminal() && next == InProgress {
        return Transition::rejected(
            "終端状態ではありません。reopen_task を使用して再オープンしてください。",
        );
    }

    match next {
        InProgress => {
            if task.started_at.is_none() {
                task.started_at = Some(Utc::now());
            }
        }
        Completed | Failed | Cancelled => {
            task.completed_at = Some(Utc::now());
        }
        Blocked | Pending => {}
    }
    task.status = next;

    if let Some(p) = progress {
        if task.status != Completed {
            task.progress = p.min(100);
        }
    }
    if task.status == Completed {
        task.progress = 100;
    }

    Transition::ok(format!("status set to {}", task.status.as_str()))
}

/// `reopen_task`: only legal from a terminal state. Clears `started_at`/
/// `completed_at`, optionally resets progress, and returns the task to
/// `pending`.
pub fn reopen(task: &mut Task, reset_progress: bool) -> Transition {
    if !task.status.is_terminal() {
        return Transition::rejected("終端状態ではありません。reopen_task は不要です。".to_string());
    }
    task.status = TaskStatus::Pending;
    task.started_at = None;
    task.completed_at = None;
    if reset_progress {
        task.progress = 0;
    }
    Transition::ok("task reopened to pending".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task() -> Task {
        Task::new("t1", "T")
    }

    #[test]
    fn pending_to_in_progress_sets_started_at() {
        let mut t = task();
        let r = apply_status(&mut t, TaskStatus::InProgress, None);
        assert!(r.ok);
        assert!(t.started_at.is_some());
    }

    #[test]
    fn completed_forces_progress_100() {
        let mut t = task();
        apply_status(&mut t, TaskStatus::InProgress, None);
        let r = apply_status(&mut t, TaskStatus::Completed, Some(40));
        assert!(r.ok);
        assert_eq!(t.progress, 100);
        assert!(t.completed_at.is_some());
    }

    #[test]
    fn terminal_to_in_progress_is_rejected_and_requires_reopen() {
        let mut t = task();
        apply_status(&mut t, TaskStatus::InProgress, None);
        apply_status(&mut t, TaskStatus::Completed, None);
        let r = apply_status(&mut t, TaskStatus::InProgress, None);
        assert!(!r.ok);
        assert!(r.message.contains("reopen_task"));
    }

    #[test]
    fn reopen_twice_on_terminal_task_is_idempotent_pending_state() {
        let mut t = task();
        apply_status(&mut t, TaskStatus::InProgress, None);
        apply_status(&mut t, TaskStatus::Completed, None);
        let r1 = reopen(&mut t, true);
        assert!(r1.ok);
        assert_eq!(t.status, TaskStatus::Pending);
        assert_eq!(t.progress, 0);
        assert!(t.started_at.is_none() && t.completed_at.is_none());

        // reopen is rejected on a non-terminal (pending) task
        let r2 = reopen(&mut t, true);
        assert!(!r2.ok);
    }

    #[test]
    fn pending_can_fail_directly_without_ever_starting() {
        let mut t = task();
        let r = apply_status(&mut t, TaskStatus::Failed, None);
        assert!(r.ok);
        assert_eq!(t.status, TaskStatus::Failed);
        assert!(t.started_at.is_none());
        assert!(t.completed_at.is_some());
    }

    #[test]
    fn blocked_is_reachable_and_returnable() {
        let mut t = task();
        apply_status(&mut t, TaskStatus::InProgress, None);
        let r1 = apply_status(&mut t, TaskStatus::Blocked, None);
        assert!(r1.ok);
        assert!(t.completed_at.is_none());
        let r2 = apply_status(&mut t, TaskStatus::InProgress, None);
        assert!(r2.ok);
    }
}
