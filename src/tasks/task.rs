// src/tasks/task.rs

//! Handle to a unit of suspendable work tracked by the [`Scheduler`](super::Scheduler).

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::errors::{LaunchError, Result};
use crate::tasks::Blocker;

/// Numeric task identifier; monotonically increasing per scheduler.
pub type TaskId = u64;

/// Handle returned by [`Scheduler::spawn`](super::Scheduler::spawn).
///
/// `finished` fires when the body terminates: triggered on success, failed
/// with the body's error otherwise. The output value can be taken once.
pub struct Task<T> {
    pub(crate) id: TaskId,
    pub(crate) label: String,
    pub(crate) finished: Blocker,
    pub(crate) output: Rc<RefCell<Option<T>>>,
}

impl<T> Task<T> {
    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn finished(&self) -> &Blocker {
        &self.finished
    }

    /// Take the task's output.
    ///
    /// Fails if the task has not finished yet, re-raises the task's error if
    /// it failed, and fails if the output was already taken.
    pub fn take_output(&self) -> Result<T> {
        if !self.finished.happened() {
            return Err(LaunchError::Internal(format!(
                "task '{}' has not finished",
                self.label
            )));
        }
        self.finished.check()?;
        self.output.borrow_mut().take().ok_or_else(|| {
            LaunchError::Internal(format!("output of task '{}' already taken", self.label))
        })
    }
}

impl<T> fmt::Debug for Task<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("finished", &self.finished.happened())
            .finish()
    }
}
