// src/tasks/scheduler.rs

//! Single-threaded cooperative scheduler.
//!
//! Tasks are boxed futures. They only ever suspend on [`Blocker`]s; when a
//! blocker fires, the wakers it holds push the waiting task ids onto the
//! ready queue, and the next call to [`Scheduler::run_pending`] polls them.
//!
//! The scheduler performs no IO and owns no threads: whoever drives it (the
//! host's main loop, or [`EventLoop`](crate::engine::EventLoop)) decides when
//! a pass happens.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll, Wake, Waker};

use tracing::{debug, error, info, trace};

use crate::errors::Result;
use crate::tasks::task::{Task, TaskId};
use crate::tasks::Blocker;

type LocalBoxFuture = Pin<Box<dyn Future<Output = ()>>>;

struct Slot {
    label: String,
    /// `None` while the task is being polled.
    future: Option<LocalBoxFuture>,
}

/// Queue of task ids that have been woken. Shared with wakers, which have
/// to be `Send + Sync`, hence the mutex.
#[derive(Default)]
struct ReadyQueue {
    queue: Mutex<VecDeque<TaskId>>,
}

impl ReadyQueue {
    fn push(&self, id: TaskId) {
        let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
        if !queue.contains(&id) {
            queue.push_back(id);
        }
    }

    /// Forget wakeups for a task that has terminated.
    fn remove(&self, id: TaskId) {
        let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
        queue.retain(|queued| *queued != id);
    }

    fn drain(&self) -> Vec<TaskId> {
        let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
        queue.drain(..).collect()
    }

    fn len(&self) -> usize {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

struct TaskWaker {
    id: TaskId,
    ready: Arc<ReadyQueue>,
}

impl Wake for TaskWaker {
    fn wake(self: Arc<Self>) {
        self.ready.push(self.id);
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.ready.push(self.id);
    }
}

struct Inner {
    tasks: RefCell<HashMap<TaskId, Slot>>,
    ready: Arc<ReadyQueue>,
    next_id: Cell<TaskId>,
}

/// Cheap, cloneable handle to a single-threaded task scheduler.
#[derive(Clone)]
pub struct Scheduler {
    inner: Rc<Inner>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(Inner {
                tasks: RefCell::new(HashMap::new()),
                ready: Arc::new(ReadyQueue::default()),
                next_id: Cell::new(0),
            }),
        }
    }

    /// Register `body` as a new task. It first runs on the next pass.
    pub fn spawn<T, F>(&self, label: impl Into<String>, body: F) -> Task<T>
    where
        T: 'static,
        F: Future<Output = Result<T>> + 'static,
    {
        let id = self.inner.next_id.get();
        self.inner.next_id.set(id + 1);

        let label = label.into();
        let finished = Blocker::new(format!("{label} finished"));
        let output = Rc::new(RefCell::new(None));

        let task_label = label.clone();
        let task_finished = finished.clone();
        let task_output = Rc::clone(&output);
        let wrapped = async move {
            match body.await {
                Ok(value) => {
                    *task_output.borrow_mut() = Some(value);
                    task_finished.trigger();
                }
                Err(err) => {
                    if err.is_user_facing() {
                        info!(task = %task_label, error = %err, "task failed");
                    } else {
                        error!(task = %task_label, error = ?err, "unexpected failure in task");
                    }
                    task_finished.fail(err);
                }
            }
        };

        self.inner.tasks.borrow_mut().insert(
            id,
            Slot {
                label: label.clone(),
                future: Some(Box::pin(wrapped)),
            },
        );
        self.inner.ready.push(id);
        debug!(task = %label, id, "task created");

        Task {
            id,
            label,
            finished,
            output,
        }
    }

    /// Run one scheduling pass over every task that was ready when the pass
    /// started. Tasks woken during the pass run on the next one.
    ///
    /// Returns the number of tasks polled.
    pub fn run_pending(&self) -> usize {
        let batch = self.inner.ready.drain();
        let mut polled = 0;

        for id in batch {
            let (label, future) = {
                let mut tasks = self.inner.tasks.borrow_mut();
                match tasks.get_mut(&id) {
                    Some(slot) => (slot.label.clone(), slot.future.take()),
                    None => {
                        if id < self.inner.next_id.get() {
                            panic!("task {id} was resumed after it terminated");
                        }
                        continue;
                    }
                }
            };

            // Already being polled further up the stack.
            let Some(mut future) = future else {
                continue;
            };

            let waker = Waker::from(Arc::new(TaskWaker {
                id,
                ready: Arc::clone(&self.inner.ready),
            }));
            let mut cx = Context::from_waker(&waker);

            trace!(task = %label, id, "resuming task");
            polled += 1;

            match future.as_mut().poll(&mut cx) {
                Poll::Ready(()) => {
                    self.inner.tasks.borrow_mut().remove(&id);
                    // It may have been woken earlier in this pass.
                    self.inner.ready.remove(id);
                    debug!(task = %label, id, "task terminated");
                }
                Poll::Pending => {
                    if let Some(slot) = self.inner.tasks.borrow_mut().get_mut(&id) {
                        slot.future = Some(future);
                    }
                }
            }
        }

        polled
    }

    /// Keep running passes until no task is ready.
    pub fn run_until_stalled(&self) -> usize {
        let mut total = 0;
        loop {
            let polled = self.run_pending();
            if polled == 0 && !self.has_ready() {
                return total;
            }
            total += polled;
        }
    }

    pub fn has_ready(&self) -> bool {
        self.inner.ready.len() > 0
    }

    /// Number of tasks that have not terminated yet.
    pub fn live_tasks(&self) -> usize {
        self.inner.tasks.borrow().len()
    }

    pub fn is_idle(&self) -> bool {
        self.live_tasks() == 0
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("live_tasks", &self.live_tasks())
            .field("ready", &self.inner.ready.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::errors::LaunchError;
    use crate::tasks::wait_any;

    #[test]
    fn task_runs_to_completion_and_exposes_output() {
        let scheduler = Scheduler::new();
        let task = scheduler.spawn("answer", async { Ok(42) });

        assert!(!task.finished().happened());
        scheduler.run_until_stalled();

        assert!(task.finished().happened());
        assert_eq!(task.take_output().unwrap(), 42);
        assert!(scheduler.is_idle());
    }

    #[test]
    fn failed_task_fails_its_finished_blocker() {
        let scheduler = Scheduler::new();
        let task: Task<()> = scheduler.spawn("broken", async { Err(LaunchError::NotTrusted) });
        scheduler.run_until_stalled();

        assert!(matches!(task.finished().check(), Err(LaunchError::NotTrusted)));
        assert!(matches!(task.take_output(), Err(LaunchError::NotTrusted)));
    }

    #[test]
    fn all_waiters_resume_in_the_same_pass() {
        let scheduler = Scheduler::new();
        let gate = Blocker::new("gate");
        let log = Rc::new(RefCell::new(Vec::new()));

        for name in ["a", "b", "c"] {
            let gate = gate.clone();
            let log = Rc::clone(&log);
            scheduler.spawn(name, async move {
                gate.wait().await;
                log.borrow_mut().push(name);
                Ok(())
            });
        }

        scheduler.run_until_stalled();
        assert!(log.borrow().is_empty());
        assert_eq!(gate.waiter_count(), 3);

        gate.trigger();
        assert_eq!(scheduler.run_pending(), 3);
        assert_eq!(log.borrow().len(), 3);
        assert!(scheduler.is_idle());
    }

    #[test]
    fn task_waiting_on_two_blockers_wakes_once_per_pass() {
        let scheduler = Scheduler::new();
        let first = Blocker::new("first");
        let second = Blocker::new("second");
        let resumed = Rc::new(Cell::new(0));

        let (f, s, r) = (first.clone(), second.clone(), Rc::clone(&resumed));
        scheduler.spawn("both", async move {
            wait_any([f.clone(), s.clone()]).await;
            r.set(r.get() + 1);
            Ok(())
        });
        scheduler.run_until_stalled();

        first.trigger();
        second.trigger();
        assert_eq!(scheduler.run_pending(), 1);
        assert_eq!(resumed.get(), 1);
        assert_eq!(second.waiter_count(), 0);
        assert_eq!(scheduler.run_pending(), 0);
    }

    #[test]
    fn wakeups_queued_before_termination_are_dropped() {
        let scheduler = Scheduler::new();
        let cancel = Blocker::new("cancel");

        let gate = Blocker::new("gate");
        let g = gate.clone();
        let worker = scheduler.spawn("worker", async move {
            g.wait().await;
            Ok(())
        });
        let (w, c) = (worker.finished().clone(), cancel.clone());
        scheduler.spawn("watcher", async move {
            wait_any([w, c]).await;
            Ok(())
        });
        scheduler.run_until_stalled();

        // Both wake the watcher; the worker finishing inside the same pass
        // wakes it a second time.
        gate.trigger();
        cancel.trigger();
        scheduler.run_until_stalled();
        assert!(scheduler.is_idle());
    }

    #[test]
    fn registrations_are_withdrawn_when_a_task_resumes() {
        let scheduler = Scheduler::new();
        let fired = Blocker::new("fired");
        let never = Blocker::new("never");

        let (a, b) = (fired.clone(), never.clone());
        scheduler.spawn("racer", async move {
            wait_any([a, b]).await;
            Ok(())
        });
        scheduler.run_until_stalled();
        assert_eq!(never.waiter_count(), 1);

        fired.trigger();
        scheduler.run_until_stalled();
        assert_eq!(never.waiter_count(), 0);

        // Firing the other blocker later must not resume the dead task.
        never.trigger();
        assert_eq!(scheduler.run_pending(), 0);
    }
}
