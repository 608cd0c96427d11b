// src/tasks/blocker.rs

//! One-shot events that tasks can wait on.
//!
//! A [`Blocker`] is a plain observer list: tasks waiting on it register a
//! `Waker`, and firing the blocker drains the list and wakes each waiter
//! exactly once. Firing is idempotent.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use tracing::trace;

use crate::errors::{LaunchError, Result};

struct Inner {
    label: String,
    happened: Cell<bool>,
    failure: RefCell<Option<LaunchError>>,
    waiters: RefCell<Vec<(u64, Waker)>>,
    next_key: Cell<u64>,
}

/// A one-shot event with states {pending, happened}.
///
/// Cloning produces another handle to the same event.
#[derive(Clone)]
pub struct Blocker {
    inner: Rc<Inner>,
}

impl Blocker {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            inner: Rc::new(Inner {
                label: label.into(),
                happened: Cell::new(false),
                failure: RefCell::new(None),
                waiters: RefCell::new(Vec::new()),
                next_key: Cell::new(0),
            }),
        }
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    pub fn happened(&self) -> bool {
        self.inner.happened.get()
    }

    /// Mark the event as happened and wake everyone waiting on it.
    pub fn trigger(&self) {
        self.fire(None);
    }

    /// Mark the event as happened, carrying a failure that [`check`](Self::check)
    /// will report to every waiter.
    pub fn fail(&self, err: LaunchError) {
        self.fire(Some(err));
    }

    fn fire(&self, failure: Option<LaunchError>) {
        if self.inner.happened.get() {
            trace!(blocker = %self.inner.label, "already happened; ignoring trigger");
            return;
        }
        self.inner.happened.set(true);
        *self.inner.failure.borrow_mut() = failure;

        let waiters = std::mem::take(&mut *self.inner.waiters.borrow_mut());
        trace!(blocker = %self.inner.label, waiters = waiters.len(), "blocker fired");
        for (_, waker) in waiters {
            waker.wake();
        }
    }

    /// Re-raise the failure this blocker was fired with, if any.
    pub fn check(&self) -> Result<()> {
        match &*self.inner.failure.borrow() {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    pub fn failure(&self) -> Option<LaunchError> {
        self.inner.failure.borrow().clone()
    }

    /// Future that resolves once this blocker has happened.
    pub fn wait(&self) -> WaitAny {
        wait_any([self.clone()])
    }

    pub fn ptr_eq(&self, other: &Blocker) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Number of tasks currently parked on this blocker.
    pub fn waiter_count(&self) -> usize {
        self.inner.waiters.borrow().len()
    }

    fn register(&self, waker: &Waker) -> u64 {
        let key = self.inner.next_key.get();
        self.inner.next_key.set(key + 1);
        self.inner.waiters.borrow_mut().push((key, waker.clone()));
        key
    }

    fn deregister(&self, key: u64) {
        self.inner.waiters.borrow_mut().retain(|(k, _)| *k != key);
    }
}

impl fmt::Display for Blocker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Blocker:{}>", self.inner.label)
    }
}

impl fmt::Debug for Blocker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Blocker")
            .field("label", &self.inner.label)
            .field("happened", &self.inner.happened.get())
            .finish_non_exhaustive()
    }
}

/// Wait until at least one of `blockers` has happened.
///
/// The waiting task has to check for itself which one fired. Registrations
/// on the other blockers are withdrawn as soon as the future resolves or is
/// dropped, so a task is never resumed because of a stale registration.
pub fn wait_any(blockers: impl IntoIterator<Item = Blocker>) -> WaitAny {
    let blockers: Vec<Blocker> = blockers.into_iter().collect();
    let keys = vec![None; blockers.len()];
    WaitAny { blockers, keys }
}

pub struct WaitAny {
    blockers: Vec<Blocker>,
    keys: Vec<Option<u64>>,
}

impl WaitAny {
    fn release(&mut self) {
        for (blocker, key) in self.blockers.iter().zip(self.keys.iter_mut()) {
            if let Some(k) = key.take() {
                blocker.deregister(k);
            }
        }
    }
}

impl Future for WaitAny {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();

        if this.blockers.is_empty() || this.blockers.iter().any(Blocker::happened) {
            this.release();
            return Poll::Ready(());
        }

        // Drop any registration from a previous poll before adding the new
        // one, so each blocker holds at most one waker for this task.
        this.release();
        for (blocker, key) in this.blockers.iter().zip(this.keys.iter_mut()) {
            *key = Some(blocker.register(cx.waker()));
        }
        Poll::Pending
    }
}

impl Drop for WaitAny {
    fn drop(&mut self) {
        self.release();
    }
}
