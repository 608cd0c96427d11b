// src/tasks/bridge.rs

//! Synchronous bridge between plain code and the task scheduler.
//!
//! [`wait_for`] runs the host's main loop until a blocker fires. Only one
//! such wait may be active per thread: nesting them would hand ownership of
//! the loop to an inner caller that the outer one cannot see, so a nested
//! call is treated as a programming error and panics.

use std::cell::Cell;

use tracing::debug;

use crate::errors::{LaunchError, Result};
use crate::tasks::Blocker;

/// The host's "run one iteration" primitive.
///
/// An iteration should make progress if any is possible: run ready tasks,
/// or block until an external event arrives and dispatch it. Returning an
/// error means the loop can never make progress again.
pub trait MainLoop {
    fn iterate(&mut self) -> Result<()>;
}

thread_local! {
    static WAIT_ACTIVE: Cell<bool> = const { Cell::new(false) };
}

/// Token proving that this thread owns the (single) nested wait.
struct WaitGuard;

impl WaitGuard {
    fn enter(blocker: &Blocker) -> Self {
        WAIT_ACTIVE.with(|active| {
            assert!(
                !active.replace(true),
                "nested wait_for({blocker}) while another wait is already running the main loop"
            );
        });
        WaitGuard
    }
}

impl Drop for WaitGuard {
    fn drop(&mut self) {
        WAIT_ACTIVE.with(|active| active.set(false));
    }
}

/// Whether a [`wait_for`] is currently running the main loop on this thread.
pub fn nested_wait_active() -> bool {
    WAIT_ACTIVE.with(Cell::get)
}

/// Run `main_loop` until `blocker` has happened, then propagate any failure
/// it carries.
pub fn wait_for(main_loop: &mut dyn MainLoop, blocker: &Blocker) -> Result<()> {
    if !blocker.happened() {
        let _guard = WaitGuard::enter(blocker);
        debug!(%blocker, "entering main loop");

        while !blocker.happened() {
            main_loop.iterate().map_err(|err| match err {
                LaunchError::LoopStopped(_) => LaunchError::LoopStopped(blocker.to_string()),
                other => other,
            })?;
        }

        debug!(%blocker, "leaving main loop");
    }

    blocker.check()
}
