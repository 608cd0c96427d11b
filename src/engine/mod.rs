// src/engine/mod.rs

//! Built-in host for the task scheduler.
//!
//! - [`event_loop`] drives the scheduler and delivers fetch results and
//!   interrupts that arrive from other threads.
//! - [`workflow`] fetches whatever the selections are missing while the
//!   loop runs, and decides whether the program can be started.

use crate::download::{FetchId, FetchOutcome};

/// Events sent to the loop thread from fetch workers and signal handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopEvent {
    /// The fetch backend finished fetch `id`.
    FetchFinished { id: FetchId, outcome: FetchOutcome },
    /// The user asked to stop (Ctrl-C).
    Interrupted,
}

pub mod event_loop;
pub mod workflow;

pub use event_loop::EventLoop;
pub use workflow::{download_and_run, download_impls, missing_implementations, Readiness};
