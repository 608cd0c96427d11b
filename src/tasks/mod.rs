// src/tasks/mod.rs

//! Minimal cooperative concurrency.
//!
//! - [`blocker`] holds the one-shot [`Blocker`] event and [`wait_any`].
//! - [`task`] holds the [`Task`] handle returned when work is spawned.
//! - [`scheduler`] polls tasks whenever the blockers they wait on fire.
//! - [`bridge`] lets synchronous code wait for a blocker by running the
//!   host's [`MainLoop`].
//!
//! Everything here is single-threaded (`Rc`-based) by construction.

pub mod blocker;
pub mod bridge;
pub mod scheduler;
pub mod task;

pub use blocker::{wait_any, Blocker, WaitAny};
pub use bridge::{nested_wait_active, wait_for, MainLoop};
pub use scheduler::Scheduler;
pub use task::{Task, TaskId};
