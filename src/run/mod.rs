// src/run/mod.rs

//! Execution engine: binding application, entry-point resolution and the
//! dispatch modes (dry run, direct, sandboxed, test capture).

pub mod env;
pub mod launcher;
pub mod plan;
pub mod runner;
pub mod store;

pub use env::ProcessEnv;
pub use launcher::{inherit_fd, LaunchCommand, OsLauncher, ProcessLauncher};
pub use plan::{apply_bindings, implementation_path, resolve_program};
pub use runner::{RunOptions, RunOutcome, Runner};
pub use store::{DirStore, ImplementationStore};
