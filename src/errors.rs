// src/errors.rs

//! Crate-wide error type and helpers.
//!
//! `LaunchError` is `Clone` so that a failure can be carried by a
//! [`Blocker`](crate::tasks::Blocker) and re-raised to every task waiting on
//! it. Non-cloneable sources (IO errors) are kept behind an `Arc`.

use std::sync::Arc;

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum LaunchError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(Arc<std::io::Error>),

    #[error("Invalid selections document: {0}")]
    Selections(String),

    #[error("No selection for interface '{0}'")]
    MissingSelection(String),

    #[error("Cycle detected in selections: {0}")]
    SelectionCycle(String),

    #[error("Implementation '{0}' is not in the cache")]
    NotStored(String),

    #[error("No valid signatures found. Signatures:{0}")]
    NoValidSignatures(String),

    #[error("Not signed with a trusted key")]
    NotTrusted,

    #[error("Can't extract domain from URL '{0}'")]
    BadDomain(String),

    #[error(
        "Implementation '{0}' cannot be executed directly; it is just a library to be used by \
         other programs (or missing 'main' attribute)"
    )]
    NotExecutable(String),

    #[error("File '{path}' does not exist.\n(implementation '{id}' + program '{main}')")]
    MissingFile {
        path: String,
        id: String,
        main: String,
    },

    #[error("Failed to run '{program}': {reason}")]
    FailedToRun { program: String, reason: String },

    #[error("Download of '{url}' failed: {reason}")]
    DownloadFailed { url: String, reason: String },

    #[error("Download of '{0}' was aborted")]
    DownloadAborted(String),

    #[error("Not all downloads succeeded; cannot run program.")]
    PartialDownload,

    #[error("Cancelled by user")]
    Cancelled,

    #[error("Invalid selections handoff: {0}")]
    Handoff(String),

    #[error("Event loop stopped while waiting for {0}")]
    LoopStopped(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl LaunchError {
    /// Expected failures carry a message meant for the user. Everything else
    /// is logged with full detail before it is shown.
    pub fn is_user_facing(&self) -> bool {
        !matches!(self, LaunchError::IoError(_) | LaunchError::Internal(_))
    }
}

impl From<std::io::Error> for LaunchError {
    fn from(err: std::io::Error) -> Self {
        LaunchError::IoError(Arc::new(err))
    }
}

impl From<toml::de::Error> for LaunchError {
    fn from(err: toml::de::Error) -> Self {
        LaunchError::ConfigError(format!("TOML parsing error: {err}"))
    }
}

impl From<anyhow::Error> for LaunchError {
    fn from(err: anyhow::Error) -> Self {
        LaunchError::Internal(format!("{err:#}"))
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, LaunchError>;
