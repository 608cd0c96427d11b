// src/download/mod.rs

//! Download tracking.
//!
//! - [`download`] holds the per-URL [`Download`] and its completion blocker.
//! - [`registry`] deduplicates downloads by URL and notifies the host.
//! - [`fetcher`] provides the [`Fetcher`] backend trait and the production
//!   [`CommandFetcher`].

pub mod download;
pub mod fetcher;
pub mod registry;

pub use download::{Download, DownloadStatus};
pub use fetcher::{
    CommandFetcher, FetchHandle, FetchId, FetchOutcome, FetchRequest, Fetcher,
};
pub use registry::{DownloadObserver, DownloadRegistry, LogObserver};
