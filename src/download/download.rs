// src/download/download.rs

use std::cell::{Cell, RefCell};
use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::download::fetcher::{FetchHandle, FetchId, FetchOutcome};
use crate::errors::LaunchError;
use crate::tasks::Blocker;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadStatus {
    Fetching,
    Complete,
    Failed,
    Aborted,
}

/// A single fetch of one resource URL.
///
/// `downloaded` fires exactly once: triggered when the fetch completes,
/// failed when it fails or is aborted.
pub struct Download {
    url: String,
    dest: PathBuf,
    fetch_id: FetchId,
    downloaded: Blocker,
    status: Cell<DownloadStatus>,
    handle: RefCell<FetchHandle>,
}

impl Download {
    pub(crate) fn new(url: &str, dest: PathBuf, fetch_id: FetchId) -> Self {
        Self {
            url: url.to_string(),
            dest,
            fetch_id,
            downloaded: Blocker::new(format!("download {url}")),
            status: Cell::new(DownloadStatus::Fetching),
            handle: RefCell::new(FetchHandle::detached()),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Where the fetched resource is (or will be) staged.
    pub fn dest(&self) -> &Path {
        &self.dest
    }

    pub fn fetch_id(&self) -> FetchId {
        self.fetch_id
    }

    pub fn downloaded(&self) -> &Blocker {
        &self.downloaded
    }

    pub fn status(&self) -> DownloadStatus {
        self.status.get()
    }

    pub(crate) fn attach(&self, handle: FetchHandle) {
        *self.handle.borrow_mut() = handle;
    }

    /// Record the backend's verdict. Ignored once the download has left the
    /// `Fetching` state (e.g. a late report for an aborted fetch).
    pub(crate) fn finish(&self, outcome: FetchOutcome) {
        if self.status.get() != DownloadStatus::Fetching {
            debug!(url = %self.url, status = ?self.status.get(), "ignoring late fetch result");
            return;
        }

        match outcome {
            Ok(()) => {
                info!(url = %self.url, "download complete");
                self.status.set(DownloadStatus::Complete);
                self.downloaded.trigger();
            }
            Err(reason) => {
                warn!(url = %self.url, reason = %reason, "download failed");
                self.status.set(DownloadStatus::Failed);
                self.downloaded.fail(LaunchError::DownloadFailed {
                    url: self.url.clone(),
                    reason,
                });
            }
        }
    }

    /// Stop the fetch if it is still running and release everyone waiting.
    pub fn abort(&self) {
        if self.status.get() != DownloadStatus::Fetching {
            return;
        }
        info!(url = %self.url, "aborting download");
        self.handle.borrow_mut().abort();
        self.status.set(DownloadStatus::Aborted);
        self.downloaded
            .fail(LaunchError::DownloadAborted(self.url.clone()));
    }
}

impl fmt::Debug for Download {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Download")
            .field("url", &self.url)
            .field("fetch_id", &self.fetch_id)
            .field("status", &self.status.get())
            .finish_non_exhaustive()
    }
}
