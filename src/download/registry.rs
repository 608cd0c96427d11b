// src/download/registry.rs

//! Registry of in-flight downloads, keyed by URL.
//!
//! There is never more than one registered [`Download`] per URL. Every
//! registration and every removal is followed, within the same call, by
//! exactly one notification to the [`DownloadObserver`]; nothing else can
//! run in between because the registry lives on the single loop thread.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::{Rc, Weak};

use tracing::{debug, info, warn};

use crate::download::download::Download;
use crate::download::fetcher::{FetchId, FetchOutcome, FetchRequest, Fetcher};
use crate::tasks::Scheduler;

/// Host callback invoked whenever the set of registered downloads changes.
pub trait DownloadObserver {
    /// `active` is a sorted snapshot of the registered URLs.
    fn downloads_changed(&self, active: &[String]);
}

/// Observer that only logs; used by the command-line front end.
#[derive(Debug, Default)]
pub struct LogObserver;

impl DownloadObserver for LogObserver {
    fn downloads_changed(&self, active: &[String]) {
        info!(in_progress = active.len(), downloads = ?active, "downloads changed");
    }
}

pub struct DownloadRegistry {
    scheduler: Scheduler,
    fetcher: RefCell<Box<dyn Fetcher>>,
    observer: Rc<dyn DownloadObserver>,
    staging_dir: PathBuf,
    downloads: RefCell<HashMap<String, Rc<Download>>>,
    in_flight: RefCell<HashMap<FetchId, Rc<Download>>>,
    next_fetch: Cell<FetchId>,
    me: Weak<DownloadRegistry>,
}

impl DownloadRegistry {
    pub fn new(
        scheduler: Scheduler,
        fetcher: Box<dyn Fetcher>,
        observer: Rc<dyn DownloadObserver>,
        staging_dir: impl Into<PathBuf>,
    ) -> Rc<Self> {
        let staging_dir = staging_dir.into();
        Rc::new_cyclic(|me| Self {
            scheduler,
            fetcher: RefCell::new(fetcher),
            observer,
            staging_dir,
            downloads: RefCell::new(HashMap::new()),
            in_flight: RefCell::new(HashMap::new()),
            next_fetch: Cell::new(0),
            me: me.clone(),
        })
    }

    /// Return the download for `url`, starting one if necessary.
    ///
    /// Without `force`, an existing registration is returned as-is, even if
    /// that download failed: callers wanting a retry have to ask for it.
    /// With `force`, any existing download is aborted and replaced.
    pub fn acquire(&self, url: &str, force: bool) -> Rc<Download> {
        let existing = self.downloads.borrow().get(url).cloned();

        if let Some(dl) = existing {
            if !force {
                debug!(url, status = ?dl.status(), "reusing registered download");
                return dl;
            }
            info!(url, "forced re-download; discarding previous attempt");
            dl.abort();
            self.in_flight.borrow_mut().remove(&dl.fetch_id());
            self.unregister(&dl);
        }

        let dl = self.start(url);
        self.register(Rc::clone(&dl));
        self.monitor(Rc::clone(&dl));
        dl
    }

    pub fn get(&self, url: &str) -> Option<Rc<Download>> {
        self.downloads.borrow().get(url).cloned()
    }

    /// Sorted URLs of all registered downloads.
    pub fn urls(&self) -> Vec<String> {
        let mut urls: Vec<String> = self.downloads.borrow().keys().cloned().collect();
        urls.sort();
        urls
    }

    pub fn len(&self) -> usize {
        self.downloads.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fetches started and not yet reported back by the backend.
    pub fn fetches_in_flight(&self) -> usize {
        self.in_flight.borrow().len()
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    /// Abort every registered download. Their registrations disappear once
    /// their monitors see the `downloaded` blockers fire.
    pub fn abort_all(&self) {
        let all: Vec<Rc<Download>> = self.downloads.borrow().values().cloned().collect();
        info!(count = all.len(), "aborting all downloads");
        for dl in all {
            dl.abort();
            self.in_flight.borrow_mut().remove(&dl.fetch_id());
        }
    }

    /// Deliver the backend's result for fetch `id`.
    pub fn fetch_finished(&self, id: FetchId, outcome: FetchOutcome) {
        let dl = self.in_flight.borrow_mut().remove(&id);
        match dl {
            Some(dl) => dl.finish(outcome),
            None => debug!(fetch_id = id, "result for unknown or aborted fetch; ignoring"),
        }
    }

    fn start(&self, url: &str) -> Rc<Download> {
        let id = self.next_fetch.get();
        self.next_fetch.set(id + 1);

        let dest = self.staging_dir.join(staging_name(url));
        let dl = Rc::new(Download::new(url, dest.clone(), id));

        let request = FetchRequest {
            id,
            url: url.to_string(),
            dest,
        };
        let started = self.fetcher.borrow_mut().start(request);
        match started {
            Ok(handle) => {
                dl.attach(handle);
                self.in_flight.borrow_mut().insert(id, Rc::clone(&dl));
            }
            Err(err) => {
                warn!(url, error = %err, "could not start fetch");
                dl.finish(Err(err.to_string()));
            }
        }
        dl
    }

    fn register(&self, dl: Rc<Download>) {
        debug!(url = dl.url(), "registering download");
        self.downloads
            .borrow_mut()
            .insert(dl.url().to_string(), dl);
        self.notify();
    }

    /// Remove `dl` if it is still the registered download for its URL.
    fn unregister(&self, dl: &Rc<Download>) -> bool {
        let removed = {
            let mut downloads = self.downloads.borrow_mut();
            match downloads.get(dl.url()) {
                Some(current) if Rc::ptr_eq(current, dl) => {
                    downloads.remove(dl.url());
                    true
                }
                _ => false,
            }
        };

        if removed {
            debug!(url = dl.url(), "download unregistered");
            self.notify();
        }
        removed
    }

    fn monitor(&self, dl: Rc<Download>) {
        let registry = self.me.clone();
        self.scheduler
            .spawn(format!("download monitor {}", dl.url()), async move {
                dl.downloaded().wait().await;
                if let Some(registry) = registry.upgrade() {
                    // Aborted fetches are never reported back by the backend.
                    registry.in_flight.borrow_mut().remove(&dl.fetch_id());
                    registry.unregister(&dl);
                }
                Ok(())
            });
    }

    fn notify(&self) {
        let urls = self.urls();
        self.observer.downloads_changed(&urls);
    }
}

impl std::fmt::Debug for DownloadRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadRegistry")
            .field("downloads", &self.urls())
            .field("staging_dir", &self.staging_dir)
            .finish_non_exhaustive()
    }
}

/// Staging directory name for a URL.
pub fn staging_name(url: &str) -> String {
    blake3::hash(url.as_bytes()).to_hex().to_string()
}
