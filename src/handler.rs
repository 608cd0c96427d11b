// src/handler.rs

//! Facade a host application talks to.
//!
//! [`Handler`] bundles the host's main loop, the download registry and the
//! trust gate behind the few calls the rest of a session needs. Errors are
//! routed through an [`ErrorReporter`], which holds them back while a
//! nested wait is running the main loop and shows them once it returns.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use tracing::{debug, error, warn};

use crate::download::{Download, DownloadRegistry};
use crate::errors::{LaunchError, Result};
use crate::tasks::{nested_wait_active, wait_for, Blocker, MainLoop};
use crate::trust::{Signature, TrustGate};

/// Where the host displays errors.
pub trait ErrorSink {
    fn show(&mut self, err: &LaunchError);
}

/// Sink that logs; used by the command-line front end.
#[derive(Debug, Default)]
pub struct LogSink;

impl ErrorSink for LogSink {
    fn show(&mut self, err: &LaunchError) {
        if err.is_user_facing() {
            warn!(error = %err, "{err}");
        } else {
            error!(error = ?err, "unexpected error");
        }
    }
}

struct ReporterInner {
    sink: Box<dyn ErrorSink>,
    pending: Vec<LaunchError>,
}

/// Shared handle for reporting errors to the host. Cloning gives another
/// handle to the same sink and buffer, so tasks can keep one.
#[derive(Clone)]
pub struct ErrorReporter {
    inner: Rc<RefCell<ReporterInner>>,
}

impl ErrorReporter {
    pub fn new(sink: Box<dyn ErrorSink>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(ReporterInner {
                sink,
                pending: Vec::new(),
            })),
        }
    }

    /// Show `err` now, or after the active nested wait has finished.
    pub fn report(&self, err: &LaunchError) {
        if nested_wait_active() {
            debug!(error = %err, "nested wait active; deferring error");
            self.inner.borrow_mut().pending.push(err.clone());
            return;
        }
        self.flush();
        self.inner.borrow_mut().sink.show(err);
    }

    /// Show everything deferred so far. Does nothing while a nested wait is
    /// still active.
    pub fn flush(&self) {
        if nested_wait_active() {
            return;
        }
        let mut inner = self.inner.borrow_mut();
        let pending = std::mem::take(&mut inner.pending);
        for err in &pending {
            inner.sink.show(err);
        }
    }

    /// Number of errors waiting to be shown.
    pub fn pending(&self) -> usize {
        self.inner.borrow().pending.len()
    }
}

impl fmt::Debug for ErrorReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorReporter")
            .field("pending", &self.pending())
            .finish_non_exhaustive()
    }
}

pub struct Handler {
    main_loop: Box<dyn MainLoop>,
    registry: Rc<DownloadRegistry>,
    trust: TrustGate,
    errors: ErrorReporter,
}

impl Handler {
    pub fn new(
        main_loop: Box<dyn MainLoop>,
        registry: Rc<DownloadRegistry>,
        trust: TrustGate,
        sink: Box<dyn ErrorSink>,
    ) -> Self {
        Self {
            main_loop,
            registry,
            trust,
            errors: ErrorReporter::new(sink),
        }
    }

    /// Run the main loop until `blocker` has happened. Errors reported
    /// meanwhile are shown afterwards, before this returns.
    pub fn wait_for_blocker(&mut self, blocker: &Blocker) -> Result<()> {
        let res = wait_for(self.main_loop.as_mut(), blocker);
        self.errors.flush();
        res
    }

    /// See [`DownloadRegistry::acquire`].
    pub fn get_download(&self, url: &str, force: bool) -> Rc<Download> {
        self.registry.acquire(url, force)
    }

    /// See [`TrustGate::confirm_trust`].
    pub fn confirm_trust_keys(
        &mut self,
        interface: &str,
        signatures: &[Signature],
        fetched: &[u8],
    ) -> Result<()> {
        self.trust.confirm_trust(interface, signatures, fetched)
    }

    pub fn report_error(&self, err: &LaunchError) {
        self.errors.report(err);
    }

    pub fn errors(&self) -> &ErrorReporter {
        &self.errors
    }

    pub fn registry(&self) -> &Rc<DownloadRegistry> {
        &self.registry
    }

    pub fn trust(&self) -> &TrustGate {
        &self.trust
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("registry", &self.registry)
            .field("errors", &self.errors)
            .finish_non_exhaustive()
    }
}
