#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::Write;
use std::rc::Rc;

use tokio::sync::oneshot;

use zlaunch::download::{DownloadObserver, FetchHandle, FetchId, FetchRequest, Fetcher};
use zlaunch::errors::{LaunchError, Result};
use zlaunch::run::{LaunchCommand, ProcessLauncher};

#[derive(Default)]
struct FetchState {
    requests: Vec<FetchRequest>,
    cancels: HashMap<FetchId, oneshot::Receiver<()>>,
    aborted: HashSet<FetchId>,
    refuse: bool,
}

/// Fetch backend that never does IO. It records what it was asked for and
/// leaves completion to the test (via `DownloadRegistry::fetch_finished`).
///
/// Clones share state, so a test can keep one while the registry owns the
/// other.
#[derive(Clone, Default)]
pub struct FakeFetcher {
    state: Rc<RefCell<FetchState>>,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend whose `start` always fails.
    pub fn refusing() -> Self {
        let fetcher = Self::default();
        fetcher.state.borrow_mut().refuse = true;
        fetcher
    }

    pub fn requests(&self) -> Vec<FetchRequest> {
        self.state.borrow().requests.clone()
    }

    /// Number of fetches started so far.
    pub fn started(&self) -> usize {
        self.state.borrow().requests.len()
    }

    /// Most recent request for `url`.
    pub fn request_for(&self, url: &str) -> Option<FetchRequest> {
        self.state
            .borrow()
            .requests
            .iter()
            .rev()
            .find(|r| r.url == url)
            .cloned()
    }

    /// Whether the registry aborted fetch `id`.
    pub fn was_aborted(&self, id: FetchId) -> bool {
        let mut state = self.state.borrow_mut();
        if let Some(mut rx) = state.cancels.remove(&id) {
            match rx.try_recv() {
                Ok(()) => {
                    state.aborted.insert(id);
                }
                Err(_) => {
                    state.cancels.insert(id, rx);
                }
            }
        }
        state.aborted.contains(&id)
    }
}

impl Fetcher for FakeFetcher {
    fn start(&mut self, request: FetchRequest) -> Result<FetchHandle> {
        let mut state = self.state.borrow_mut();
        if state.refuse {
            return Err(LaunchError::Internal(format!(
                "fake fetcher refused {}",
                request.url
            )));
        }
        let (tx, rx) = oneshot::channel();
        state.cancels.insert(request.id, rx);
        state.requests.push(request);
        Ok(FetchHandle::new(tx))
    }
}

/// Observer that keeps every snapshot it was sent.
#[derive(Clone, Default)]
pub struct RecordingObserver {
    snapshots: Rc<RefCell<Vec<Vec<String>>>>,
}

impl RecordingObserver {
    pub fn snapshots(&self) -> Vec<Vec<String>> {
        self.snapshots.borrow().clone()
    }

    pub fn count(&self) -> usize {
        self.snapshots.borrow().len()
    }
}

impl DownloadObserver for RecordingObserver {
    fn downloads_changed(&self, active: &[String]) {
        self.snapshots.borrow_mut().push(active.to_vec());
    }
}

/// Launcher that records commands instead of starting processes.
///
/// `run_captured` writes the configured output into the capture file and
/// returns the configured exit code.
#[derive(Debug, Default)]
pub struct FakeLauncher {
    pub execs: Vec<LaunchCommand>,
    pub captured: Vec<LaunchCommand>,
    output: Vec<u8>,
    exit_code: i32,
}

impl FakeLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_output(mut self, output: &[u8], exit_code: i32) -> Self {
        self.output = output.to_vec();
        self.exit_code = exit_code;
        self
    }
}

impl ProcessLauncher for FakeLauncher {
    fn exec(&mut self, cmd: &LaunchCommand) -> Result<()> {
        self.execs.push(cmd.clone());
        Ok(())
    }

    fn run_captured(&mut self, cmd: &LaunchCommand, mut output: &File) -> Result<i32> {
        self.captured.push(cmd.clone());
        output.write_all(&self.output)?;
        Ok(self.exit_code)
    }
}
