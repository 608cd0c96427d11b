// src/download/fetcher.rs

//! Pluggable fetch backend.
//!
//! The registry talks to a [`Fetcher`] instead of doing network IO itself.
//! Completion is reported asynchronously as a [`LoopEvent::FetchFinished`]
//! on the event loop's channel, so the registry and the blockers it owns are
//! only ever touched on the loop thread.
//!
//! - [`CommandFetcher`] is the production backend: it runs a configurable
//!   shell command per fetch on a tokio runtime and kills it on abort.
//! - Tests provide their own `Fetcher` that completes fetches on demand.

use std::path::PathBuf;
use std::process::Stdio;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::engine::LoopEvent;

/// Identifier of a single fetch attempt.
pub type FetchId = u64;

/// `Ok(())` once the destination is populated, otherwise a reason.
pub type FetchOutcome = std::result::Result<(), String>;

/// Environment variable holding the URL for the fetch command.
pub const URL_VAR: &str = "ZLAUNCH_URL";
/// Environment variable holding the destination path for the fetch command.
pub const DEST_VAR: &str = "ZLAUNCH_DEST";

/// How many trailing stderr lines of a failed fetch command are kept for
/// the error message.
const STDERR_TAIL: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub id: FetchId,
    pub url: String,
    pub dest: PathBuf,
}

/// Handle used to abort a fetch that is still running.
#[derive(Debug, Default)]
pub struct FetchHandle {
    cancel: Option<oneshot::Sender<()>>,
}

impl FetchHandle {
    pub fn new(cancel: oneshot::Sender<()>) -> Self {
        Self {
            cancel: Some(cancel),
        }
    }

    /// A handle for a fetch that cannot be cancelled.
    pub fn detached() -> Self {
        Self { cancel: None }
    }

    /// Ask the backend to stop the fetch. Harmless if it already finished.
    pub fn abort(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            if cancel.send(()).is_err() {
                debug!("fetch already finished while aborting");
            }
        }
    }
}

/// Trait abstracting how resources are fetched.
pub trait Fetcher {
    /// Begin fetching `request.url` into `request.dest`.
    ///
    /// Must not block. Completion is reported later through the event loop.
    fn start(&mut self, request: FetchRequest) -> crate::errors::Result<FetchHandle>;
}

/// Production fetch backend: runs `sh -c <command>` with the URL and the
/// destination in [`URL_VAR`] / [`DEST_VAR`].
pub struct CommandFetcher {
    runtime: Handle,
    command: String,
    events: mpsc::UnboundedSender<LoopEvent>,
}

impl CommandFetcher {
    pub fn new(
        runtime: Handle,
        command: impl Into<String>,
        events: mpsc::UnboundedSender<LoopEvent>,
    ) -> Self {
        Self {
            runtime,
            command: command.into(),
            events,
        }
    }
}

impl Fetcher for CommandFetcher {
    fn start(&mut self, request: FetchRequest) -> crate::errors::Result<FetchHandle> {
        let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
        let command = self.command.clone();
        let events = self.events.clone();

        self.runtime.spawn(async move {
            let id = request.id;
            let url = request.url.clone();

            let outcome = match run_fetch(&request, &command, cancel_rx).await {
                Ok(Some(outcome)) => outcome,
                // Aborted: the download already reported itself as aborted.
                Ok(None) => return,
                Err(err) => {
                    error!(url = %url, error = %err, "fetch execution error");
                    Err(format!("{err:#}"))
                }
            };

            if events
                .send(LoopEvent::FetchFinished { id, outcome })
                .is_err()
            {
                debug!(url = %url, "event loop gone; dropping fetch result");
            }
        });

        Ok(FetchHandle::new(cancel_tx))
    }
}

/// Run the fetch command for one request.
///
/// Returns `Ok(None)` if the fetch was cancelled; the child is killed and
/// no completion is reported for it.
async fn run_fetch(
    request: &FetchRequest,
    command: &str,
    mut cancel_rx: oneshot::Receiver<()>,
) -> Result<Option<FetchOutcome>> {
    info!(
        url = %request.url,
        dest = %request.dest.display(),
        "starting fetch"
    );

    if let Some(parent) = request.dest.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("creating staging directory {}", parent.display()))?;
    }

    let mut cmd = Command::new("sh");
    cmd.arg("-c")
        .arg(command)
        .env(URL_VAR, &request.url)
        .env(DEST_VAR, &request.dest)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .with_context(|| format!("spawning fetch command for '{}'", request.url))?;

    // Always consume stderr so the pipe doesn't fill; keep the tail for the
    // error message.
    let stderr_tail = child.stderr.take().map(|stderr| {
        let url = request.url.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            let mut tail: Vec<String> = Vec::new();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(url = %url, "fetch stderr: {}", line);
                if tail.len() == STDERR_TAIL {
                    tail.remove(0);
                }
                tail.push(line);
            }
            tail.join("\n")
        })
    });

    tokio::select! {
        status_res = child.wait() => {
            let status = status_res
                .with_context(|| format!("waiting for fetch of '{}'", request.url))?;

            info!(
                url = %request.url,
                exit_code = status.code().unwrap_or(-1),
                success = status.success(),
                "fetch command exited"
            );

            if status.success() {
                return Ok(Some(Ok(())));
            }

            let detail = match stderr_tail {
                Some(handle) => handle.await.unwrap_or_default(),
                None => String::new(),
            };
            let code = status.code().unwrap_or(-1);
            let reason = if detail.is_empty() {
                format!("fetch command exited with code {code}")
            } else {
                format!("fetch command exited with code {code}: {detail}")
            };
            Ok(Some(Err(reason)))
        }

        cancel = &mut cancel_rx => {
            match cancel {
                Ok(()) => {
                    info!(url = %request.url, "fetch aborted; killing fetch command");
                    if let Err(e) = child.kill().await {
                        warn!(
                            url = %request.url,
                            error = %e,
                            "failed to kill fetch command on abort"
                        );
                    }
                }
                Err(e) => {
                    debug!(
                        url = %request.url,
                        error = %e,
                        "fetch handle dropped without explicit abort"
                    );
                    // Child is killed on drop due to kill_on_drop(true).
                }
            }
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(dest: PathBuf) -> FetchRequest {
        FetchRequest {
            id: 7,
            url: "file:///nowhere".to_string(),
            dest,
        }
    }

    #[tokio::test]
    async fn successful_command_reports_ok() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out");
        let (_tx, rx) = oneshot::channel();

        let outcome = run_fetch(&request(dest.clone()), "mkdir -p \"$ZLAUNCH_DEST\"", rx)
            .await
            .unwrap();

        assert_eq!(outcome, Some(Ok(())));
        assert!(dest.is_dir());
    }

    #[tokio::test]
    async fn failing_command_reports_stderr_tail() {
        let dir = tempfile::tempdir().unwrap();
        let (_tx, rx) = oneshot::channel();

        let outcome = run_fetch(
            &request(dir.path().join("out")),
            "echo \"cannot reach $ZLAUNCH_URL\" >&2; exit 3",
            rx,
        )
        .await
        .unwrap();

        let reason = outcome.unwrap().unwrap_err();
        assert!(reason.contains("code 3"), "{reason}");
        assert!(reason.contains("cannot reach file:///nowhere"), "{reason}");
    }

    #[tokio::test]
    async fn abort_kills_the_command_without_reporting() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, rx) = oneshot::channel();
        tx.send(()).unwrap();

        let outcome = run_fetch(&request(dir.path().join("out")), "sleep 30", rx)
            .await
            .unwrap();
        assert_eq!(outcome, None);
    }
}
