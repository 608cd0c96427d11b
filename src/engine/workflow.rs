// src/engine/workflow.rs

//! Fetch what the selections are missing, then decide whether to run.

use std::rc::Rc;

use tracing::{debug, info};

use crate::download::DownloadRegistry;
use crate::errors::{LaunchError, Result};
use crate::handler::{ErrorReporter, Handler};
use crate::run::ImplementationStore;
use crate::selections::{Selection, Selections};
use crate::tasks::{wait_any, Blocker, Scheduler};

/// Whether the program can be started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    Cancelled,
}

/// Selections whose implementation has to be fetched first: not a host
/// package, not at a fixed local path, and not in the store.
pub fn missing_implementations<'a>(
    sels: &'a Selections,
    store: &dyn ImplementationStore,
) -> Vec<&'a Selection> {
    sels.iter()
        .filter(|sel| !sel.is_package() && sel.local_path().is_none() && !store.is_cached(&sel.id))
        .collect()
}

/// Task body: fetch every missing implementation concurrently and commit
/// each one to the store as it arrives.
///
/// Individual failures are reported and do not stop the other downloads.
/// A missing implementation without a source fails the whole task before
/// anything is fetched.
pub async fn download_impls(
    registry: Rc<DownloadRegistry>,
    store: Rc<dyn ImplementationStore>,
    errors: ErrorReporter,
    sels: Rc<Selections>,
) -> Result<()> {
    let mut wanted = Vec::new();
    for sel in missing_implementations(&sels, store.as_ref()) {
        let Some(url) = sel.source.clone() else {
            return Err(LaunchError::NotStored(sel.id.clone()));
        };
        wanted.push((sel.id.clone(), url));
    }

    let downloads: Vec<_> = wanted
        .into_iter()
        .map(|(id, url)| {
            info!(id = %id, url = %url, "fetching implementation");
            (id, registry.acquire(&url, false))
        })
        .collect();

    for (id, dl) in downloads {
        dl.downloaded().wait().await;

        let committed = dl
            .downloaded()
            .check()
            .and_then(|()| store.commit(&id, dl.dest()));
        match committed {
            Ok(path) => debug!(id = %id, path = %path.display(), "implementation ready"),
            Err(LaunchError::DownloadAborted(url)) => {
                debug!(id = %id, url = %url, "download aborted");
            }
            Err(err) => errors.report(&err),
        }
    }
    Ok(())
}

/// Make sure every implementation in `sels` is available.
///
/// Runs the host's main loop until the downloads have finished or
/// `cancelled` fires. If both have happened by then, cancellation wins:
/// outstanding downloads are aborted and [`Readiness::Cancelled`] is
/// returned.
pub fn download_and_run(
    handler: &mut Handler,
    scheduler: &Scheduler,
    store: &Rc<dyn ImplementationStore>,
    sels: &Rc<Selections>,
    cancelled: &Blocker,
) -> Result<Readiness> {
    let missing = missing_implementations(sels, store.as_ref()).len();
    if missing == 0 {
        debug!("all implementations available");
        return Ok(Readiness::Ready);
    }
    info!(missing, "downloading implementations");

    let task = scheduler.spawn(
        "download implementations",
        download_impls(
            Rc::clone(handler.registry()),
            Rc::clone(store),
            handler.errors().clone(),
            Rc::clone(sels),
        ),
    );

    let finished = task.finished().clone();
    let either = [finished.clone(), cancelled.clone()];
    let waiter = scheduler.spawn("wait for downloads or cancellation", async move {
        wait_any(either).await;
        Ok(())
    });
    handler.wait_for_blocker(waiter.finished())?;

    if cancelled.happened() {
        info!("cancelled; aborting downloads");
        handler.registry().abort_all();
        scheduler.run_until_stalled();
        handler.errors().flush();
        return Ok(Readiness::Cancelled);
    }

    finished.check()?;
    if !missing_implementations(sels, store.as_ref()).is_empty() {
        return Err(LaunchError::PartialDownload);
    }
    Ok(Readiness::Ready)
}
