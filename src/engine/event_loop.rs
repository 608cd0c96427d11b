// src/engine/event_loop.rs

use std::fmt;
use std::rc::Rc;

use tokio::sync::mpsc::{self, error::TryRecvError};
use tracing::{debug, info, trace};

use crate::download::DownloadRegistry;
use crate::errors::{LaunchError, Result};
use crate::engine::LoopEvent;
use crate::tasks::{Blocker, MainLoop, Scheduler};

/// Main loop used by the command-line front end.
///
/// Each iteration first delivers every event that has already arrived,
/// then runs one scheduler pass if any task is ready. Only when there is
/// nothing to do does it block on the channel.
///
/// Must not be driven from inside a tokio runtime: waiting uses
/// `blocking_recv`.
pub struct EventLoop {
    scheduler: Scheduler,
    registry: Rc<DownloadRegistry>,
    events: mpsc::UnboundedReceiver<LoopEvent>,
    cancelled: Blocker,
}

impl EventLoop {
    pub fn new(
        scheduler: Scheduler,
        registry: Rc<DownloadRegistry>,
        events: mpsc::UnboundedReceiver<LoopEvent>,
    ) -> Self {
        Self {
            scheduler,
            registry,
            events,
            cancelled: Blocker::new("cancelled by user"),
        }
    }

    /// Fires when an [`LoopEvent::Interrupted`] is delivered.
    pub fn cancelled(&self) -> &Blocker {
        &self.cancelled
    }

    fn dispatch(&mut self, event: LoopEvent) {
        trace!(?event, "loop event");
        match event {
            LoopEvent::FetchFinished { id, outcome } => {
                self.registry.fetch_finished(id, outcome);
            }
            LoopEvent::Interrupted => {
                info!("interrupted; cancelling");
                self.cancelled.trigger();
            }
        }
    }

    /// Deliver everything already queued. Returns how many events there were.
    fn drain(&mut self) -> usize {
        let mut delivered = 0;
        loop {
            match self.events.try_recv() {
                Ok(event) => {
                    self.dispatch(event);
                    delivered += 1;
                }
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => return delivered,
            }
        }
    }
}

impl MainLoop for EventLoop {
    fn iterate(&mut self) -> Result<()> {
        let delivered = self.drain();

        if self.scheduler.has_ready() {
            self.scheduler.run_pending();
            return Ok(());
        }
        if delivered > 0 {
            return Ok(());
        }

        // Nothing is runnable. Without a fetch in flight only an interrupt
        // could still arrive, and nothing would be waiting for it.
        if self.registry.fetches_in_flight() == 0 && !self.cancelled.happened() {
            debug!(live_tasks = self.scheduler.live_tasks(), "loop has stalled");
            return Err(LaunchError::LoopStopped("nothing left to wait for".into()));
        }

        match self.events.blocking_recv() {
            Some(event) => {
                self.dispatch(event);
                Ok(())
            }
            None => Err(LaunchError::LoopStopped("event channel closed".into())),
        }
    }
}

impl fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLoop")
            .field("scheduler", &self.scheduler)
            .field("registry", &self.registry)
            .field("cancelled", &self.cancelled.happened())
            .finish()
    }
}
