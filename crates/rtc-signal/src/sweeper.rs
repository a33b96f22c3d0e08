//! Sweeper - background mailbox expiry
//!
//! Periodically evicts peer mailboxes that have not been written to for
//! longer than the TTL. A failing iteration is logged and the loop keeps
//! running until its handle is shut down or dropped.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::mailbox::Mailbox;

/// One sweep pass over the mailbox, returning how many records it evicted
type SweepFn = Box<dyn Fn(&Mailbox, Duration) -> usize + Send + Sync>;

/// Background sweeper for a [`Mailbox`]
pub struct Sweeper {
    mailbox: Arc<Mailbox>,
    interval: Duration,
    ttl: Duration,
    sweep: SweepFn,
}

impl Sweeper {
    pub fn new(mailbox: Arc<Mailbox>, interval: Duration, ttl: Duration) -> Self {
        Self::with_sweep(mailbox, interval, ttl, Mailbox::sweep)
    }

    /// Create with a custom sweep pass
    pub fn with_sweep<F>(mailbox: Arc<Mailbox>, interval: Duration, ttl: Duration, sweep: F) -> Self
    where
        F: Fn(&Mailbox, Duration) -> usize + Send + Sync + 'static,
    {
        Self {
            mailbox,
            interval,
            ttl,
            sweep: Box::new(sweep),
        }
    }

    /// Start the sweep loop on the current runtime
    pub fn spawn(self) -> SweeperHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(self.run_loop(shutdown_rx));
        SweeperHandle { shutdown_tx, task }
    }

    /// Run one sweep, converting a panic into an error
    pub fn sweep_once(&self) -> Result<usize, String> {
        catch_unwind(AssertUnwindSafe(|| (self.sweep)(&*self.mailbox, self.ttl))).map_err(|panic| {
            panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string())
        })
    }

    async fn run_loop(self, mut shutdown: watch::Receiver<bool>) {
        let mut tick = interval(self.interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            "Sweeper started: interval {:?}, ttl {:?}",
            self.interval, self.ttl
        );

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    match self.sweep_once() {
                        Ok(0) => {}
                        Ok(n) => debug!("Sweep evicted {} peers, {} remaining", n, self.mailbox.len()),
                        Err(e) => error!("Error in cleanup task: {}", e),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Sweeper stopped");
    }
}

/// Handle to a running sweeper
///
/// Dropping the handle also stops the loop.
pub struct SweeperHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Stop the sweep loop and wait for it to exit
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.task.await {
            error!("Sweeper task failed: {}", e);
        }
    }

    /// Check if the loop has exited
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
