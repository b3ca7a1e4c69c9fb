//! Background Flush Scheduler
//!
//! Under [`FlushPolicy::Periodic`](crate::FlushPolicy::Periodic) appends only
//! reach the write buffer. This module forces them out on a fixed interval.
//!
//! ## Design
//!
//! The scheduler owns a dedicated thread driving a single-threaded Tokio
//! runtime, so it works the same whether or not the caller runs inside a
//! runtime of its own. Each iteration:
//! 1. Waits for the next tick or a shutdown signal
//! 2. Upgrades its weak handle to the store (exits if the store is gone)
//! 3. Flushes, logging any failure and carrying on with the next tick
//!
//! ## Shutdown
//!
//! [`FlushScheduler::stop`] signals the loop and joins the thread. Once it
//! returns, no tick is running and none will run again, which is what lets
//! the store perform its final flush and release the file safely.
//! Dropping the scheduler only signals: the last store handle may be
//! released on the scheduler thread itself, where joining would deadlock.

use crate::error::Result;
use std::sync::Weak;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, trace, warn};

/// Something the scheduler can flush on each tick.
pub trait Flushable: Send + Sync + 'static {
    /// Flushes buffered writes, if any. Errors are logged by the scheduler.
    fn scheduled_flush(&self) -> Result<()>;
}

/// A handle to the running flush scheduler.
#[derive(Debug)]
pub struct FlushScheduler {
    /// Sender to signal shutdown
    shutdown_tx: watch::Sender<bool>,
    thread: Option<JoinHandle<()>>,
    interval: Duration,
}

impl FlushScheduler {
    /// Starts flushing `target` every `interval`.
    ///
    /// The scheduler holds only a weak reference, so it never keeps the
    /// target alive.
    pub fn start<T: Flushable>(target: Weak<T>, interval: Duration) -> Result<Self> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()?;

        let thread = std::thread::Builder::new()
            .name("ledgerkv-flush".to_string())
            .spawn(move || runtime.block_on(flush_loop(target, interval, shutdown_rx)))?;

        debug!(interval_ms = interval.as_millis() as u64, "Flush scheduler started");

        Ok(Self {
            shutdown_tx,
            thread: Some(thread),
            interval,
        })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Stops the scheduler and waits for any in-progress tick to finish.
    pub fn stop(&mut self) {
        let _ = self.shutdown_tx.send(true);

        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Flush scheduler thread panicked");
            }
            debug!("Flush scheduler stopped");
        }
    }
}

impl Drop for FlushScheduler {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}

/// The main scheduler loop.
async fn flush_loop<T: Flushable>(
    target: Weak<T>,
    period: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    debug!("Flush scheduler received shutdown signal");
                    return;
                }
            }
            _ = ticker.tick() => {}
        }

        let Some(target) = target.upgrade() else {
            debug!("Store dropped, flush scheduler exiting");
            return;
        };

        trace!("Periodic flush tick");
        if let Err(err) = target.scheduled_flush() {
            warn!(error = %err, "Background flush failed; will retry on next tick");
        }
    }
}
