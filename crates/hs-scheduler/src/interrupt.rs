//! Background watcher turning wall-clock budgets and user requests into soft
//! interruptions.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use hs_types::{SearchError, SearchResult};
use tracing::{error, info};

use crate::scheduler::Scheduler;

/// How often the watcher checks the deadline and the interrupt file.
pub const INTERRUPT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Soft-interrupts a scheduler when the search times out or when an
/// interrupt file appears.
///
/// Stopping the watcher (explicitly or on drop) also soft-interrupts the
/// scheduler, so queued interruptible work is skipped once the search is over.
pub struct InterruptWatcher {
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl InterruptWatcher {
    pub fn start(
        scheduler: Arc<dyn Scheduler>,
        timeout: Option<Duration>,
        interrupt_file: Option<PathBuf>,
    ) -> SearchResult<Self> {
        Self::start_with_interval(scheduler, timeout, interrupt_file, INTERRUPT_POLL_INTERVAL)
    }

    pub fn start_with_interval(
        scheduler: Arc<dyn Scheduler>,
        timeout: Option<Duration>,
        interrupt_file: Option<PathBuf>,
        poll_interval: Duration,
    ) -> SearchResult<Self> {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        // A deadline past what `Instant` can represent never fires.
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));

        let handle = thread::Builder::new()
            .name("search-interrupt-watcher".to_string())
            .spawn(move || {
                loop {
                    if deadline.is_some_and(|d| Instant::now() >= d) {
                        info!("Aborting search for hyperparameters (timeout)");
                        break;
                    }
                    if interrupt_file.as_ref().is_some_and(|p| p.exists()) {
                        info!("Aborting search for hyperparameters (user)");
                        break;
                    }

                    let wait = deadline
                        .map(|d| d.saturating_duration_since(Instant::now()).min(poll_interval))
                        .unwrap_or(poll_interval);
                    match stop_rx.recv_timeout(wait) {
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                            info!("Completed search for hyperparameters");
                            break;
                        }
                        Err(RecvTimeoutError::Timeout) => {}
                    }
                }
                scheduler.interrupt_soft();
            })
            .map_err(|e| SearchError::Internal(format!("failed to start interrupt watcher: {e}")))?;

        Ok(Self {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }

    /// Stop watching and wait for the watcher thread to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Interrupt watcher thread panicked");
            }
        }
    }
}

impl Drop for InterruptWatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}
