//! Tracks completed split evaluations to suggest distributed execution on
//! long local searches.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use crate::diagnostics::{Advisory, AdvisoryKind, Diagnostics};

pub const DEFAULT_MIN_COMPLETED_TASKS: usize = 10;
pub const DEFAULT_MIN_ELAPSED: Duration = Duration::from_secs(10 * 60);

#[derive(Debug)]
pub struct CompletionMonitor {
    distributed_available: bool,
    distributed_in_use: bool,
    min_completed_tasks: usize,
    min_elapsed: Duration,
    started: Instant,
    completed: AtomicUsize,
    advised: AtomicBool,
    diagnostics: Diagnostics,
}

impl CompletionMonitor {
    pub fn new(distributed_available: bool, distributed_in_use: bool, diagnostics: Diagnostics) -> Self {
        Self {
            distributed_available,
            distributed_in_use,
            min_completed_tasks: DEFAULT_MIN_COMPLETED_TASKS,
            min_elapsed: DEFAULT_MIN_ELAPSED,
            started: Instant::now(),
            completed: AtomicUsize::new(0),
            advised: AtomicBool::new(false),
            diagnostics,
        }
    }

    /// A monitor that never advises.
    pub fn disabled() -> Self {
        Self::new(false, false, Diagnostics::new())
    }

    pub fn with_thresholds(mut self, min_completed_tasks: usize, min_elapsed: Duration) -> Self {
        self.min_completed_tasks = min_completed_tasks;
        self.min_elapsed = min_elapsed;
        self
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn record_completion(&self) {
        let completed = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.distributed_available || self.distributed_in_use {
            return;
        }
        if completed <= self.min_completed_tasks || self.started.elapsed() <= self.min_elapsed {
            return;
        }
        if self.advised.swap(true, Ordering::SeqCst) {
            return;
        }

        self.diagnostics.emit(Advisory::new(
            AdvisoryKind::DistributedExecution,
            format!(
                "Hyperparameter search has run {} evaluations in {:.0}s locally; \
                 consider distributed execution to speed it up",
                completed,
                self.started.elapsed().as_secs_f64()
            ),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;

    #[test]
    fn advises_once_past_both_thresholds() {
        let (tx, rx) = unbounded();
        let monitor = CompletionMonitor::new(true, false, Diagnostics::with_sender(tx))
            .with_thresholds(2, Duration::ZERO);

        monitor.record_completion();
        monitor.record_completion();
        assert!(rx.try_recv().is_err());

        monitor.record_completion();
        monitor.record_completion();
        let advisory = rx.try_recv().unwrap();
        assert_eq!(advisory.kind, AdvisoryKind::DistributedExecution);
        assert!(rx.try_recv().is_err());
        assert_eq!(monitor.completed(), 4);
    }

    #[test]
    fn silent_when_distributed_unavailable_or_in_use() {
        for (available, in_use) in [(false, false), (true, true)] {
            let (tx, rx) = unbounded();
            let monitor = CompletionMonitor::new(available, in_use, Diagnostics::with_sender(tx))
                .with_thresholds(0, Duration::ZERO);
            monitor.record_completion();
            assert!(rx.try_recv().is_err());
        }
    }

    #[test]
    fn default_thresholds_need_ten_minutes() {
        let (tx, rx) = unbounded();
        let monitor = CompletionMonitor::new(true, false, Diagnostics::with_sender(tx));
        for _ in 0..50 {
            monitor.record_completion();
        }
        assert!(rx.try_recv().is_err());
    }
}
