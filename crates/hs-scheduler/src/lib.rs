//! # hs-scheduler
//!
//! Coordination primitives for the hyperparameter search: single-resolution
//! futures, the failure-importance resolver, the scheduler contract with a
//! local bounded thread pool, and the wall-clock / user interrupt watcher.

mod future;
mod importance;
mod interrupt;
mod scheduler;

pub use future::TaskFuture;
pub use importance::reraise_most_important;
pub use interrupt::{InterruptWatcher, INTERRUPT_POLL_INTERVAL};
pub use scheduler::{Scheduler, SplitEvaluator, WorkScheduler};
