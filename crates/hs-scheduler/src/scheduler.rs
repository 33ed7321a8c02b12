//! Scheduler contract and the local bounded worker pool.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use hs_types::{HyperparameterPoint, SearchError, SearchResult, SplitResult};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, info};

use crate::future::{panic_message, TaskFuture};

/// Fits and scores one point on one split.
///
/// Implementations must be deterministic for a given `(point, split_id)`,
/// otherwise reusing persisted results on resume is unsound. Returning
/// [`SearchError::WorkerFailure`] signals an infrastructure problem and shuts
/// the whole pool down; any other error only fails that evaluation.
pub trait SplitEvaluator: Send + Sync + 'static {
    fn n_splits(&self) -> usize;

    fn evaluate_split(
        &self,
        point: &HyperparameterPoint,
        split_id: usize,
    ) -> SearchResult<SplitResult>;
}

/// Submits (point, split) evaluations to a bounded pool of workers.
pub trait Scheduler: Send + Sync {
    /// Submit one evaluation. Blocks while every worker is busy.
    ///
    /// Interruptible work that has not started when a soft interruption is
    /// requested fails with [`SearchError::SoftInterrupted`]; infrastructure
    /// failures surface as [`SearchError::HardInterrupted`].
    fn schedule_work(
        &self,
        is_soft_interruptible: bool,
        split_id: usize,
        point: &HyperparameterPoint,
    ) -> TaskFuture<SplitResult>;

    fn soft_interrupted(&self) -> bool;

    /// Request a graceful stop: queued interruptible work is dropped, running
    /// work completes.
    fn interrupt_soft(&self);

    fn workers_count(&self) -> usize;
}

struct Task {
    future: TaskFuture<SplitResult>,
    is_soft_interruptible: bool,
    split_id: usize,
    point: HyperparameterPoint,
}

struct PoolState {
    queue: VecDeque<Task>,
    idle_workers: usize,
    /// Always true when `hard_interrupted` is.
    soft_interrupted: bool,
    hard_interrupted: bool,
}

struct Pool<E> {
    evaluator: Arc<E>,
    state: Mutex<PoolState>,
    task_available: Condvar,
    worker_available: Condvar,
}

impl<E> Pool<E> {
    fn interrupt_soft(&self) {
        let mut state = self.state.lock();
        if state.soft_interrupted || state.hard_interrupted {
            return;
        }
        info!("Scheduler has been soft interrupted");
        state.soft_interrupted = true;
        self.worker_available.notify_all();

        let queued = std::mem::take(&mut state.queue);
        for task in queued {
            if task.is_soft_interruptible {
                let _ = task
                    .future
                    .set_error(SearchError::soft("scheduler soft interrupted"));
            } else {
                state.queue.push_back(task);
            }
        }
    }

    fn interrupt_hard(&self, reason: &str) {
        let mut state = self.state.lock();
        if state.hard_interrupted {
            return;
        }
        info!("Scheduler has been hard interrupted: {}", reason);
        state.hard_interrupted = true;
        state.soft_interrupted = true;
        self.worker_available.notify_all();
        self.task_available.notify_all();

        for task in state.queue.drain(..) {
            let _ = task.future.set_error(SearchError::hard(reason));
        }
    }
}

impl<E: SplitEvaluator> Pool<E> {
    /// Wait for the next task; `None` once the pool is shut down.
    fn take_next_task(&self) -> Option<Task> {
        let mut state = self.state.lock();
        loop {
            if state.hard_interrupted {
                return None;
            }
            if let Some(task) = state.queue.pop_front() {
                state.idle_workers -= 1;
                self.worker_available.notify_all();
                return Some(task);
            }
            self.task_available.wait(&mut state);
        }
    }

    fn notify_task_done(&self) {
        let mut state = self.state.lock();
        state.idle_workers += 1;
        self.worker_available.notify_all();
    }

    fn run_worker(&self, worker_id: usize) {
        debug!("Worker {} started", worker_id);
        while let Some(task) = self.take_next_task() {
            debug!("Worker {} evaluating split {}: {}", worker_id, task.split_id, task.point);
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                self.evaluator.evaluate_split(&task.point, task.split_id)
            }))
            .unwrap_or_else(|payload| {
                Err(SearchError::WorkerFailure {
                    message: format!("worker {worker_id} panicked: {}", panic_message(&*payload)),
                })
            });

            if let Err(SearchError::WorkerFailure { message }) = &outcome {
                error!("Unexpected worker-level failure, shutting down the scheduler: {}", message);
                self.interrupt_hard(message);
            }

            // Become available again before resolving, so work submitted right
            // after this result is observed does not wait on this worker.
            self.notify_task_done();
            if task.future.settle(outcome).is_err() {
                debug!("Worker {} result discarded: future already resolved", worker_id);
            }
        }
        debug!("Worker {} stopped", worker_id);
    }
}

/// Fixed-size pool of local worker threads.
///
/// At most `n_workers` evaluations are queued or running at any time;
/// [`Scheduler::schedule_work`] blocks beyond that. Dropping the scheduler
/// hard-interrupts it and joins every worker thread.
pub struct WorkScheduler<E: SplitEvaluator> {
    pool: Arc<Pool<E>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    n_workers: usize,
}

impl<E: SplitEvaluator> WorkScheduler<E> {
    pub fn new(evaluator: Arc<E>, n_workers: usize) -> SearchResult<Self> {
        let n_workers = n_workers.max(1);
        let pool = Arc::new(Pool {
            evaluator,
            state: Mutex::new(PoolState {
                queue: VecDeque::new(),
                idle_workers: n_workers,
                soft_interrupted: false,
                hard_interrupted: false,
            }),
            task_available: Condvar::new(),
            worker_available: Condvar::new(),
        });

        let mut handles = Vec::with_capacity(n_workers);
        for worker_id in 0..n_workers {
            let worker_pool = Arc::clone(&pool);
            let spawned = thread::Builder::new()
                .name(format!("search-worker-{worker_id}"))
                .spawn(move || worker_pool.run_worker(worker_id));
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    pool.interrupt_hard("worker startup failed");
                    for handle in handles {
                        let _ = handle.join();
                    }
                    return Err(SearchError::WorkerFailure {
                        message: format!("failed to spawn worker {worker_id}: {e}"),
                    });
                }
            }
        }

        info!("Execute hyperparameter search locally on {} threads", n_workers);
        Ok(Self {
            pool,
            handles: Mutex::new(handles),
            n_workers,
        })
    }

    /// Fail all queued work, reject new work and stop the workers once their
    /// current evaluation finishes. Does not wait.
    pub fn interrupt_hard(&self) {
        self.pool.interrupt_hard("scheduler shut down");
    }

    pub fn hard_interrupted(&self) -> bool {
        self.pool.state.lock().hard_interrupted
    }

    /// Hard-interrupt and wait for every worker thread to exit.
    pub fn shutdown(&self) {
        self.interrupt_hard();
        let handles = std::mem::take(&mut *self.handles.lock());
        for handle in handles {
            if handle.join().is_err() {
                error!("Search worker thread panicked during shutdown");
            }
        }
    }
}

impl<E: SplitEvaluator> Scheduler for WorkScheduler<E> {
    fn schedule_work(
        &self,
        is_soft_interruptible: bool,
        split_id: usize,
        point: &HyperparameterPoint,
    ) -> TaskFuture<SplitResult> {
        let mut state = self.pool.state.lock();
        loop {
            if state.hard_interrupted {
                return TaskFuture::from_error(SearchError::hard("scheduler shut down"));
            }
            if is_soft_interruptible && state.soft_interrupted {
                return TaskFuture::from_error(SearchError::soft("scheduler soft interrupted"));
            }
            if state.queue.len() < state.idle_workers {
                let future = TaskFuture::pending();
                state.queue.push_back(Task {
                    future: future.clone(),
                    is_soft_interruptible,
                    split_id,
                    point: point.clone(),
                });
                self.pool.task_available.notify_all();
                return future;
            }
            self.pool.worker_available.wait(&mut state);
        }
    }

    fn soft_interrupted(&self) -> bool {
        self.pool.state.lock().soft_interrupted
    }

    fn interrupt_soft(&self) {
        self.pool.interrupt_soft();
    }

    fn workers_count(&self) -> usize {
        self.n_workers
    }
}

impl<E: SplitEvaluator> Drop for WorkScheduler<E> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
