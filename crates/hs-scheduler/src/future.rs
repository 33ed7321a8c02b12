//! Single-resolution result handle.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;

use hs_types::{SearchError, SearchResult};
use parking_lot::{Condvar, Mutex};

enum State<T> {
    Pending,
    Resolved(T),
    Failed(SearchError),
}

struct Shared<T> {
    state: Mutex<State<T>>,
    settled: Condvar,
}

/// A value that becomes available exactly once.
///
/// Clones share the same state, so any number of threads may wait on it.
/// Waiting has no timeout; callers needing a bound must layer one on top.
pub struct TaskFuture<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for TaskFuture<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> std::fmt::Debug for TaskFuture<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &*self.shared.state.lock() {
            State::Pending => "pending",
            State::Resolved(_) => "resolved",
            State::Failed(_) => "failed",
        };
        f.debug_struct("TaskFuture").field("state", &state).finish()
    }
}

impl<T: Clone> TaskFuture<T> {
    /// An unresolved future, to be settled with [`set_result`](Self::set_result)
    /// or [`set_error`](Self::set_error).
    pub fn pending() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State::Pending),
                settled: Condvar::new(),
            }),
        }
    }

    pub fn from_result(value: T) -> Self {
        let future = Self::pending();
        *future.shared.state.lock() = State::Resolved(value);
        future
    }

    pub fn from_error(error: SearchError) -> Self {
        let future = Self::pending();
        *future.shared.state.lock() = State::Failed(error);
        future
    }

    /// Run `task` on a new thread and settle the future with its outcome.
    ///
    /// A panicking task fails the future with [`SearchError::WorkerFailure`].
    pub fn from_async<F>(task: F) -> Self
    where
        T: Send + 'static,
        F: FnOnce() -> SearchResult<T> + Send + 'static,
    {
        let future = Self::pending();
        let handle = future.clone();
        thread::spawn(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(task)).unwrap_or_else(|payload| {
                Err(SearchError::WorkerFailure {
                    message: format!("task panicked: {}", panic_message(&*payload)),
                })
            });
            // Only this thread can settle the future.
            let _ = handle.settle(outcome);
        });
        future
    }

    pub fn is_finished(&self) -> bool {
        !matches!(*self.shared.state.lock(), State::Pending)
    }

    /// Block until the future settles, then return the value or the failure.
    pub fn result(&self) -> SearchResult<T> {
        let mut state = self.shared.state.lock();
        loop {
            match &*state {
                State::Resolved(value) => return Ok(value.clone()),
                State::Failed(error) => return Err(error.clone()),
                State::Pending => {}
            }
            self.shared.settled.wait(&mut state);
        }
    }

    /// The failure, if the future has already failed. Never blocks.
    pub fn peek_error(&self) -> Option<SearchError> {
        match &*self.shared.state.lock() {
            State::Failed(error) => Some(error.clone()),
            _ => None,
        }
    }

    pub fn set_result(&self, value: T) -> SearchResult<()> {
        self.settle(Ok(value))
    }

    pub fn set_error(&self, error: SearchError) -> SearchResult<()> {
        self.settle(Err(error))
    }

    pub(crate) fn settle(&self, outcome: SearchResult<T>) -> SearchResult<()> {
        let mut state = self.shared.state.lock();
        if !matches!(*state, State::Pending) {
            return Err(SearchError::Protocol("Future already resolved".to_string()));
        }
        *state = match outcome {
            Ok(value) => State::Resolved(value),
            Err(error) => State::Failed(error),
        };
        self.shared.settled.notify_all();
        Ok(())
    }
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
