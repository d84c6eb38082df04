//! Work queue and one-shot futures for the generator pipeline.
//!
//! A fixed pool of consumer threads drains one FIFO of type-erased
//! tasks. Shutdown uses a chain of sentinels: the producer posts a
//! single sentinel, and every consumer that pops it re-posts it before
//! exiting, so one sentinel drains the whole pool. Consumers yield on
//! an empty queue; the orchestrator is the only caller that blocks on
//! futures.

use std::any::Any;
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;

use crate::errors::GenError;

/// Task return value marking the shutdown sentinel.
pub const SENTINEL: i32 = -1;

/// Type-erased unit of work.
pub type Task = Box<dyn FnOnce() -> i32 + Send + 'static>;

#[derive(Default)]
pub struct TaskQueue {
    tasks: Mutex<VecDeque<Task>>,
}

impl TaskQueue {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, task: Task) {
        let mut q = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        q.push_back(task);
    }

    pub fn push_sentinel(&self) {
        self.push(Box::new(|| SENTINEL));
    }

    fn pop(&self) -> Option<Task> {
        let mut q = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        q.pop_front()
    }
}

/// Consumer thread body: run tasks until a sentinel arrives, then
/// re-post the sentinel and exit.
pub fn consumer_loop(queue: Arc<TaskQueue>) {
    loop {
        let Some(task) = queue.pop() else {
            thread::yield_now();
            continue;
        };
        if task() == SENTINEL {
            queue.push_sentinel();
            return;
        }
    }
}

struct FutureState<T> {
    slot: Mutex<Option<Result<T, GenError>>>,
    ready: Condvar,
}

/// One-shot future for a submitted task's result.
pub struct TaskFuture<T> {
    state: Arc<FutureState<T>>,
}

impl<T> TaskFuture<T> {
    /// Block until the task completes, then take its result.
    pub fn get(self) -> Result<T, GenError> {
        let mut slot = self
            .state
            .slot
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        loop {
            if let Some(res) = slot.take() {
                return res;
            }
            slot = self
                .state
                .ready
                .wait(slot)
                .unwrap_or_else(|e| e.into_inner());
        }
    }
}

/// Enqueue a job; its result (or captured panic) lands in the returned
/// future.
pub fn submit<T, F>(queue: &TaskQueue, job: F) -> TaskFuture<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, GenError> + Send + 'static,
{
    let state = Arc::new(FutureState {
        slot: Mutex::new(None),
        ready: Condvar::new(),
    });
    let inner = Arc::clone(&state);
    queue.push(Box::new(move || {
        let outcome = catch_unwind(AssertUnwindSafe(job))
            .unwrap_or_else(|payload| Err(GenError::Task(panic_message(payload.as_ref()))));
        *inner.slot.lock().unwrap_or_else(|e| e.into_inner()) = Some(outcome);
        inner.ready.notify_all();
        0
    }));
    TaskFuture { state }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "task panicked".to_string()
    }
}
