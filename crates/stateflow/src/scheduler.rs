//! Single-threaded FIFO microtask queue.
//!
//! Every state mutation the interpreter performs happens inside a task
//! run through this scheduler, never directly on the caller's stack. That
//! gives run-to-completion semantics per microstep: a task may enqueue
//! further tasks (e.g. a `done` transition enqueuing the cascade to
//! `stop()`), and those run after the current task finishes, in the same
//! drain.

use std::collections::VecDeque;

use parking_lot::Mutex;

type Task = Box<dyn FnOnce() + Send>;

struct State {
    initialized: bool,
    processing: bool,
    defer: bool,
    queue: VecDeque<Task>,
}

/// The interpreter's microtask queue.
///
/// All of `initialize`/`schedule`/`clear` are safe to call concurrently;
/// the FIFO ordering and "exactly one task processing at a time" guarantee
/// are enforced by a single internal lock, not by single-threaded access
/// from the caller.
pub struct Scheduler {
    state: Mutex<State>,
}

impl Scheduler {
    pub fn new(defer_events: bool) -> Self {
        Self {
            state: Mutex::new(State {
                initialized: false,
                processing: false,
                defer: defer_events,
                queue: VecDeque::new(),
            }),
        }
    }

    /// Run `first` synchronously, then drain whatever was enqueued while it
    /// ran plus anything that had been deferred before this call. After
    /// this returns, `initialized` is true and every later `schedule` call
    /// runs (or queues behind an in-flight drain) immediately.
    pub fn initialize(&self, first: impl FnOnce() + Send + 'static) {
        {
            let mut state = self.state.lock();
            debug_assert!(!state.initialized, "Scheduler::initialize called twice");
            state.processing = true;
        }

        first();
        self.drain();

        let mut state = self.state.lock();
        state.initialized = true;
    }

    /// Enqueue `task`.
    ///
    /// - Not yet initialized, `defer_events` set: held until `initialize`.
    /// - Not yet initialized, `defer_events` unset: dropped with a warning.
    /// - Initialized, nothing processing: runs `task` (and anything it
    ///   enqueues) before this call returns.
    /// - Initialized, a drain already in progress (including the case
    ///   where `schedule` was called from inside a running task): appended
    ///   to the queue, picked up by the outer drain loop.
    pub fn schedule(&self, task: impl FnOnce() + Send + 'static) {
        let mut state = self.state.lock();

        if !state.initialized {
            if state.defer {
                state.queue.push_back(Box::new(task));
            } else {
                tracing::warn!(
                    "stateflow: event scheduled before the interpreter was initialized and \
                     defer_events is disabled; dropping it"
                );
            }
            return;
        }

        if state.processing {
            state.queue.push_back(Box::new(task));
            return;
        }

        state.processing = true;
        state.queue.push_back(Box::new(task));
        drop(state);
        self.drain();
    }

    /// Discard whatever is queued. Does not touch a task already running;
    /// the caller (`Interpreter::stop`) is responsible for any
    /// post-conditions around an in-flight task.
    pub fn clear(&self) {
        self.state.lock().queue.clear();
    }

    fn drain(&self) {
        loop {
            let next = {
                let mut state = self.state.lock();
                state.queue.pop_front()
            };

            match next {
                Some(task) => task(),
                None => break,
            }
        }

        self.state.lock().processing = false;
    }
}
