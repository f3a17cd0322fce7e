// Copyright 2020-2022 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use std::sync::{Arc, Mutex};
use tokio::{runtime::Handle, task::JoinHandle};

/// A deferred continuation. State it needs must be captured by value at
/// the `defer` call site; the `'static` bound keeps references to live
/// transaction state out.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Handle to a dispatched continuation.
pub type TaskHandle = JoinHandle<()>;

/// Collaborator that schedules committed continuations.
///
/// Contract: the continuation is invoked exactly once, at or after the
/// moment of the call, and never synchronously from within `dispatch`
/// itself. Commit still holds the var locks at that point. Errors inside
/// the continuation are the dispatcher's problem, not the transaction's.
pub trait Dispatch: Send + Sync {
    fn dispatch(&self, task: Task) -> TaskHandle;
}

/// Dispatches continuations onto a tokio runtime.
#[derive(Clone)]
pub struct TokioDispatcher {
    handle: Handle,
}

impl TokioDispatcher {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Binds to the runtime of the calling context.
    ///
    /// # Panics
    /// Outside of a tokio runtime.
    pub fn current() -> Self {
        Self {
            handle: Handle::current(),
        }
    }
}

impl Dispatch for TokioDispatcher {
    fn dispatch(&self, task: Task) -> TaskHandle {
        self.handle.spawn(async move { task() })
    }
}

/// A caller owned slot that receives the handle of a deferred continuation
/// once the enqueueing attempt commits.
///
/// A slot is bound at commit time only. Until then, and after any failed
/// attempt, [`FutureSlot::take`] returns `None`.
#[derive(Clone, Default)]
pub struct FutureSlot {
    inner: Arc<Mutex<Option<TaskHandle>>>,
}

impl FutureSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn fill(&self, handle: TaskHandle) {
        *self.inner.lock().expect("future slot poisoned") = Some(handle);
    }

    /// Removes and returns the task handle, if a commit has published one.
    pub fn take(&self) -> Option<TaskHandle> {
        self.inner.lock().expect("future slot poisoned").take()
    }

    /// Whether a commit has published a handle.
    pub fn is_bound(&self) -> bool {
        self.inner.lock().expect("future slot poisoned").is_some()
    }
}
