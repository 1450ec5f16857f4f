//! Execution context held by the pool

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use super::ThreadPool;
use crate::engine::Engine;
use crate::error::ScriptError;

/* ===================== Handles ===================== */

/// Handle to a thread entry in a pool
///
/// The index is stable for as long as the entry lives and is reused once the
/// entry is gone. Terminating an entry bumps the slot generation, so a stale
/// handle keeps reporting [`ThreadState::Dead`] even after the index hosts a
/// new thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId {
    index: u32,
    generation: u32,
}

impl EntryId {
    pub(crate) fn new(index: usize, generation: u32) -> Self {
        Self {
            index: index as u32,
            generation,
        }
    }

    /// Slot index within the pool
    pub fn index(self) -> usize {
        self.index as usize
    }

    pub fn generation(self) -> u32 {
        self.generation
    }

    pub(crate) fn next_generation(self) -> Self {
        Self {
            index: self.index,
            generation: self.generation.wrapping_add(1),
        }
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}.{}", self.index, self.generation)
    }
}

/* ===================== State ===================== */

/// Lifecycle state of a thread entry
///
/// `Idle -> Running -> {Completed | Errored | Suspended}`, `Suspended -> Running`
/// on resume, `Completed/Errored -> Idle` on return, anything `-> Dead` on
/// terminate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreadState {
    Idle,
    Running,
    Suspended,
    Completed,
    Errored,
    Dead,
}

impl ThreadState {
    /// Whether a call may be dispatched on an entry in this state
    pub fn is_callable(self) -> bool {
        matches!(self, ThreadState::Idle | ThreadState::Suspended)
    }

    /// Finished a dispatch and waiting for return or terminate
    pub fn is_settled(self) -> bool {
        matches!(self, ThreadState::Completed | ThreadState::Errored)
    }
}

impl fmt::Display for ThreadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ThreadState::Idle => "idle",
            ThreadState::Running => "running",
            ThreadState::Suspended => "suspended",
            ThreadState::Completed => "completed",
            ThreadState::Errored => "errored",
            ThreadState::Dead => "dead",
        };
        f.write_str(name)
    }
}

/* ===================== Callbacks ===================== */

/// Invoked with the call results when a dispatch completes
pub type FinishCallback<E> =
    Box<dyn FnMut(&mut ThreadPool<E>, EntryId, &[<E as Engine>::Value])>;

/// Invoked with the script error when a dispatch fails
pub type ErrorCallback<E> = Box<dyn FnMut(&mut ThreadPool<E>, EntryId, &ScriptError)>;

/* ===================== Entry ===================== */

/// One suspendable script thread plus the host's bookkeeping for it
pub struct ThreadEntry<E: Engine> {
    pub(crate) id: EntryId,
    pub(crate) state: ThreadState,
    pub(crate) thread: Option<E::Thread>,

    pub(crate) finish_callback: Option<FinishCallback<E>>,
    pub(crate) error_callback: Option<ErrorCallback<E>>,

    /// Bumped on every return to idle
    pub(crate) uses: u64,

    /// Continuation data owned by whoever drives this thread
    payload: Option<Box<dyn Any>>,

    /// Back-references to host objects, passed through untouched
    task: Option<Rc<dyn Any>>,
    config: Option<Rc<dyn Any>>,
}

impl<E: Engine> ThreadEntry<E> {
    pub(crate) fn new(id: EntryId, thread: E::Thread) -> Self {
        Self {
            id,
            state: ThreadState::Idle,
            thread: Some(thread),
            finish_callback: None,
            error_callback: None,
            uses: 0,
            payload: None,
            task: None,
            config: None,
        }
    }

    pub fn id(&self) -> EntryId {
        self.id
    }

    pub fn state(&self) -> ThreadState {
        self.state
    }

    /// Engine-side thread, used to stage a function and its arguments
    pub fn thread(&self) -> Option<&E::Thread> {
        self.thread.as_ref()
    }

    pub fn thread_mut(&mut self) -> Option<&mut E::Thread> {
        self.thread.as_mut()
    }

    /// Register the completion hook, replacing any previous one
    pub fn on_finish<F>(&mut self, callback: F) -> &mut Self
    where
        F: FnMut(&mut ThreadPool<E>, EntryId, &[E::Value]) + 'static,
    {
        self.finish_callback = Some(Box::new(callback));
        self
    }

    /// Register the error hook, replacing any previous one
    pub fn on_error<F>(&mut self, callback: F) -> &mut Self
    where
        F: FnMut(&mut ThreadPool<E>, EntryId, &ScriptError) + 'static,
    {
        self.error_callback = Some(Box::new(callback));
        self
    }

    pub fn has_finish_callback(&self) -> bool {
        self.finish_callback.is_some()
    }

    pub fn has_error_callback(&self) -> bool {
        self.error_callback.is_some()
    }

    pub fn set_payload<T: Any>(&mut self, payload: T) {
        self.payload = Some(Box::new(payload));
    }

    pub fn payload<T: Any>(&self) -> Option<&T> {
        self.payload.as_ref()?.downcast_ref()
    }

    pub fn payload_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.payload.as_mut()?.downcast_mut()
    }

    /// Take the payload out if it has type `T`; otherwise it stays in place
    pub fn take_payload<T: Any>(&mut self) -> Option<T> {
        match self.payload.take()?.downcast::<T>() {
            Ok(payload) => Some(*payload),
            Err(other) => {
                self.payload = Some(other);
                None
            }
        }
    }

    pub fn has_payload(&self) -> bool {
        self.payload.is_some()
    }

    pub fn set_task(&mut self, task: Rc<dyn Any>) {
        self.task = Some(task);
    }

    pub fn task(&self) -> Option<&Rc<dyn Any>> {
        self.task.as_ref()
    }

    pub fn set_config(&mut self, config: Rc<dyn Any>) {
        self.config = Some(config);
    }

    pub fn config(&self) -> Option<&Rc<dyn Any>> {
        self.config.as_ref()
    }

    /// Drop callbacks, payload and back-references
    pub(crate) fn clear_hooks(&mut self) {
        self.finish_callback = None;
        self.error_callback = None;
        self.payload = None;
        self.task = None;
        self.config = None;
    }
}

impl<E: Engine> fmt::Debug for ThreadEntry<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadEntry")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("has_thread", &self.thread.is_some())
            .field("finish_callback", &self.finish_callback.is_some())
            .field("error_callback", &self.error_callback.is_some())
            .field("payload", &self.payload.is_some())
            .finish()
    }
}
