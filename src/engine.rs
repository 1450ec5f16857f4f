//! Interface to the embedded scripting engine
//!
//! The pool never looks inside a script thread. Everything it needs from the
//! engine goes through this trait: creating and releasing threads, driving a
//! thread to its next stopping point, and saving/restoring the engine's
//! top-level stack around reentrant callbacks.

use std::fmt;

use crate::error::{EngineError, ScriptError};
use crate::pool::EntryId;

/// Where a resumed thread stopped
#[derive(Debug, Clone, PartialEq)]
pub enum Resumed<V> {
    /// The function returned; these are its results
    Finished(Vec<V>),
    /// The thread executed the engine's suspend primitive
    Yielded(Vec<V>),
    /// The function raised an error
    Failed(ScriptError),
}

/// A scripting engine able to run suspendable threads.
pub trait Engine: 'static {
    /// Engine-side state of one suspendable thread
    type Thread: 'static;

    /// Values passed in and out of threads
    type Value: Clone + fmt::Debug + 'static;

    /// Position of the engine's top-level stack, captured by call brackets
    type Marker: Copy + fmt::Debug + PartialEq + 'static;

    /// Create a fresh thread bound to this engine.
    fn new_thread(&mut self) -> Result<Self::Thread, EngineError>;

    /// Run `thread` until it finishes, fails or suspends.
    ///
    /// `nargs` values staged on the thread are consumed: as call arguments for a
    /// fresh thread, or as the result of the suspending operation on resume.
    /// `running` names the pool entry on whose behalf the thread runs, so that
    /// suspension points inside the engine can record who to wake later.
    fn resume(
        &mut self,
        thread: &mut Self::Thread,
        nargs: usize,
        running: EntryId,
    ) -> Resumed<Self::Value>;

    /// Clear a finished thread so it can run a new function.
    fn reset_thread(&mut self, thread: &mut Self::Thread);

    /// Release all engine resources held by a thread.
    fn close_thread(&mut self, thread: Self::Thread);

    /// Current top of the engine's top-level stack.
    fn stack_marker(&self) -> Self::Marker;

    /// Drop anything pushed on the top-level stack since `marker` was taken.
    fn restore_stack(&mut self, marker: Self::Marker);
}
