//! Call dispatch
//!
//! Runs a thread to its next stopping point and routes the outcome:
//! completion and error go to the entry's callbacks, suspension hands the
//! thread over to whoever started the pending operation.

use std::panic::Location;

use tracing::{debug, error, trace};

use super::{contract_error, EntryId, ThreadPool, ThreadState};
use crate::engine::{Engine, Resumed};
use crate::error::{ContractViolation, PoolError, ScriptError};

/// How a dispatched call ended
#[derive(Debug, Clone, PartialEq)]
pub enum CallOutcome<V> {
    /// Function returned; the finish callback (if any) has run
    Completed(Vec<V>),
    /// Script raised an error; the error callback (if any) has run
    Failed(ScriptError),
    /// Thread suspended with these values; nothing was called back
    Suspended(Vec<V>),
}

impl<V> CallOutcome<V> {
    pub fn is_completed(&self) -> bool {
        matches!(self, CallOutcome::Completed(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, CallOutcome::Failed(_))
    }

    pub fn is_suspended(&self) -> bool {
        matches!(self, CallOutcome::Suspended(_))
    }

    pub fn error(&self) -> Option<&ScriptError> {
        match self {
            CallOutcome::Failed(err) => Some(err),
            _ => None,
        }
    }
}

impl<E: Engine> ThreadPool<E> {
    /// Run `id` until it completes, fails or suspends.
    ///
    /// On an idle thread this starts the staged function with `nargs`
    /// arguments; on a suspended thread it resumes it, the `nargs` staged
    /// values becoming the result of the suspending operation.
    ///
    /// Calling from inside a finish/error callback requires an open bracket
    /// (see [`prepare_callback`](Self::prepare_callback)).
    #[track_caller]
    pub fn call(
        &mut self,
        id: EntryId,
        nargs: usize,
    ) -> Result<CallOutcome<E::Value>, PoolError> {
        let state = self.state(id);
        if !state.is_callable() {
            return Err(contract_error(ContractViolation::InvalidState {
                op: "call",
                entry: id,
                state,
            }));
        }

        // A nested dispatch needs a bracket opened inside the current one
        if self.call_depth > 0 {
            let bracketed = matches!(
                self.open_brackets.last(),
                Some(&(_, depth)) if depth == self.call_depth
            );
            if !bracketed {
                return Err(contract_error(ContractViolation::UnbracketedCall { entry: id }));
            }
        }

        Ok(self.dispatch(id, nargs, state, Location::caller()))
    }

    /// Resume a suspended thread; like [`call`](Self::call) but refuses
    /// threads that are not suspended
    #[track_caller]
    pub fn resume(
        &mut self,
        id: EntryId,
        nargs: usize,
    ) -> Result<CallOutcome<E::Value>, PoolError> {
        let state = self.state(id);
        if state != ThreadState::Suspended {
            return Err(contract_error(ContractViolation::InvalidState {
                op: "resume",
                entry: id,
                state,
            }));
        }
        self.call(id, nargs)
    }

    fn dispatch(
        &mut self,
        id: EntryId,
        nargs: usize,
        prior: ThreadState,
        caller: &'static Location<'static>,
    ) -> CallOutcome<E::Value> {
        let index = id.index();

        self.entries[index].state = ThreadState::Running;
        self.running = Some(id);
        self.call_depth += 1;

        let resuming = prior == ThreadState::Suspended;
        trace!(entry = %id, nargs, resuming, %caller, "dispatching call");

        let resumed = match self.entries[index].thread.as_mut() {
            Some(thread) => self.engine.resume(thread, nargs, id),
            None => Resumed::Failed(ScriptError::new("thread has no engine state")),
        };

        let outcome = match resumed {
            Resumed::Finished(values) => {
                self.entries[index].state = ThreadState::Completed;
                self.fire_finish(id, &values);
                CallOutcome::Completed(values)
            }
            Resumed::Failed(err) => {
                self.entries[index].state = ThreadState::Errored;
                self.fire_error(id, &err);
                CallOutcome::Failed(err)
            }
            Resumed::Yielded(values) => {
                self.entries[index].state = ThreadState::Suspended;
                debug!(entry = %id, %caller, "thread suspended");
                CallOutcome::Suspended(values)
            }
        };

        self.call_depth -= 1;
        if self.running == Some(id) {
            self.running = None;
        }

        // Brackets the callbacks left open cannot be restored in order anymore
        while let Some(&(serial, depth)) = self.open_brackets.last() {
            if depth <= self.call_depth {
                break;
            }
            self.open_brackets.pop();
            error!(entry = %id, bracket = serial, "call bracket left open by callback discarded");
        }

        outcome
    }

    fn fire_finish(&mut self, id: EntryId, values: &[E::Value]) {
        let entry = &mut self.entries[id.index()];
        let uses = entry.uses;
        let Some(mut callback) = entry.finish_callback.take() else {
            return;
        };

        callback(self, id, values);

        // Keep the hook registered until return/terminate clears it, unless
        // the entry was returned and reused meanwhile
        if let Some(entry) = self.entry_mut(id) {
            if entry.uses == uses
                && entry.state == ThreadState::Completed
                && entry.finish_callback.is_none()
            {
                entry.finish_callback = Some(callback);
            }
        }
    }

    fn fire_error(&mut self, id: EntryId, err: &ScriptError) {
        let entry = &mut self.entries[id.index()];
        let uses = entry.uses;
        let Some(mut callback) = entry.error_callback.take() else {
            error!(
                entry = %id,
                error = %err.message,
                traceback = err.traceback.as_deref().unwrap_or(""),
                "script call failed"
            );
            return;
        };

        callback(self, id, err);

        if let Some(entry) = self.entry_mut(id) {
            if entry.uses == uses
                && entry.state == ThreadState::Errored
                && entry.error_callback.is_none()
            {
                entry.error_callback = Some(callback);
            }
        }
    }
}
