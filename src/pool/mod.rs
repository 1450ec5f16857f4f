//! # Thread pool
//!
//! Keeps a set of suspendable script threads warm for one worker flow.
//!
//! - `get` hands out an idle thread (LIFO reuse, growing on demand)
//! - `call` runs it to completion, error or suspension
//! - `return_entry` / `terminate` settle it afterwards
//! - `prepare_callback` / `restore_callback` bracket reentrant calls made
//!   from inside completion callbacks
//!
//! Exactly one thread runs at a time. A pool belongs to a single flow and
//! does no locking; it is neither `Send` nor `Sync`.

mod bracket;
mod dispatch;
mod entry;

#[cfg(test)]
mod tests;

pub use bracket::{CallBracket, CallbackScope};
pub use dispatch::CallOutcome;
pub use entry::{EntryId, ErrorCallback, FinishCallback, ThreadEntry, ThreadState};

use std::panic::Location;

use serde::Serialize;
use tracing::{debug, error, trace, warn};

use crate::config::PoolConfig;
use crate::engine::Engine;
use crate::error::{ContractViolation, PoolError};

/// Point-in-time counters for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PoolStats {
    /// Slots ever allocated, live or vacant
    pub slots: usize,
    pub idle: usize,
    pub suspended: usize,
    /// Entries handed out and not yet returned or terminated
    pub in_use: usize,
    /// Slots without a thread, reusable by growth
    pub vacant: usize,
}

/// Pool of suspendable script threads bound to one engine instance
pub struct ThreadPool<E: Engine> {
    engine: E,
    config: PoolConfig,

    entries: Vec<ThreadEntry<E>>,

    /// Indices of idle entries; popped from the back
    free: Vec<usize>,

    /// Indices of slots whose thread was released
    vacant: Vec<usize>,

    /// Entry on whose behalf the engine is executing
    running: Option<EntryId>,

    /// Outstanding call brackets as (serial, dispatch depth when prepared),
    /// innermost last
    open_brackets: Vec<(u64, usize)>,

    /// Dispatches currently in progress on this pool
    call_depth: usize,
}

impl<E: Engine> ThreadPool<E> {
    /// Create a pool with the default configuration
    pub fn new(engine: E) -> Result<Self, PoolError> {
        Self::with_config(engine, PoolConfig::default())
    }

    /// Create a pool, pre-creating `config.initial_threads` idle threads
    pub fn with_config(engine: E, config: PoolConfig) -> Result<Self, PoolError> {
        let mut pool = Self {
            engine,
            entries: Vec::with_capacity(config.initial_threads),
            free: Vec::with_capacity(config.initial_threads),
            vacant: Vec::new(),
            running: None,
            open_brackets: Vec::new(),
            call_depth: 0,
            config,
        };

        for _ in 0..pool.config.initial_threads {
            let id = pool.allocate()?;
            pool.free.push(id.index());
        }

        debug!(
            threads = pool.entries.len(),
            max_idle = pool.config.max_idle_threads,
            "thread pool created"
        );

        Ok(pool)
    }

    /// Release every thread and hand the engine back.
    ///
    /// All threads are released regardless; if any was still running or
    /// suspended the engine is dropped and a contract violation is reported.
    pub fn free(mut self) -> Result<E, PoolError> {
        let busy = self
            .entries
            .iter()
            .find(|entry| matches!(entry.state, ThreadState::Running | ThreadState::Suspended))
            .map(|entry| (entry.id, entry.state));

        for entry in &mut self.entries {
            entry.clear_hooks();
            if let Some(thread) = entry.thread.take() {
                self.engine.close_thread(thread);
            }
            entry.state = ThreadState::Dead;
        }

        debug!(slots = self.entries.len(), "thread pool freed");

        match busy {
            Some((entry, state)) => {
                Err(contract_error(ContractViolation::BusyOnFree { entry, state }))
            }
            None => Ok(self.engine),
        }
    }

    /* ===================== Acquisition ===================== */

    /// Take an idle thread, growing the pool when none is left
    #[track_caller]
    pub fn get(&mut self) -> Result<EntryId, PoolError> {
        let id = match self.free.pop() {
            Some(index) => self.entries[index].id,
            None => {
                let id = self.allocate()?;
                debug!(entry = %id, slots = self.entries.len(), "thread pool grown");
                id
            }
        };

        trace!(entry = %id, caller = %Location::caller(), "thread acquired");
        Ok(id)
    }

    /// Put a completed thread back on the free list.
    ///
    /// Clears callbacks, payload and back-references. Errored threads are only
    /// accepted when `recycle_errored` is enabled; anything else is a contract
    /// violation and leaves the pool untouched.
    #[track_caller]
    pub fn return_entry(&mut self, id: EntryId) -> Result<(), PoolError> {
        let state = self.state(id);
        let reusable = state == ThreadState::Completed
            || (state == ThreadState::Errored && self.config.recycle_errored);
        if !reusable {
            return Err(contract_error(ContractViolation::InvalidState {
                op: "return",
                entry: id,
                state,
            }));
        }

        if self.running == Some(id) {
            self.running = None;
        }

        let index = id.index();
        if self.free.len() >= self.config.max_idle_threads {
            // Enough warm threads already
            self.release_slot(index);
            trace!(entry = %id, caller = %Location::caller(), "thread released over idle cap");
            return Ok(());
        }

        let entry = &mut self.entries[index];
        entry.clear_hooks();
        if let Some(thread) = entry.thread.as_mut() {
            self.engine.reset_thread(thread);
        }
        entry.state = ThreadState::Idle;
        entry.uses += 1;
        self.free.push(index);

        trace!(entry = %id, caller = %Location::caller(), "thread returned");
        Ok(())
    }

    /// Release a thread's engine resources and mark it dead.
    ///
    /// Works from any state, including suspended and mid-callback. Never fails:
    /// terminating a handle that is already dead does nothing. The slot is
    /// refilled with a fresh idle thread while the pool is below its idle cap.
    #[track_caller]
    pub fn terminate(&mut self, id: EntryId) {
        let Some(prior) = self.entry(id).map(|entry| entry.state) else {
            trace!(entry = %id, "terminate on dead thread ignored");
            return;
        };

        if self.running == Some(id) {
            self.running = None;
        }
        if prior == ThreadState::Idle {
            self.free.retain(|&index| index != id.index());
        }

        self.release_slot(id.index());
        debug!(entry = %id, state = %prior, caller = %Location::caller(), "thread terminated");

        if self.free.len() < self.config.max_idle_threads {
            match self.allocate() {
                Ok(fresh) => self.free.push(fresh.index()),
                Err(err) => warn!(entry = %id, error = %err, "failed to replenish thread pool"),
            }
        }
    }

    /// Apply the default settle policy after a dispatch: completed threads are
    /// returned, errored threads terminated (or returned when
    /// `recycle_errored` is set). Threads in any other state are left alone.
    #[track_caller]
    pub fn settle(&mut self, id: EntryId) -> Result<(), PoolError> {
        match self.state(id) {
            ThreadState::Completed => self.return_entry(id),
            ThreadState::Errored if self.config.recycle_errored => self.return_entry(id),
            ThreadState::Errored => {
                self.terminate(id);
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /* ===================== Running Entry ===================== */

    /// Entry currently executing, as seen by suspension points
    pub fn running(&self) -> Option<EntryId> {
        self.running
    }

    pub fn set_running(&mut self, id: Option<EntryId>) {
        self.running = id;
    }

    /* ===================== Inspection ===================== */

    /// Live entry behind `id`; `None` once the handle is stale
    pub fn entry(&self, id: EntryId) -> Option<&ThreadEntry<E>> {
        self.entries
            .get(id.index())
            .filter(|entry| entry.id == id && entry.state != ThreadState::Dead)
    }

    pub fn entry_mut(&mut self, id: EntryId) -> Option<&mut ThreadEntry<E>> {
        self.entries
            .get_mut(id.index())
            .filter(|entry| entry.id == id && entry.state != ThreadState::Dead)
    }

    /// State of `id`; stale handles are `Dead`
    pub fn state(&self, id: EntryId) -> ThreadState {
        self.entry(id).map_or(ThreadState::Dead, |entry| entry.state)
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn stats(&self) -> PoolStats {
        let suspended = self
            .entries
            .iter()
            .filter(|entry| entry.state == ThreadState::Suspended)
            .count();
        let live = self.entries.len() - self.vacant.len();

        PoolStats {
            slots: self.entries.len(),
            idle: self.free.len(),
            suspended,
            in_use: live - self.free.len(),
            vacant: self.vacant.len(),
        }
    }

    /* ===================== Slot Management ===================== */

    /// Create a thread in a vacant slot, or in a new one
    fn allocate(&mut self) -> Result<EntryId, PoolError> {
        let thread = self.engine.new_thread().map_err(|err| {
            warn!(error = %err, slots = self.entries.len(), "engine refused new thread");
            PoolError::Exhausted(err)
        })?;

        let id = match self.vacant.pop() {
            Some(index) => {
                let id = self.entries[index].id;
                self.entries[index] = ThreadEntry::new(id, thread);
                id
            }
            None => {
                let id = EntryId::new(self.entries.len(), 0);
                self.entries.push(ThreadEntry::new(id, thread));
                id
            }
        };

        Ok(id)
    }

    /// Close the slot's thread, invalidate its handle and mark it vacant
    fn release_slot(&mut self, index: usize) {
        let entry = &mut self.entries[index];
        entry.clear_hooks();
        if let Some(thread) = entry.thread.take() {
            self.engine.close_thread(thread);
        }
        entry.state = ThreadState::Dead;
        entry.id = entry.id.next_generation();
        self.vacant.push(index);
    }
}

/// Log and wrap a contract violation
pub(crate) fn contract_error(violation: ContractViolation) -> PoolError {
    error!(%violation, "thread pool contract violation");
    PoolError::Contract(violation)
}
