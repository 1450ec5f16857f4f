//! Save/restore bracket around reentrant calls
//!
//! A finish or error callback may dispatch another call before the outer
//! dispatch has unwound. The bracket remembers the running entry and the
//! engine's stack position so both can be put back afterwards.

use std::ops::{Deref, DerefMut};
use std::panic::Location;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{error, trace};

use super::{contract_error, EntryId, ThreadPool};
use crate::engine::Engine;
use crate::error::{ContractViolation, PoolError};

static NEXT_BRACKET: AtomicU64 = AtomicU64::new(1);

/// Token returned by [`ThreadPool::prepare_callback`].
///
/// Must be handed back to [`ThreadPool::restore_callback`] exactly once, in
/// reverse order of creation relative to other brackets on the same pool.
#[must_use = "a call bracket must be passed to restore_callback"]
pub struct CallBracket<E: Engine> {
    serial: u64,
    previous: Option<EntryId>,
    marker: E::Marker,
    restored: bool,
}

impl<E: Engine> CallBracket<E> {
    /// Running entry at the time the bracket was taken
    pub fn previous_running(&self) -> Option<EntryId> {
        self.previous
    }

    pub fn serial(&self) -> u64 {
        self.serial
    }
}

impl<E: Engine> Drop for CallBracket<E> {
    fn drop(&mut self) {
        if !self.restored {
            error!(
                bracket = self.serial,
                previous = ?self.previous,
                "call bracket dropped without restore; running thread is now unreliable"
            );
        }
    }
}

impl<E: Engine> ThreadPool<E> {
    /// Capture the running entry and engine stack before a nested call
    #[track_caller]
    pub fn prepare_callback(&mut self) -> CallBracket<E> {
        let serial = NEXT_BRACKET.fetch_add(1, Ordering::Relaxed);
        self.open_brackets.push((serial, self.call_depth));

        trace!(
            bracket = serial,
            previous = ?self.running,
            caller = %Location::caller(),
            "call bracket prepared"
        );

        CallBracket {
            serial,
            previous: self.running,
            marker: self.engine.stack_marker(),
            restored: false,
        }
    }

    /// Undo a [`prepare_callback`](Self::prepare_callback).
    ///
    /// Restoring anything but the innermost open bracket is a contract
    /// violation; the pool is left as it was.
    #[track_caller]
    pub fn restore_callback(&mut self, mut bracket: CallBracket<E>) -> Result<(), PoolError> {
        bracket.restored = true;

        let innermost = self.open_brackets.last().map(|&(serial, _)| serial);
        if innermost != Some(bracket.serial) {
            return Err(contract_error(ContractViolation::BracketOrder {
                bracket: bracket.serial,
                innermost,
            }));
        }

        self.open_brackets.pop();
        self.running = bracket.previous;
        self.engine.restore_stack(bracket.marker);

        trace!(
            bracket = bracket.serial,
            running = ?self.running,
            caller = %Location::caller(),
            "call bracket restored"
        );
        Ok(())
    }

    /// Open a bracket that restores itself when dropped, on every exit path
    #[track_caller]
    pub fn enter_callback(&mut self) -> CallbackScope<'_, E> {
        let bracket = self.prepare_callback();
        CallbackScope {
            pool: self,
            bracket: Some(bracket),
        }
    }

    /// Dispatch a call inside its own bracket
    #[track_caller]
    pub fn call_bracketed(
        &mut self,
        id: EntryId,
        nargs: usize,
    ) -> Result<super::CallOutcome<E::Value>, PoolError> {
        let mut scope = self.enter_callback();
        let outcome = scope.call(id, nargs);
        drop(scope);
        outcome
    }

    /// Number of brackets prepared and not yet restored
    pub fn open_brackets(&self) -> usize {
        self.open_brackets.len()
    }
}

/// Scoped call bracket; derefs to the pool
pub struct CallbackScope<'p, E: Engine> {
    pool: &'p mut ThreadPool<E>,
    bracket: Option<CallBracket<E>>,
}

impl<E: Engine> Deref for CallbackScope<'_, E> {
    type Target = ThreadPool<E>;

    fn deref(&self) -> &Self::Target {
        self.pool
    }
}

impl<E: Engine> DerefMut for CallbackScope<'_, E> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.pool
    }
}

impl<E: Engine> Drop for CallbackScope<'_, E> {
    fn drop(&mut self) {
        if let Some(bracket) = self.bracket.take() {
            // Violations are already logged by restore_callback
            let restored = self.pool.restore_callback(bracket);
            debug_assert!(
                restored.is_ok() || std::thread::panicking(),
                "callback scope restored out of order"
            );
        }
    }
}
