//! Error types shared by the pool and engines

use thiserror::Error;

use crate::pool::{EntryId, ThreadState};

/// The engine could not allocate a new script thread.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct EngineError {
    pub message: String,
}

impl EngineError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Error raised by a script while a call was being dispatched.
///
/// Always handed back to the caller of `call`, and additionally to the
/// entry's error callback when one is registered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ScriptError {
    /// Diagnostic text produced by the engine
    pub message: String,

    /// Engine-side traceback at the point of failure, if the engine keeps one
    pub traceback: Option<String>,
}

impl ScriptError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            traceback: None,
        }
    }

    pub fn with_traceback(mut self, traceback: impl Into<String>) -> Self {
        self.traceback = Some(traceback.into());
        self
    }
}

/// Misuse of the pool API. These indicate a defect in the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContractViolation {
    #[error("{op} is not allowed on thread {entry} while it is {state}")]
    InvalidState {
        op: &'static str,
        entry: EntryId,
        state: ThreadState,
    },

    #[error("reentrant call on thread {entry} outside of a call bracket")]
    UnbracketedCall { entry: EntryId },

    #[error("call bracket #{bracket} restored out of order (innermost open bracket: {innermost:?})")]
    BracketOrder { bracket: u64, innermost: Option<u64> },

    #[error("thread pool freed while thread {entry} is {state}")]
    BusyOnFree { entry: EntryId, state: ThreadState },
}

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("thread pool contract violation: {0}")]
    Contract(#[from] ContractViolation),

    #[error("failed to allocate script thread: {0}")]
    Exhausted(#[source] EngineError),
}

impl PoolError {
    /// The contract violation behind this error, if that is what it is
    pub fn as_contract(&self) -> Option<&ContractViolation> {
        match self {
            PoolError::Contract(violation) => Some(violation),
            PoolError::Exhausted(_) => None,
        }
    }
}
