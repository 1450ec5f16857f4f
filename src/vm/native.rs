//! Host-provided native functions
//!
//! Natives are how a script reaches the host: they run synchronously and may
//! return a value, raise an error, or ask the engine to suspend the thread
//! (the host then resumes it once the pending operation is done).

use std::collections::HashMap;
use std::rc::Rc;

use super::errors::ErrorInfo;
use super::types::Val;
use crate::pool::EntryId;

/// A call into a native function
#[derive(Debug, Clone)]
pub struct NativeCall {
    /// Pool entry the calling thread runs on behalf of
    pub entry: EntryId,
    pub args: Vec<Val>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NativeResult {
    Return(Val),
    Throw(ErrorInfo),
    /// Suspend the calling thread, yielding this value to the host
    Suspend(Val),
}

pub type NativeFn = Rc<dyn Fn(NativeCall) -> NativeResult>;

/// What an executing thread can see of its interpreter
pub struct ExecContext<'a> {
    pub globals: &'a HashMap<String, Val>,
    pub natives: &'a HashMap<String, NativeFn>,
    pub entry: EntryId,
}
