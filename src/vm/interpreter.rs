//! The VM as an [`Engine`] for the thread pool
//!
//! An [`Interpreter`] is the shared top-level state: globals, natives and a
//! scratch stack. Each pool entry owns a [`ScriptThread`] holding the loaded
//! script, its staged values and, while suspended, the parked VM.

use std::collections::HashMap;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tracing::trace;

use super::exec_loop::run_until_done;
use super::native::{ExecContext, NativeCall, NativeFn, NativeResult};
use super::stdlib::inject_stdlib;
use super::types::{Control, Stmt, Val};
use super::vm::VM;
use crate::engine::{Engine, Resumed};
use crate::error::{EngineError, ScriptError};
use crate::pool::EntryId;

/// A loadable script function
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Script {
    /// Parameter names, bound to the call arguments in order
    #[serde(default)]
    pub params: Vec<String>,
    pub body: Stmt,
}

impl Script {
    pub fn new(params: Vec<String>, body: Stmt) -> Self {
        Self { params, body }
    }

    pub fn from_json(source: &str) -> serde_json::Result<Self> {
        serde_json::from_str(source)
    }
}

/// Engine-side state of one pool entry
#[derive(Debug, Default)]
pub struct ScriptThread {
    script: Option<Rc<Script>>,
    stack: Vec<Val>,
    vm: Option<VM>,
}

impl ScriptThread {
    /// Load the function the next fresh call will run
    pub fn load(&mut self, script: Rc<Script>) {
        self.script = Some(script);
    }

    /// Stage a value: a call argument, or the result handed to a resume
    pub fn push(&mut self, value: Val) {
        self.stack.push(value);
    }

    pub fn staged(&self) -> usize {
        self.stack.len()
    }

    pub fn is_suspended(&self) -> bool {
        self.vm.as_ref().is_some_and(VM::is_suspended)
    }

    pub fn script(&self) -> Option<&Rc<Script>> {
        self.script.as_ref()
    }
}

/// Shared interpreter state
pub struct Interpreter {
    globals: HashMap<String, Val>,
    natives: HashMap<String, NativeFn>,
    scratch: Vec<Val>,
    live_threads: usize,
    thread_limit: Option<usize>,
}

impl Interpreter {
    /// Interpreter with the built-in natives registered
    pub fn new() -> Self {
        let mut interp = Self {
            globals: HashMap::new(),
            natives: HashMap::new(),
            scratch: Vec::new(),
            live_threads: 0,
            thread_limit: None,
        };
        inject_stdlib(&mut interp);
        interp
    }

    /// Refuse to create more than `limit` threads at once
    pub fn with_thread_limit(mut self, limit: usize) -> Self {
        self.thread_limit = Some(limit);
        self
    }

    /// Make `name` callable from scripts
    pub fn register_native<F>(&mut self, name: &str, native: F)
    where
        F: Fn(NativeCall) -> NativeResult + 'static,
    {
        self.natives.insert(name.to_string(), Rc::new(native));
        self.globals
            .insert(name.to_string(), Val::Func(name.to_string()));
    }

    pub fn set_global(&mut self, name: &str, value: Val) {
        self.globals.insert(name.to_string(), value);
    }

    pub fn global(&self, name: &str) -> Option<&Val> {
        self.globals.get(name)
    }

    /// Push a value on the top-level scratch stack
    pub fn push_scratch(&mut self, value: Val) {
        self.scratch.push(value);
    }

    pub fn pop_scratch(&mut self) -> Option<Val> {
        self.scratch.pop()
    }

    pub fn scratch_len(&self) -> usize {
        self.scratch.len()
    }

    /// Threads created and not yet closed
    pub fn live_threads(&self) -> usize {
        self.live_threads
    }

    /// View of the interpreter handed to a thread running for `entry`
    pub fn context(&self, entry: EntryId) -> ExecContext<'_> {
        ExecContext {
            globals: &self.globals,
            natives: &self.natives,
            entry,
        }
    }

    /// Build the VM for a fresh call, binding staged arguments to parameters
    fn start(thread: &ScriptThread, args: Vec<Val>) -> Result<VM, ScriptError> {
        let Some(script) = thread.script.as_ref() else {
            return Err(ScriptError::new("no script loaded on thread"));
        };

        let mut args = args.into_iter();
        let env = script
            .params
            .iter()
            .map(|param| (param.clone(), args.next().unwrap_or(Val::Null)))
            .collect();

        Ok(VM::new(script.body.clone(), env))
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for Interpreter {
    type Thread = ScriptThread;
    type Value = Val;
    type Marker = usize;

    fn new_thread(&mut self) -> Result<ScriptThread, EngineError> {
        if let Some(limit) = self.thread_limit {
            if self.live_threads >= limit {
                return Err(EngineError::new(format!(
                    "thread limit of {} reached",
                    limit
                )));
            }
        }

        self.live_threads += 1;
        Ok(ScriptThread::default())
    }

    fn resume(
        &mut self,
        thread: &mut ScriptThread,
        nargs: usize,
        running: EntryId,
    ) -> Resumed<Val> {
        if nargs > thread.stack.len() {
            return Resumed::Failed(ScriptError::new(format!(
                "{} values requested but only {} staged",
                nargs,
                thread.stack.len()
            )));
        }
        let mut args = thread.stack.split_off(thread.stack.len() - nargs);

        let mut vm = match thread.vm.take() {
            Some(mut vm) => {
                let value = match args.len() {
                    0 => Val::Null,
                    1 => args.remove(0),
                    _ => Val::List(args),
                };
                if !vm.resume(value) {
                    return Resumed::Failed(ScriptError::new("thread is not suspended"));
                }
                vm
            }
            None => match Self::start(thread, args) {
                Ok(vm) => vm,
                Err(err) => return Resumed::Failed(err),
            },
        };

        run_until_done(&mut vm, &self.context(running));

        trace!(entry = %running, control = ?vm.control, "vm stopped");

        match std::mem::replace(&mut vm.control, Control::None) {
            Control::Suspend(v) => {
                vm.control = Control::Suspend(v.clone());
                thread.vm = Some(vm);
                Resumed::Yielded(vec![v])
            }
            Control::Return(v) => Resumed::Finished(vec![v]),
            // Ran off the end of the program
            Control::None => Resumed::Finished(vec![Val::Null]),
            Control::Throw(error) => {
                let err = ScriptError::new(error.to_string());
                if vm.traceback.is_empty() {
                    Resumed::Failed(err)
                } else {
                    Resumed::Failed(err.with_traceback(vm.traceback.join("\n")))
                }
            }
        }
    }

    fn reset_thread(&mut self, thread: &mut ScriptThread) {
        thread.script = None;
        thread.stack.clear();
        thread.vm = None;
    }

    fn close_thread(&mut self, thread: ScriptThread) {
        self.live_threads = self.live_threads.saturating_sub(1);
        drop(thread);
    }

    fn stack_marker(&self) -> usize {
        self.scratch.len()
    }

    fn restore_stack(&mut self, marker: usize) {
        self.scratch.truncate(marker);
    }
}
