//! # Script VM - Resumable Stack-Driven Interpreter
//!
//! The bundled engine for the thread pool.
//!
//! ## Core Principles
//!
//! 1. **Stack-driven execution**: All state in `frames: Vec<Frame>`, no recursion
//!    between statements
//! 2. **Phased frames**: Statements that can stop record their phase, so a
//!    suspended frame knows how to continue
//! 3. **Centralized control flow**: `Control` enum manages return/throw/suspend
//! 4. **Host-driven suspension**: `await` and suspending natives stop the VM;
//!    the host resumes it with the operation's result

pub mod errors;
pub mod exec_loop;
pub mod expressions;
pub mod interpreter;
pub mod native;
pub mod statements;
pub mod stdlib;
pub mod types;
pub mod vm;

#[cfg(test)]
mod tests;

// Re-export commonly used items
pub use errors::ErrorInfo;
pub use exec_loop::{run_until_done, step};
pub use expressions::EvalResult;
pub use interpreter::{Interpreter, Script, ScriptThread};
pub use native::{ExecContext, NativeCall, NativeFn, NativeResult};
pub use types::{BinOp, Control, Expr, Stmt, Val};
pub use vm::{Step, VM};
