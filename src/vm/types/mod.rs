//! Type definitions for the VM
//!
//! - AST nodes (Stmt, Expr)
//! - Runtime values (Val)
//! - Control flow (Control, Frame, FrameKind)
//! - Execution phases for statements that can suspend

pub mod ast;
pub mod control;
pub mod phase;
pub mod values;

// Re-export all types for convenient access
pub use ast::{BinOp, Expr, Stmt};
pub use control::{Control, Frame, FrameKind};
pub use phase::*;
pub use values::Val;
