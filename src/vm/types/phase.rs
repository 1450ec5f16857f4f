//! Execution phase enums
//!
//! Each statement that can stop mid-way records which step it is at, so a
//! suspended frame knows what to do when the thread is resumed.

use serde::{Deserialize, Serialize};

/// Phase for statements that evaluate one expression (Let, Assign, Expr, Return)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum EvalPhase {
    /// Evaluate the expression
    Eval = 0,
    /// Suspended on the expression; take the resume value instead
    Resume = 1,
}

/// Phase for If statements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum IfPhase {
    Test = 0,
    /// Branch pushed; pop when it finishes
    Branch = 1,
}

/// Phase for While statements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum WhilePhase {
    Test = 0,
    /// Body pushed; re-test when it finishes
    Body = 1,
}
