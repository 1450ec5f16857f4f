//! Virtual Machine state
//!
//! The VM holds all execution state of one script invocation:
//! - frames: Stack of active statements
//! - control: Current control flow state (return, throw, suspend)
//! - env: Local variables

use super::types::{Control, EvalPhase, Frame, FrameKind, IfPhase, Stmt, Val, WhilePhase};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/* ===================== VM ===================== */

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VM {
    /// Stack of execution frames
    pub frames: Vec<Frame>,

    /// Current control flow state
    pub control: Control,

    /// Variables of this invocation
    pub env: HashMap<String, Val>,

    /// Value delivered by the last resume, consumed by the suspended frame
    pub resume_value: Option<Val>,

    /// Frames active when an error was thrown, innermost first
    pub traceback: Vec<String>,
}

impl VM {
    /// Create a new VM with a program
    ///
    /// The program is wrapped in a root frame; nothing runs until stepped.
    pub fn new(program: Stmt, env: HashMap<String, Val>) -> Self {
        let mut vm = VM {
            frames: vec![],
            control: Control::None,
            env,
            resume_value: None,
            traceback: vec![],
        };

        push_stmt(&mut vm, program);

        vm
    }

    pub fn is_suspended(&self) -> bool {
        matches!(self.control, Control::Suspend(_))
    }

    /// Resume a suspended VM with the result of the awaited operation
    ///
    /// Returns false if the VM was not suspended.
    pub fn resume(&mut self, value: Val) -> bool {
        if !self.is_suspended() {
            return false;
        }

        self.control = Control::None;
        self.resume_value = Some(value);
        true
    }
}

/* ===================== Frame Management ===================== */

/// Push a new frame for a statement onto the stack
pub fn push_stmt(vm: &mut VM, stmt: Stmt) {
    let phase = EvalPhase::Eval;

    let kind = match &stmt {
        Stmt::Block { .. } => FrameKind::Block { idx: 0 },
        Stmt::Let { .. } => FrameKind::Let { phase },
        Stmt::Assign { .. } => FrameKind::Assign { phase },
        Stmt::Expr { .. } => FrameKind::Expr { phase },
        Stmt::Return { .. } => FrameKind::Return { phase },
        Stmt::If { .. } => FrameKind::If {
            phase: IfPhase::Test,
        },
        Stmt::While { .. } => FrameKind::While {
            phase: WhilePhase::Test,
        },
        Stmt::Throw { .. } => FrameKind::Throw,
    };

    vm.frames.push(Frame { kind, node: stmt });
}

/* ===================== Step Result ===================== */

/// Result of executing one step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Continue to next step
    Continue,
    /// Execution finished or suspended
    Done,
}
