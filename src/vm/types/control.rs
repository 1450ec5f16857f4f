//! Control flow and execution frame types

use super::ast::Stmt;
use super::phase::{EvalPhase, IfPhase, WhilePhase};
use super::values::Val;
use serde::{Deserialize, Serialize};

/* ===================== Control Flow ===================== */

/// Control flow state
///
/// When control != None the VM stops stepping statements: Return and Throw
/// unwind the whole stack, Suspend leaves it in place for a later resume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v")]
pub enum Control {
    None,
    Return(Val),
    Throw(Val),
    /// Suspended on this value
    Suspend(Val),
}

/* ===================== Frames ===================== */

/// Frame kind - the type and state of a statement being executed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum FrameKind {
    Block { idx: usize },
    Let { phase: EvalPhase },
    Assign { phase: EvalPhase },
    Expr { phase: EvalPhase },
    Return { phase: EvalPhase },
    If { phase: IfPhase },
    While { phase: WhilePhase },
    Throw,
}

impl FrameKind {
    /// Same frame, parked waiting for a resume value
    pub fn suspended(self) -> Self {
        let phase = EvalPhase::Resume;
        match self {
            FrameKind::Let { .. } => FrameKind::Let { phase },
            FrameKind::Assign { .. } => FrameKind::Assign { phase },
            FrameKind::Expr { .. } => FrameKind::Expr { phase },
            FrameKind::Return { .. } => FrameKind::Return { phase },
            other => other,
        }
    }
}

/// Execution frame - one per active statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// The kind and state of this frame
    #[serde(flatten)]
    pub kind: FrameKind,

    /// The statement this frame represents
    pub node: Stmt,
}

impl Frame {
    /// One-line description for tracebacks
    pub fn describe(&self) -> String {
        match &self.node {
            Stmt::Block { body } => format!("in block of {} statements", body.len()),
            Stmt::Let { name, .. } => format!("in let {}", name),
            Stmt::Assign { name, .. } => format!("in assignment to {}", name),
            Stmt::Expr { .. } => "in expression statement".to_string(),
            Stmt::If { .. } => "in if".to_string(),
            Stmt::While { .. } => "in while".to_string(),
            Stmt::Return { .. } => "in return".to_string(),
            Stmt::Throw { .. } => "in throw".to_string(),
        }
    }
}
