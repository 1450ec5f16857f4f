//! Core execution loop
//!
//! step() is the heart of the interpreter: it takes the top frame off the
//! stack and hands it to its statement handler.

use super::errors::{self, error_val};
use super::native::ExecContext;
use super::statements::{
    execute_assign, execute_block, execute_expr, execute_if, execute_let, execute_return,
    execute_throw, execute_while,
};
use super::types::{Control, Frame, FrameKind, Stmt};
use super::vm::{Step, VM};

/* ===================== Public API ===================== */

/// Run the VM until it finishes or suspends
///
/// After it returns, inspect `vm.control`: Return, Throw or Suspend.
/// A program that runs off its end leaves `Control::None`.
pub fn run_until_done(vm: &mut VM, ctx: &ExecContext) {
    loop {
        match step(vm, ctx) {
            Step::Continue => continue,
            Step::Done => break,
        }
    }
}

/// Execute one step of the VM
pub fn step(vm: &mut VM, ctx: &ExecContext) -> Step {
    // Active control flow: unwind instead of executing
    if vm.control != Control::None {
        return unwind(vm);
    }

    // No frames left - execution complete
    let Some(Frame { kind, node }) = vm.frames.pop() else {
        return Step::Done;
    };

    match (kind, node) {
        (FrameKind::Block { idx }, Stmt::Block { body }) => execute_block(vm, idx, body),

        (FrameKind::Let { phase }, Stmt::Let { name, init }) => {
            execute_let(vm, ctx, phase, name, init)
        }

        (FrameKind::Assign { phase }, Stmt::Assign { name, expr }) => {
            execute_assign(vm, ctx, phase, name, expr)
        }

        (FrameKind::Expr { phase }, Stmt::Expr { expr }) => execute_expr(vm, ctx, phase, expr),

        (FrameKind::Return { phase }, Stmt::Return { value }) => {
            execute_return(vm, ctx, phase, value)
        }

        (
            FrameKind::If { phase },
            Stmt::If {
                test,
                then_s,
                else_s,
            },
        ) => execute_if(vm, ctx, phase, test, then_s, else_s),

        (FrameKind::While { phase }, Stmt::While { test, body }) => {
            execute_while(vm, ctx, phase, test, body)
        }

        (FrameKind::Throw, Stmt::Throw { value }) => execute_throw(vm, ctx, value),

        // Only reachable with a hand-built or corrupted frame stack
        (kind, node) => {
            vm.control = Control::Throw(error_val(
                errors::INTERNAL_ERROR,
                format!("Frame {:?} does not match statement {:?}", kind, node),
            ));
            Step::Continue
        }
    }
}

/* ===================== Control Flow ===================== */

/// Unwind the stack when control flow is active
fn unwind(vm: &mut VM) -> Step {
    match &vm.control {
        Control::Return(_) => {
            // Return exits the entire program
            vm.frames.clear();
            Step::Done
        }

        Control::Throw(_) => {
            // No try/catch: record where we were and give up
            vm.traceback = vm.frames.iter().rev().map(Frame::describe).collect();
            vm.frames.clear();
            Step::Done
        }

        // Frames stay in place for the resume
        Control::Suspend(_) => Step::Done,

        Control::None => Step::Continue,
    }
}
