//! Statement execution handlers
//!
//! Each handler receives the statement taken off the frame stack. It either
//! finishes the statement, pushes frames for its children, or parks the frame
//! back on the stack when the thread suspends or an error is thrown.

use super::errors::{self, error_val};
use super::expressions::{eval_expr, eval_top, EvalResult};
use super::native::ExecContext;
use super::types::{Control, EvalPhase, Expr, Frame, FrameKind, IfPhase, Stmt, Val, WhilePhase};
use super::vm::{push_stmt, Step, VM};

/* ===================== Helpers ===================== */

/// Evaluate a statement-level expression, or pick up the value delivered by
/// the resume if the frame was parked on it
fn resolve(vm: &mut VM, ctx: &ExecContext, phase: EvalPhase, expr: &Expr) -> EvalResult {
    match phase {
        EvalPhase::Eval => eval_top(expr, &vm.env, ctx),
        EvalPhase::Resume => match vm.resume_value.take() {
            Some(v) => EvalResult::Value { v },
            None => EvalResult::Throw {
                error: error_val(errors::INTERNAL_ERROR, "Frame resumed without a value"),
            },
        },
    }
}

/// Park the frame and stop the VM until it is resumed
fn suspend(vm: &mut VM, frame: Frame, v: Val) -> Step {
    vm.frames.push(Frame {
        kind: frame.kind.suspended(),
        node: frame.node,
    });
    vm.control = Control::Suspend(v);
    Step::Done
}

/// Keep the frame on the stack (for the traceback) and start unwinding
fn raise(vm: &mut VM, frame: Frame, error: Val) -> Step {
    vm.frames.push(frame);
    vm.control = Control::Throw(error);
    Step::Continue
}

/* ===================== Statement Handlers ===================== */

/// Execute Block statement
pub fn execute_block(vm: &mut VM, idx: usize, body: Vec<Stmt>) -> Step {
    // Check if we've finished all statements in the block
    let Some(child) = body.get(idx).cloned() else {
        return Step::Continue;
    };

    // Re-push ourselves pointing at the next statement, then the child on top
    vm.frames.push(Frame {
        kind: FrameKind::Block { idx: idx + 1 },
        node: Stmt::Block { body },
    });
    push_stmt(vm, child);

    Step::Continue
}

/// Execute Let statement
pub fn execute_let(
    vm: &mut VM,
    ctx: &ExecContext,
    phase: EvalPhase,
    name: String,
    init: Option<Expr>,
) -> Step {
    let result = match &init {
        Some(expr) => resolve(vm, ctx, phase, expr),
        None => EvalResult::Value { v: Val::Null },
    };

    let frame = |name, init| Frame {
        kind: FrameKind::Let { phase },
        node: Stmt::Let { name, init },
    };

    match result {
        EvalResult::Value { v } => {
            vm.env.insert(name, v);
            Step::Continue
        }
        EvalResult::Suspend { v } => suspend(vm, frame(name, init), v),
        EvalResult::Throw { error } => raise(vm, frame(name, init), error),
    }
}

/// Execute Assign statement
pub fn execute_assign(
    vm: &mut VM,
    ctx: &ExecContext,
    phase: EvalPhase,
    name: String,
    expr: Expr,
) -> Step {
    let frame = |name, expr| Frame {
        kind: FrameKind::Assign { phase },
        node: Stmt::Assign { name, expr },
    };

    if !vm.env.contains_key(&name) {
        let error = error_val(
            errors::UNDEFINED_VARIABLE,
            format!("Cannot assign to undeclared variable '{}'", name),
        );
        return raise(vm, frame(name, expr), error);
    }

    match resolve(vm, ctx, phase, &expr) {
        EvalResult::Value { v } => {
            vm.env.insert(name, v);
            Step::Continue
        }
        EvalResult::Suspend { v } => suspend(vm, frame(name, expr), v),
        EvalResult::Throw { error } => raise(vm, frame(name, expr), error),
    }
}

/// Execute Expr statement (value is discarded)
pub fn execute_expr(vm: &mut VM, ctx: &ExecContext, phase: EvalPhase, expr: Expr) -> Step {
    let frame = |expr| Frame {
        kind: FrameKind::Expr { phase },
        node: Stmt::Expr { expr },
    };

    match resolve(vm, ctx, phase, &expr) {
        EvalResult::Value { .. } => Step::Continue,
        EvalResult::Suspend { v } => suspend(vm, frame(expr), v),
        EvalResult::Throw { error } => raise(vm, frame(expr), error),
    }
}

/// Execute Return statement
pub fn execute_return(
    vm: &mut VM,
    ctx: &ExecContext,
    phase: EvalPhase,
    value: Option<Expr>,
) -> Step {
    let result = match &value {
        Some(expr) => resolve(vm, ctx, phase, expr),
        None => EvalResult::Value { v: Val::Null },
    };

    let frame = |value| Frame {
        kind: FrameKind::Return { phase },
        node: Stmt::Return { value },
    };

    match result {
        EvalResult::Value { v } => {
            // Unwinding clears the remaining frames
            vm.control = Control::Return(v);
            Step::Continue
        }
        EvalResult::Suspend { v } => suspend(vm, frame(value), v),
        EvalResult::Throw { error } => raise(vm, frame(value), error),
    }
}

/// Execute If statement
pub fn execute_if(
    vm: &mut VM,
    ctx: &ExecContext,
    phase: IfPhase,
    test: Expr,
    then_s: Box<Stmt>,
    else_s: Option<Box<Stmt>>,
) -> Step {
    match phase {
        IfPhase::Test => {
            let test_val = eval_expr(&test, &vm.env, ctx);
            let node = Stmt::If {
                test,
                then_s: then_s.clone(),
                else_s: else_s.clone(),
            };

            let branch = match test_val {
                EvalResult::Value { v } if v.is_truthy() => Some(*then_s),
                EvalResult::Value { .. } => else_s.map(|s| *s),
                EvalResult::Throw { error } => {
                    let frame = Frame {
                        kind: FrameKind::If { phase },
                        node,
                    };
                    return raise(vm, frame, error);
                }
                // eval_expr never suspends
                EvalResult::Suspend { .. } => None,
            };

            if let Some(branch) = branch {
                vm.frames.push(Frame {
                    kind: FrameKind::If {
                        phase: IfPhase::Branch,
                    },
                    node,
                });
                push_stmt(vm, branch);
            }
            Step::Continue
        }

        // Branch finished
        IfPhase::Branch => Step::Continue,
    }
}

/// Execute While statement
pub fn execute_while(
    vm: &mut VM,
    ctx: &ExecContext,
    phase: WhilePhase,
    test: Expr,
    body: Box<Stmt>,
) -> Step {
    match phase {
        WhilePhase::Test => match eval_expr(&test, &vm.env, ctx) {
            EvalResult::Value { v } if v.is_truthy() => {
                let iteration = (*body).clone();
                vm.frames.push(Frame {
                    kind: FrameKind::While {
                        phase: WhilePhase::Body,
                    },
                    node: Stmt::While { test, body },
                });
                push_stmt(vm, iteration);
                Step::Continue
            }
            EvalResult::Throw { error } => {
                let frame = Frame {
                    kind: FrameKind::While { phase },
                    node: Stmt::While { test, body },
                };
                raise(vm, frame, error)
            }
            // Falsy test ends the loop; eval_expr never suspends
            EvalResult::Value { .. } | EvalResult::Suspend { .. } => Step::Continue,
        },

        // Body finished, test again
        WhilePhase::Body => {
            vm.frames.push(Frame {
                kind: FrameKind::While {
                    phase: WhilePhase::Test,
                },
                node: Stmt::While { test, body },
            });
            Step::Continue
        }
    }
}

/// Execute Throw statement
pub fn execute_throw(vm: &mut VM, ctx: &ExecContext, value: Expr) -> Step {
    let error = match eval_expr(&value, &vm.env, ctx) {
        EvalResult::Value { v } => v,
        EvalResult::Throw { error } => error,
        EvalResult::Suspend { v } => v,
    };

    let frame = Frame {
        kind: FrameKind::Throw,
        node: Stmt::Throw { value },
    };
    raise(vm, frame, error)
}
