//! Expression evaluation
//!
//! Expressions are evaluated in one go. The only way an expression stops
//! half-way is by suspending, and that is allowed only at statement level
//! (the whole right-hand side of a let/assign/return/expression statement),
//! so a resumed frame never has to re-evaluate anything.

use std::collections::HashMap;

use super::errors::{self, error_val};
use super::native::{ExecContext, NativeCall, NativeResult};
use super::types::{BinOp, Expr, Val};

/// Result of evaluating an expression
#[derive(Debug, Clone, PartialEq)]
pub enum EvalResult {
    /// Expression produced a value
    Value { v: Val },
    /// Expression asked to suspend the thread, yielding `v`
    Suspend { v: Val },
    /// Expression threw an error
    Throw { error: Val },
}

/// Unwrap a value or bail out with the suspend/throw result
macro_rules! value_or_return {
    ($result:expr) => {
        match $result {
            EvalResult::Value { v } => v,
            other => return other,
        }
    };
}

fn throw(code: &str, message: impl Into<String>) -> EvalResult {
    EvalResult::Throw {
        error: error_val(code, message),
    }
}

/// Evaluate a statement-level expression, where suspension is allowed
pub fn eval_top(expr: &Expr, env: &HashMap<String, Val>, ctx: &ExecContext) -> EvalResult {
    eval(expr, env, ctx, true)
}

/// Evaluate a nested expression; suspension raises `AWAIT_NOT_ALLOWED`
pub fn eval_expr(expr: &Expr, env: &HashMap<String, Val>, ctx: &ExecContext) -> EvalResult {
    eval(expr, env, ctx, false)
}

fn eval(expr: &Expr, env: &HashMap<String, Val>, ctx: &ExecContext, top: bool) -> EvalResult {
    match expr {
        Expr::LitNull => EvalResult::Value { v: Val::Null },

        Expr::LitBool { v } => EvalResult::Value { v: Val::Bool(*v) },

        Expr::LitNum { v } => EvalResult::Value { v: Val::Num(*v) },

        Expr::LitStr { v } => EvalResult::Value {
            v: Val::Str(v.clone()),
        },

        Expr::LitList { items } => {
            let mut values = Vec::with_capacity(items.len());
            for item in items {
                values.push(value_or_return!(eval_expr(item, env, ctx)));
            }
            EvalResult::Value {
                v: Val::List(values),
            }
        }

        Expr::LitObj { props } => {
            let mut map = HashMap::with_capacity(props.len());
            for (key, item) in props {
                map.insert(key.clone(), value_or_return!(eval_expr(item, env, ctx)));
            }
            EvalResult::Value { v: Val::Obj(map) }
        }

        Expr::Ident { name } => match env.get(name).or_else(|| ctx.globals.get(name)) {
            Some(v) => EvalResult::Value { v: v.clone() },
            None => throw(
                errors::UNDEFINED_VARIABLE,
                format!("Variable '{}' is not defined", name),
            ),
        },

        Expr::Member { object, property } => {
            let object = value_or_return!(eval_expr(object, env, ctx));
            match object {
                Val::Obj(map) => match map.get(property) {
                    Some(v) => EvalResult::Value { v: v.clone() },
                    None => throw(
                        errors::PROPERTY_NOT_FOUND,
                        format!("Property '{}' not found", property),
                    ),
                },
                other => throw(
                    errors::TYPE_ERROR,
                    format!(
                        "Cannot read property '{}' of {}",
                        property,
                        other.type_name()
                    ),
                ),
            }
        }

        Expr::Call { callee, args } => {
            let callee = value_or_return!(eval_expr(callee, env, ctx));
            let name = match callee {
                Val::Func(name) => name,
                other => {
                    return throw(
                        errors::NOT_CALLABLE,
                        format!("Value of type {} is not callable", other.type_name()),
                    );
                }
            };

            let mut values = Vec::with_capacity(args.len());
            for arg in args {
                values.push(value_or_return!(eval_expr(arg, env, ctx)));
            }

            let Some(native) = ctx.natives.get(&name) else {
                return throw(
                    errors::UNKNOWN_FUNCTION,
                    format!("Function '{}' is not registered", name),
                );
            };

            let call = NativeCall {
                entry: ctx.entry,
                args: values,
            };
            match native(call) {
                NativeResult::Return(v) => EvalResult::Value { v },
                NativeResult::Throw(error) => EvalResult::Throw {
                    error: Val::Error(error),
                },
                NativeResult::Suspend(v) if top => EvalResult::Suspend { v },
                NativeResult::Suspend(_) => throw(
                    errors::AWAIT_NOT_ALLOWED,
                    format!("'{}' suspends and may only be called at statement level", name),
                ),
            }
        }

        Expr::Await { inner } => {
            if !top {
                return throw(
                    errors::AWAIT_NOT_ALLOWED,
                    "await is only allowed at statement level",
                );
            }
            let v = value_or_return!(eval_expr(inner, env, ctx));
            EvalResult::Suspend { v }
        }

        Expr::BinOp { op, left, right } => eval_binop(*op, left, right, env, ctx),

        Expr::Not { expr } => {
            let v = value_or_return!(eval_expr(expr, env, ctx));
            EvalResult::Value {
                v: Val::Bool(!v.is_truthy()),
            }
        }
    }
}

fn eval_binop(
    op: BinOp,
    left: &Expr,
    right: &Expr,
    env: &HashMap<String, Val>,
    ctx: &ExecContext,
) -> EvalResult {
    let lhs = value_or_return!(eval_expr(left, env, ctx));

    // Short-circuit before touching the right side
    match op {
        BinOp::And if !lhs.is_truthy() => return EvalResult::Value { v: Val::Bool(false) },
        BinOp::Or if lhs.is_truthy() => return EvalResult::Value { v: Val::Bool(true) },
        _ => {}
    }

    let rhs = value_or_return!(eval_expr(right, env, ctx));

    let v = match (op, &lhs, &rhs) {
        (BinOp::And | BinOp::Or, _, _) => Val::Bool(rhs.is_truthy()),

        (BinOp::Eq, _, _) => Val::Bool(lhs == rhs),
        (BinOp::Ne, _, _) => Val::Bool(lhs != rhs),

        (BinOp::Add, Val::Num(a), Val::Num(b)) => Val::Num(a + b),
        (BinOp::Add, Val::Str(a), b) => Val::Str(format!("{}{}", a, b)),
        (BinOp::Add, a, Val::Str(b)) => Val::Str(format!("{}{}", a, b)),
        (BinOp::Sub, Val::Num(a), Val::Num(b)) => Val::Num(a - b),
        (BinOp::Mul, Val::Num(a), Val::Num(b)) => Val::Num(a * b),
        (BinOp::Div, Val::Num(_), Val::Num(b)) if *b == 0.0 => {
            return throw(errors::DIVISION_BY_ZERO, "Division by zero");
        }
        (BinOp::Div, Val::Num(a), Val::Num(b)) => Val::Num(a / b),

        (BinOp::Lt, Val::Num(a), Val::Num(b)) => Val::Bool(a < b),
        (BinOp::Le, Val::Num(a), Val::Num(b)) => Val::Bool(a <= b),
        (BinOp::Gt, Val::Num(a), Val::Num(b)) => Val::Bool(a > b),
        (BinOp::Ge, Val::Num(a), Val::Num(b)) => Val::Bool(a >= b),
        (BinOp::Lt, Val::Str(a), Val::Str(b)) => Val::Bool(a < b),
        (BinOp::Le, Val::Str(a), Val::Str(b)) => Val::Bool(a <= b),
        (BinOp::Gt, Val::Str(a), Val::Str(b)) => Val::Bool(a > b),
        (BinOp::Ge, Val::Str(a), Val::Str(b)) => Val::Bool(a >= b),

        _ => {
            return throw(
                errors::TYPE_ERROR,
                format!(
                    "Operator {:?} is not defined for {} and {}",
                    op,
                    lhs.type_name(),
                    rhs.type_name()
                ),
            );
        }
    };

    EvalResult::Value { v }
}
