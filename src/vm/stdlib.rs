//! Built-in native functions
//!
//! Registered on every interpreter by `Interpreter::new()`.

use tracing::info;

use super::errors::{self, ErrorInfo};
use super::native::{NativeCall, NativeResult};
use super::types::Val;
use super::Interpreter;

/// Register the built-ins on an interpreter
pub fn inject_stdlib(interp: &mut Interpreter) {
    interp.register_native("len", len);
    interp.register_native("str", string);
    interp.register_native("floor", floor);
    interp.register_native("log", log);
}

fn arity(call: &NativeCall, expected: usize) -> Result<(), NativeResult> {
    if call.args.len() == expected {
        Ok(())
    } else {
        Err(NativeResult::Throw(ErrorInfo::new(
            errors::WRONG_ARG_COUNT,
            format!("Expected {} arguments, got {}", expected, call.args.len()),
        )))
    }
}

/// len(list | string | object)
fn len(call: NativeCall) -> NativeResult {
    if let Err(err) = arity(&call, 1) {
        return err;
    }

    let n = match &call.args[0] {
        Val::List(items) => items.len(),
        Val::Str(s) => s.chars().count(),
        Val::Obj(map) => map.len(),
        other => {
            return NativeResult::Throw(ErrorInfo::new(
                errors::WRONG_ARG_TYPE,
                format!("len() is not defined for {}", other.type_name()),
            ))
        }
    };

    NativeResult::Return(Val::Num(n as f64))
}

/// str(value)
fn string(call: NativeCall) -> NativeResult {
    if let Err(err) = arity(&call, 1) {
        return err;
    }
    NativeResult::Return(Val::Str(call.args[0].to_string()))
}

/// floor(number)
fn floor(call: NativeCall) -> NativeResult {
    if let Err(err) = arity(&call, 1) {
        return err;
    }

    match &call.args[0] {
        Val::Num(n) => NativeResult::Return(Val::Num(n.floor())),
        other => NativeResult::Throw(ErrorInfo::new(
            errors::WRONG_ARG_TYPE,
            format!("floor() expects a number, got {}", other.type_name()),
        )),
    }
}

/// log(values...) - writes to the host log
fn log(call: NativeCall) -> NativeResult {
    let line = call
        .args
        .iter()
        .map(Val::to_string)
        .collect::<Vec<_>>()
        .join(" ");
    info!(target: "cadence::script", entry = %call.entry, "{}", line);
    NativeResult::Return(Val::Null)
}
