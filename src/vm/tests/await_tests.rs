//! Tests for suspension and resumption

use super::helpers::{build_vm, run};
use crate::vm::{errors, Control, Interpreter, NativeResult, Val};
use maplit::hashmap;

const AWAIT_TWICE: &str = r#"{
    "t": "Block",
    "body": [
        { "t": "Let", "name": "a", "init": { "t": "Await", "inner": { "t": "LitStr", "v": "first" } } },
        { "t": "Let", "name": "b", "init": { "t": "Await", "inner": { "t": "LitStr", "v": "second" } } },
        { "t": "Return", "value": {
            "t": "BinOp", "op": "+",
            "left": { "t": "Ident", "name": "a" },
            "right": { "t": "Ident", "name": "b" }
        }}
    ]
}"#;

#[test]
fn test_await_suspends_and_resumes() {
    let interp = Interpreter::new();
    let mut vm = build_vm(AWAIT_TWICE, hashmap! {});

    run(&mut vm, &interp);
    assert_eq!(vm.control, Control::Suspend(Val::Str("first".to_string())));
    assert!(vm.is_suspended());

    assert!(vm.resume(Val::Num(1.0)));
    run(&mut vm, &interp);
    assert_eq!(vm.control, Control::Suspend(Val::Str("second".to_string())));
    assert_eq!(vm.env.get("a"), Some(&Val::Num(1.0)));

    assert!(vm.resume(Val::Num(2.0)));
    run(&mut vm, &interp);
    assert_eq!(vm.control, Control::Return(Val::Num(3.0)));
}

#[test]
fn test_resume_requires_suspension() {
    let interp = Interpreter::new();
    let mut vm = build_vm(AWAIT_TWICE, hashmap! {});

    assert!(!vm.resume(Val::Null), "fresh VM is not suspended");

    run(&mut vm, &interp);
    assert!(vm.resume(Val::Null));
    assert!(!vm.resume(Val::Null), "already resumed");
}

#[test]
fn test_suspended_vm_survives_serialization() {
    let interp = Interpreter::new();
    let mut vm = build_vm(AWAIT_TWICE, hashmap! {});
    run(&mut vm, &interp);

    let json = serde_json::to_string(&vm).expect("VM serialization failed");
    let mut vm: crate::vm::VM = serde_json::from_str(&json).expect("VM deserialization failed");

    vm.resume(Val::Str("x".to_string()));
    run(&mut vm, &interp);
    vm.resume(Val::Str("y".to_string()));
    run(&mut vm, &interp);

    assert_eq!(vm.control, Control::Return(Val::Str("xy".to_string())));
}

#[test]
fn test_suspending_native_at_statement_level() {
    let mut interp = Interpreter::new();
    interp.register_native("fetch", |call| NativeResult::Suspend(call.args[0].clone()));

    let program = r#"{
        "t": "Block",
        "body": [
            { "t": "Assign", "name": "out", "expr": { "t": "Call",
                "callee": { "t": "Ident", "name": "fetch" },
                "args": [{ "t": "LitStr", "v": "/status" }]
            }},
            { "t": "Return", "value": { "t": "Ident", "name": "out" } }
        ]
    }"#;
    let mut vm = build_vm(program, hashmap! { "out".to_string() => Val::Null });

    run(&mut vm, &interp);
    assert_eq!(vm.control, Control::Suspend(Val::Str("/status".to_string())));

    vm.resume(Val::Num(200.0));
    run(&mut vm, &interp);
    assert_eq!(vm.control, Control::Return(Val::Num(200.0)));
}

#[test]
fn test_await_inside_loop() {
    let program = r#"{
        "t": "Block",
        "body": [
            { "t": "Let", "name": "i", "init": { "t": "LitNum", "v": 0 } },
            { "t": "While",
              "test": {
                  "t": "BinOp", "op": "<",
                  "left": { "t": "Ident", "name": "i" },
                  "right": { "t": "LitNum", "v": 3 }
              },
              "body": { "t": "Assign", "name": "i", "expr": { "t": "Await", "inner": { "t": "Ident", "name": "i" } } }
            },
            { "t": "Return", "value": { "t": "Ident", "name": "i" } }
        ]
    }"#;
    let interp = Interpreter::new();
    let mut vm = build_vm(program, hashmap! {});

    let mut yielded = vec![];
    run(&mut vm, &interp);
    while let Control::Suspend(Val::Num(n)) = vm.control {
        yielded.push(n);
        vm.resume(Val::Num(n + 1.0));
        run(&mut vm, &interp);
    }

    assert_eq!(yielded, vec![0.0, 1.0, 2.0]);
    assert_eq!(vm.control, Control::Return(Val::Num(3.0)));
}

#[test]
fn test_nested_await_is_rejected() {
    let program = r#"{
        "t": "Block",
        "body": [
            { "t": "Return", "value": {
                "t": "BinOp", "op": "+",
                "left": { "t": "LitNum", "v": 1 },
                "right": { "t": "Await", "inner": { "t": "LitNum", "v": 2 } }
            }}
        ]
    }"#;
    let interp = Interpreter::new();
    let mut vm = build_vm(program, hashmap! {});

    run(&mut vm, &interp);

    let Control::Throw(Val::Error(err)) = vm.control else {
        unreachable!("Expected Control::Throw with Error, got {:?}", vm.control);
    };
    assert_eq!(err.code, errors::AWAIT_NOT_ALLOWED);
}
