//! Shared helpers for VM tests

use std::collections::HashMap;

use crate::pool::EntryId;
use crate::vm::{run_until_done, Interpreter, Stmt, Val, VM};

/// Deserialize a JSON statement tree and wrap it in a VM
pub fn build_vm(source: &str, env: HashMap<String, Val>) -> VM {
    let program: Stmt = serde_json::from_str(source).expect("Program deserialization failed");
    VM::new(program, env)
}

/// Run a VM against an interpreter's globals and natives
pub fn run(vm: &mut VM, interp: &Interpreter) {
    run_until_done(vm, &interp.context(EntryId::new(0, 0)));
}

/// Build and run a program with the stock interpreter
pub fn run_program(source: &str, env: HashMap<String, Val>) -> VM {
    let mut vm = build_vm(source, env);
    run(&mut vm, &Interpreter::new());
    vm
}
