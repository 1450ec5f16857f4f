//! Shared helpers for pool tests

use std::rc::Rc;

use crate::config::PoolConfig;
use crate::pool::{EntryId, ThreadPool};
use crate::vm::{Interpreter, Script, Val};

pub type Pool = ThreadPool<Interpreter>;

/// Returns `a + b`
pub const ADD: &str = r#"{
    "params": ["a", "b"],
    "body": { "t": "Return", "value": {
        "t": "BinOp", "op": "+",
        "left": { "t": "Ident", "name": "a" },
        "right": { "t": "Ident", "name": "b" }
    }}
}"#;

/// Suspends on "waiting", then returns whatever it was resumed with
pub const ECHO: &str = r#"{
    "body": { "t": "Block", "body": [
        { "t": "Let", "name": "got", "init": { "t": "Await", "inner": { "t": "LitStr", "v": "waiting" } } },
        { "t": "Return", "value": { "t": "Ident", "name": "got" } }
    ]}
}"#;

/// Suspends, then throws
pub const ECHO_THEN_THROW: &str = r#"{
    "body": { "t": "Block", "body": [
        { "t": "Expr", "expr": { "t": "Await", "inner": { "t": "LitNull" } } },
        { "t": "Throw", "value": { "t": "LitStr", "v": "after resume" } }
    ]}
}"#;

/// Throws straight away
pub const FAIL: &str = r#"{
    "body": { "t": "Throw", "value": { "t": "LitStr", "v": "boom" } }
}"#;

pub fn pool(initial: usize, max_idle: usize) -> Pool {
    let config = PoolConfig::default()
        .with_initial_threads(initial)
        .with_max_idle_threads(max_idle);
    ThreadPool::with_config(Interpreter::new(), config).unwrap()
}

/// Load `source` on `id` and stage `args`
pub fn load(pool: &mut Pool, id: EntryId, source: &str, args: &[Val]) {
    let script = Rc::new(Script::from_json(source).expect("Script deserialization failed"));
    let thread = pool.entry_mut(id).unwrap().thread_mut().unwrap();
    thread.load(script);
    for arg in args {
        thread.push(arg.clone());
    }
}

/// Stage one value on a suspended thread
pub fn stage(pool: &mut Pool, id: EntryId, value: Val) {
    pool.entry_mut(id).unwrap().thread_mut().unwrap().push(value);
}

/// Take a thread and start `source` on it
pub fn start(pool: &mut Pool, source: &str) -> EntryId {
    let id = pool.get().unwrap();
    load(pool, id, source, &[]);
    pool.call(id, 0).unwrap();
    id
}
