//! Tests for call brackets around reentrant calls

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use super::helpers::{load, pool, ADD, ECHO};
use crate::engine::Engine;
use crate::error::ContractViolation;
use crate::pool::{EntryId, ThreadState};
use crate::vm::Val;

#[test]
fn test_nested_brackets_restore_in_reverse() {
    let mut pool = pool(3, 10);
    let ids: Vec<EntryId> = (0..3).map(|_| pool.get().unwrap()).collect();

    let mut brackets = Vec::new();
    for id in &ids {
        pool.set_running(Some(*id));
        brackets.push(pool.prepare_callback());
    }
    assert_eq!(pool.open_brackets(), 3);

    while let Some(bracket) = brackets.pop() {
        let previous = bracket.previous_running();
        pool.restore_callback(bracket).unwrap();
        assert_eq!(pool.running(), previous);
    }

    assert_eq!(pool.open_brackets(), 0);
    assert_eq!(pool.running(), Some(ids[0]));
}

#[test]
fn test_out_of_order_restore_is_rejected() {
    let mut pool = pool(1, 10);
    let id = pool.get().unwrap();
    pool.set_running(Some(id));

    let outer = pool.prepare_callback();
    pool.set_running(None);
    let inner = pool.prepare_callback();

    let err = pool.restore_callback(outer).unwrap_err();
    assert!(matches!(
        err.as_contract(),
        Some(ContractViolation::BracketOrder { .. })
    ));
    assert_eq!(pool.open_brackets(), 2, "pool left as it was");
    assert_eq!(pool.running(), None);

    pool.restore_callback(inner).unwrap();
    assert_eq!(pool.open_brackets(), 1);
}

#[test]
fn test_bracketed_call_from_callback_keeps_outer_running() {
    let mut pool = pool(2, 10);
    let outer = pool.get().unwrap();
    let inner = pool.get().unwrap();
    load(&mut pool, outer, ADD, &[Val::Num(1.0), Val::Num(1.0)]);
    load(&mut pool, inner, ADD, &[Val::Num(2.0), Val::Num(2.0)]);

    let observed = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&observed);
    pool.entry_mut(outer)
        .unwrap()
        .on_finish(move |pool, entry, _| {
            assert_eq!(pool.running(), Some(entry));

            let bracket = pool.prepare_callback();
            let outcome = pool.call(inner, 2).unwrap();
            pool.restore_callback(bracket).unwrap();

            sink.borrow_mut().push((outcome, pool.running()));
        });

    pool.call(outer, 2).unwrap();

    let observed = observed.borrow();
    assert_eq!(observed.len(), 1);
    assert!(observed[0].0.is_completed());
    assert_eq!(observed[0].1, Some(outer));
    assert_eq!(pool.state(inner), ThreadState::Completed);
    assert_eq!(pool.running(), None);
}

#[test]
fn test_call_bracketed_helper() {
    let mut pool = pool(2, 10);
    let outer = pool.get().unwrap();
    let inner = pool.get().unwrap();
    load(&mut pool, outer, ADD, &[Val::Num(1.0), Val::Num(1.0)]);
    load(&mut pool, inner, ECHO, &[]);

    let suspended = Rc::new(Cell::new(false));
    let flag = Rc::clone(&suspended);
    pool.entry_mut(outer).unwrap().on_finish(move |pool, entry, _| {
        let outcome = pool.call_bracketed(inner, 0).unwrap();
        flag.set(outcome.is_suspended());
        assert_eq!(pool.running(), Some(entry));
        assert_eq!(pool.open_brackets(), 0);
    });

    pool.call(outer, 2).unwrap();

    assert!(suspended.get());
    assert_eq!(pool.state(inner), ThreadState::Suspended);
}

#[test]
fn test_callback_scope_restores_on_drop() {
    let mut pool = pool(1, 10);
    let id = pool.get().unwrap();
    pool.set_running(Some(id));

    {
        let mut scope = pool.enter_callback();
        scope.set_running(None);
        assert_eq!(scope.open_brackets(), 1);
    }

    assert_eq!(pool.open_brackets(), 0);
    assert_eq!(pool.running(), Some(id));
}

#[test]
fn test_restore_truncates_engine_stack() {
    let mut pool = pool(1, 10);
    pool.engine_mut().push_scratch(Val::Num(1.0));

    let bracket = pool.prepare_callback();
    pool.engine_mut().push_scratch(Val::Num(2.0));
    pool.engine_mut().push_scratch(Val::Num(3.0));
    assert_eq!(pool.engine().stack_marker(), 3);

    pool.restore_callback(bracket).unwrap();

    assert_eq!(pool.engine().scratch_len(), 1);
}

#[test]
fn test_bracket_serials_are_unique() {
    let mut pool = pool(1, 10);

    let a = pool.prepare_callback();
    let b = pool.prepare_callback();
    assert_ne!(a.serial(), b.serial());

    pool.restore_callback(b).unwrap();
    pool.restore_callback(a).unwrap();
}

#[test]
fn test_top_level_bracket_does_not_cover_callbacks() {
    let mut pool = pool(2, 10);
    let outer = pool.get().unwrap();
    let inner = pool.get().unwrap();
    load(&mut pool, outer, ADD, &[Val::Num(1.0), Val::Num(1.0)]);
    load(&mut pool, inner, ADD, &[Val::Num(2.0), Val::Num(2.0)]);

    let observed = Rc::new(RefCell::new(None));
    let sink = Rc::clone(&observed);
    pool.entry_mut(outer)
        .unwrap()
        .on_finish(move |pool, entry, _| {
            let result = pool.call(inner, 2);
            let rejected = matches!(
                result.as_ref().err().and_then(|e| e.as_contract()),
                Some(ContractViolation::UnbracketedCall { .. })
            );
            *sink.borrow_mut() = Some((rejected, pool.running() == Some(entry)));
        });

    let outcome = pool.call_bracketed(outer, 2).unwrap();

    assert!(outcome.is_completed());
    assert_eq!(*observed.borrow(), Some((true, true)));
    assert_eq!(pool.state(inner), ThreadState::Idle);
    assert_eq!(pool.open_brackets(), 0);
}

#[test]
fn test_orphaned_bracket_does_not_cover_callbacks() {
    let mut pool = pool(2, 10);
    let outer = pool.get().unwrap();
    let inner = pool.get().unwrap();

    // Misordered restore leaves the first bracket open for good
    let first = pool.prepare_callback();
    let second = pool.prepare_callback();
    assert!(pool.restore_callback(first).is_err());
    pool.restore_callback(second).unwrap();
    assert_eq!(pool.open_brackets(), 1);

    load(&mut pool, outer, ADD, &[Val::Num(1.0), Val::Num(1.0)]);
    load(&mut pool, inner, ADD, &[Val::Num(2.0), Val::Num(2.0)]);

    let rejected = Rc::new(Cell::new(false));
    let flag = Rc::clone(&rejected);
    pool.entry_mut(outer).unwrap().on_finish(move |pool, _, _| {
        flag.set(pool.call(inner, 2).is_err());
    });

    pool.call(outer, 2).unwrap();

    assert!(rejected.get());
    assert_eq!(pool.state(inner), ThreadState::Idle);
}

#[test]
fn test_bracket_left_open_by_callback_is_discarded() {
    let mut pool = pool(3, 10);
    let first = pool.get().unwrap();
    let second = pool.get().unwrap();
    let inner = pool.get().unwrap();
    for id in [first, second, inner] {
        load(&mut pool, id, ADD, &[Val::Num(1.0), Val::Num(1.0)]);
    }

    pool.entry_mut(first).unwrap().on_finish(|pool, _, _| {
        drop(pool.prepare_callback());
    });
    pool.call(first, 2).unwrap();
    assert_eq!(pool.open_brackets(), 0);

    // The leaked bracket must not let the next callback call unbracketed
    let rejected = Rc::new(Cell::new(false));
    let flag = Rc::clone(&rejected);
    pool.entry_mut(second).unwrap().on_finish(move |pool, _, _| {
        flag.set(pool.call(inner, 2).is_err());
    });
    pool.call(second, 2).unwrap();

    assert!(rejected.get());
    assert_eq!(pool.state(inner), ThreadState::Idle);
}

#[test]
#[cfg(debug_assertions)]
#[should_panic(expected = "callback scope restored out of order")]
fn test_callback_scope_asserts_on_misordered_restore() {
    let mut pool = pool(1, 10);

    let mut scope = pool.enter_callback();
    // Never restored, so the scope's own bracket is no longer innermost
    let _stray = scope.prepare_callback();
}
