//! Tests for calling, resuming and completion callbacks

use std::cell::RefCell;
use std::rc::Rc;

use super::helpers::{load, pool, stage, start, ADD, ECHO, ECHO_THEN_THROW, FAIL};
use crate::error::ContractViolation;
use crate::pool::{CallOutcome, ThreadState};
use crate::vm::Val;

#[test]
fn test_finish_callback_runs_once_with_results() {
    let mut pool = pool(1, 10);
    let id = pool.get().unwrap();
    load(&mut pool, id, ADD, &[Val::Num(20.0), Val::Num(22.0)]);

    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    pool.entry_mut(id).unwrap().on_finish(move |pool, entry, values| {
        assert_eq!(pool.state(entry), ThreadState::Completed);
        sink.borrow_mut().push(values.to_vec());
    });

    let outcome = pool.call(id, 2).unwrap();

    assert_eq!(outcome, CallOutcome::Completed(vec![Val::Num(42.0)]));
    assert_eq!(*seen.borrow(), vec![vec![Val::Num(42.0)]]);
    assert_eq!(pool.state(id), ThreadState::Completed);
    assert_eq!(pool.running(), None);
}

#[test]
fn test_error_callback_receives_message() {
    let mut pool = pool(1, 10);
    let id = pool.get().unwrap();
    load(&mut pool, id, FAIL, &[]);

    let seen = Rc::new(RefCell::new(None));
    let sink = Rc::clone(&seen);
    pool.entry_mut(id)
        .unwrap()
        .on_finish(|_, _, _| panic!("finish callback on failed call"))
        .on_error(move |_, _, err| {
            *sink.borrow_mut() = Some(err.message.clone());
        });

    let outcome = pool.call(id, 0).unwrap();

    assert!(outcome.is_failed());
    assert_eq!(outcome.error().map(|e| e.message.as_str()), Some("boom"));
    assert_eq!(seen.borrow().as_deref(), Some("boom"));
    assert_eq!(pool.state(id), ThreadState::Errored);
}

#[test]
fn test_failure_without_callback_is_reported_in_outcome() {
    let mut pool = pool(1, 10);
    let id = start(&mut pool, FAIL);

    assert_eq!(pool.state(id), ThreadState::Errored);
    pool.settle(id).unwrap();
    assert_eq!(pool.state(id), ThreadState::Dead);
}

#[test]
fn test_suspend_then_resume_to_completion() {
    let mut pool = pool(1, 10);
    let id = pool.get().unwrap();
    load(&mut pool, id, ECHO, &[]);

    let finished = Rc::new(RefCell::new(0));
    let count = Rc::clone(&finished);
    pool.entry_mut(id)
        .unwrap()
        .on_finish(move |_, _, _| *count.borrow_mut() += 1);

    let outcome = pool.call(id, 0).unwrap();
    assert_eq!(
        outcome,
        CallOutcome::Suspended(vec![Val::Str("waiting".to_string())])
    );
    assert_eq!(*finished.borrow(), 0, "no callback on suspension");
    assert_eq!(pool.running(), None);

    stage(&mut pool, id, Val::Str("done".to_string()));
    let outcome = pool.resume(id, 1).unwrap();

    assert_eq!(
        outcome,
        CallOutcome::Completed(vec![Val::Str("done".to_string())])
    );
    assert_eq!(*finished.borrow(), 1);
}

#[test]
fn test_resume_then_error() {
    let mut pool = pool(1, 10);
    let id = start(&mut pool, ECHO_THEN_THROW);
    assert_eq!(pool.state(id), ThreadState::Suspended);

    stage(&mut pool, id, Val::Null);
    let outcome = pool.resume(id, 1).unwrap();

    assert_eq!(
        outcome.error().map(|e| e.message.as_str()),
        Some("after resume")
    );
    assert_eq!(pool.state(id), ThreadState::Errored);
}

#[test]
fn test_resume_requires_suspended_thread() {
    let mut pool = pool(1, 10);
    let id = pool.get().unwrap();

    let err = pool.resume(id, 0).unwrap_err();

    assert!(matches!(
        err.as_contract(),
        Some(ContractViolation::InvalidState { op: "resume", state: ThreadState::Idle, .. })
    ));
}

#[test]
fn test_call_rejects_completed_thread() {
    let mut pool = pool(1, 10);
    let id = pool.get().unwrap();
    load(&mut pool, id, ADD, &[Val::Num(1.0), Val::Num(1.0)]);
    pool.call(id, 2).unwrap();

    assert!(pool.call(id, 0).is_err());
    assert_eq!(pool.state(id), ThreadState::Completed);
}

#[test]
fn test_unbracketed_call_from_callback_is_rejected() {
    let mut pool = pool(2, 10);
    let outer = pool.get().unwrap();
    let inner = pool.get().unwrap();
    load(&mut pool, outer, ADD, &[Val::Num(1.0), Val::Num(1.0)]);
    load(&mut pool, inner, ADD, &[Val::Num(2.0), Val::Num(2.0)]);

    let rejected = Rc::new(RefCell::new(None));
    let sink = Rc::clone(&rejected);
    pool.entry_mut(outer)
        .unwrap()
        .on_finish(move |pool, _, _| {
            let result = pool.call(inner, 2);
            *sink.borrow_mut() = Some(matches!(
                result.as_ref().err().and_then(|e| e.as_contract()),
                Some(ContractViolation::UnbracketedCall { .. })
            ));
        });

    pool.call(outer, 2).unwrap();

    assert_eq!(*rejected.borrow(), Some(true));
    assert_eq!(pool.state(inner), ThreadState::Idle, "inner thread untouched");
}

#[test]
fn test_callback_may_return_its_own_thread() {
    let mut pool = pool(1, 10);
    let id = pool.get().unwrap();
    load(&mut pool, id, ADD, &[Val::Num(1.0), Val::Num(1.0)]);
    pool.entry_mut(id).unwrap().on_finish(|pool, entry, _| {
        pool.return_entry(entry).unwrap();
    });

    pool.call(id, 2).unwrap();

    assert_eq!(pool.state(id), ThreadState::Idle);
    assert!(!pool.entry(id).unwrap().has_finish_callback());
    // Already settled; nothing left to do
    pool.settle(id).unwrap();
    assert_eq!(pool.stats().idle, 1);
}

#[test]
fn test_callback_may_terminate_its_own_thread() {
    let mut pool = pool(1, 10);
    let id = pool.get().unwrap();
    load(&mut pool, id, FAIL, &[]);
    pool.entry_mut(id)
        .unwrap()
        .on_error(|pool, entry, _| pool.terminate(entry));

    let outcome = pool.call(id, 0).unwrap();

    assert!(outcome.is_failed());
    assert_eq!(pool.state(id), ThreadState::Dead);
    assert_eq!(pool.running(), None);
}

#[test]
fn test_payload_survives_suspension() {
    #[derive(Debug, PartialEq)]
    struct Pending {
        request: &'static str,
    }

    let mut pool = pool(1, 10);
    let id = start(&mut pool, ECHO);
    pool.entry_mut(id)
        .unwrap()
        .set_payload(Pending { request: "GET /" });

    let pending = pool.entry_mut(id).unwrap().take_payload::<Pending>();
    assert_eq!(pending, Some(Pending { request: "GET /" }));

    stage(&mut pool, id, Val::Null);
    assert!(pool.resume(id, 1).unwrap().is_completed());
}

#[test]
fn test_reused_entry_does_not_inherit_outer_hook() {
    let mut pool = pool(1, 10);
    let id = pool.get().unwrap();
    load(&mut pool, id, ADD, &[Val::Num(1.0), Val::Num(1.0)]);

    let fired = Rc::new(RefCell::new(0));
    let count = Rc::clone(&fired);
    pool.entry_mut(id).unwrap().on_finish(move |pool, entry, _| {
        *count.borrow_mut() += 1;
        pool.return_entry(entry).unwrap();

        let again = pool.get().unwrap();
        assert_eq!(again, entry);
        load(pool, again, ADD, &[Val::Num(2.0), Val::Num(2.0)]);
        assert!(pool.call_bracketed(again, 2).unwrap().is_completed());
    });

    pool.call(id, 2).unwrap();

    assert_eq!(*fired.borrow(), 1);
    assert_eq!(pool.state(id), ThreadState::Completed);
    assert!(!pool.entry(id).unwrap().has_finish_callback());
}
