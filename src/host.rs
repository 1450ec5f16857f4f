//! Timer host
//!
//! A minimal stand-in for the host's asynchronous I/O subsystem, driven by a
//! virtual clock. Scripts call `sleep(ms)` to suspend; the host takes over
//! the suspended thread, wakes it in clock order, and terminates it once it
//! overruns its timeout. `await value` on anything else resolves on the next
//! tick with the value itself.

use std::cell::{Cell, RefCell};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::rc::Rc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::config::HostConfig;
use crate::error::PoolError;
use crate::pool::{CallOutcome, EntryId, ThreadPool, ThreadState};
use crate::vm::errors::{self, ErrorInfo};
use crate::vm::{Interpreter, NativeCall, NativeResult, Val};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum WakeKind {
    /// `sleep` elapsed; resume with the current time
    Timer,
    /// Plain `await`; resume with the awaited value
    Echo,
    /// Deadline passed; terminate
    Timeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Wakeup {
    at: u64,
    seq: u64,
    entry: EntryId,
    kind: WakeKind,
}

#[derive(Debug, Clone, Copy)]
struct SleepRequest {
    entry: EntryId,
    ms: u64,
}

/// Counters for one host run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub resumed: usize,
    pub completed: usize,
    pub failed: usize,
    pub timed_out: usize,
    /// Virtual time at the end of the run
    pub elapsed_ms: u64,
}

pub struct TimerHost {
    clock: Rc<Cell<u64>>,
    requests: Rc<RefCell<Vec<SleepRequest>>>,
    timeout_ms: Option<u64>,

    queue: BinaryHeap<Reverse<Wakeup>>,
    next_seq: u64,
    deadlines: HashMap<EntryId, u64>,
    echoes: HashMap<EntryId, Val>,
    report: RunReport,
}

impl TimerHost {
    pub fn new(config: &HostConfig) -> Self {
        Self {
            clock: Rc::new(Cell::new(0)),
            requests: Rc::new(RefCell::new(Vec::new())),
            timeout_ms: config.timeout_ms,
            queue: BinaryHeap::new(),
            next_seq: 0,
            deadlines: HashMap::new(),
            echoes: HashMap::new(),
            report: RunReport::default(),
        }
    }

    /// Register `sleep(ms)` and `now()` on the interpreter
    pub fn install(&self, interp: &mut Interpreter) {
        let requests = Rc::clone(&self.requests);
        interp.register_native("sleep", move |call: NativeCall| {
            let ms = match call.args.as_slice() {
                // Float to int casts saturate; huge sleeps land on u64::MAX
                [Val::Num(ms)] if *ms >= 0.0 => *ms as u64,
                _ => {
                    return NativeResult::Throw(ErrorInfo::new(
                        errors::WRONG_ARG_TYPE,
                        "sleep() expects one non-negative number of milliseconds",
                    ))
                }
            };
            requests.borrow_mut().push(SleepRequest {
                entry: call.entry,
                ms,
            });
            NativeResult::Suspend(Val::Num(ms as f64))
        });

        let clock = Rc::clone(&self.clock);
        interp.register_native("now", move |_call: NativeCall| {
            NativeResult::Return(Val::Num(clock.get() as f64))
        });
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.get()
    }

    /// Suspended threads the host is currently holding
    pub fn pending(&self) -> usize {
        self.deadlines.len()
    }

    pub fn report(&self) -> RunReport {
        RunReport {
            elapsed_ms: self.now_ms(),
            ..self.report
        }
    }

    /// Start a staged call on `id` and take care of its outcome
    pub fn spawn(
        &mut self,
        pool: &mut ThreadPool<Interpreter>,
        id: EntryId,
        nargs: usize,
    ) -> Result<CallOutcome<Val>, PoolError> {
        if let Some(timeout) = self.timeout_ms {
            self.deadlines.insert(id, self.now_ms().saturating_add(timeout));
        }
        let outcome = pool.call(id, nargs)?;
        self.handle(pool, id, &outcome)?;
        Ok(outcome)
    }

    /// Settle a finished thread, or take ownership of a suspended one
    pub fn handle(
        &mut self,
        pool: &mut ThreadPool<Interpreter>,
        id: EntryId,
        outcome: &CallOutcome<Val>,
    ) -> Result<(), PoolError> {
        match outcome {
            CallOutcome::Completed(_) | CallOutcome::Failed(_) => {
                if outcome.is_completed() {
                    self.report.completed += 1;
                } else {
                    self.report.failed += 1;
                }
                self.deadlines.remove(&id);
                self.echoes.remove(&id);
                pool.settle(id)
            }
            CallOutcome::Suspended(values) => {
                let request = {
                    let mut requests = self.requests.borrow_mut();
                    let found = requests.iter().position(|r| r.entry == id);
                    found.map(|index| requests.remove(index))
                };

                match request {
                    Some(request) => {
                        let at = self.now_ms().saturating_add(request.ms);
                        self.schedule(id, at, WakeKind::Timer)
                    }
                    None => {
                        let value = values.first().cloned().unwrap_or(Val::Null);
                        self.echoes.insert(id, value);
                        self.schedule(id, self.now_ms(), WakeKind::Echo);
                    }
                }
                Ok(())
            }
        }
    }

    /// Wake suspended threads in clock order until none are left
    pub fn run(&mut self, pool: &mut ThreadPool<Interpreter>) -> Result<RunReport, PoolError> {
        while let Some(Reverse(wakeup)) = self.queue.pop() {
            self.clock.set(self.now_ms().max(wakeup.at));

            // Terminated or resumed by someone else in the meantime
            if pool.state(wakeup.entry) != ThreadState::Suspended {
                self.deadlines.remove(&wakeup.entry);
                continue;
            }

            let value = match wakeup.kind {
                WakeKind::Timeout => {
                    warn!(entry = %wakeup.entry, now = self.now_ms(), "script timed out");
                    pool.terminate(wakeup.entry);
                    self.deadlines.remove(&wakeup.entry);
                    self.echoes.remove(&wakeup.entry);
                    self.report.timed_out += 1;
                    continue;
                }
                WakeKind::Timer => Val::Num(self.now_ms() as f64),
                WakeKind::Echo => self.echoes.remove(&wakeup.entry).unwrap_or(Val::Null),
            };

            if let Some(thread) = pool
                .entry_mut(wakeup.entry)
                .and_then(|entry| entry.thread_mut())
            {
                thread.push(value);
            }

            debug!(entry = %wakeup.entry, now = self.now_ms(), "resuming script");
            let outcome = pool.resume(wakeup.entry, 1)?;
            self.report.resumed += 1;
            self.handle(pool, wakeup.entry, &outcome)?;
        }

        Ok(self.report())
    }

    fn schedule(&mut self, entry: EntryId, at: u64, kind: WakeKind) {
        let (at, kind) = match self.deadlines.get(&entry) {
            Some(&deadline) if at > deadline => (deadline, WakeKind::Timeout),
            _ => (at, kind),
        };

        self.next_seq += 1;
        self.queue.push(Reverse(Wakeup {
            at,
            seq: self.next_seq,
            entry,
            kind,
        }));
    }
}
