/*
Discrete-event kernel for the accelerator model.

One simulated cycle is a falling edge followed by a rising edge; nothing in
the design is sensitive to the falling edge, so `tick` models the rising
edge only. Per tick, in deterministic registration order:

  1. every rising-edge method process runs to completion;
  2. every thread process is resumed once (a resume is one wait-to-wait
     step of its state machine);
  3. all staged signal writes commit atomically;
  4. while the committed changes wake signal-sensitive method processes,
     those run and the cycle's staged writes commit again (delta loop).

Processes communicate only through signals, so the per-phase order of two
processes never changes observable behavior; the registration order merely
pins it down.
*/
use std::sync::{Arc, RwLock};

use log::trace;

use crate::base::signal::{CommitSlot, SigValue, Signal, SignalId, SignalState, SlotHandle};

pub type Cycle = u64;

/// A delta loop that fails to settle within this many rounds is a
/// combinational feedback bug in the model, not a long computation.
const DELTA_LIMIT: usize = 1024;

enum Sensitivity {
    RisingEdge,
    Signals(Vec<SignalId>),
}

struct MethodProcess {
    name: String,
    sensitivity: Sensitivity,
    body: Box<dyn FnMut()>,
}

struct ThreadProcess {
    name: String,
    body: Box<dyn FnMut()>,
}

#[derive(Default)]
pub struct Scheduler {
    slots: Vec<Box<dyn CommitSlot>>,
    methods: Vec<MethodProcess>,
    threads: Vec<ThreadProcess>,
    cycle: Cycle,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a signal initialized to `T::default()` and register it for
    /// commit. Signals live for the whole simulation.
    pub fn signal<T: SigValue>(&mut self, name: &str) -> Signal<T> {
        let id = self.slots.len();
        let state = Arc::new(RwLock::new(SignalState {
            name: name.to_string(),
            current: T::default(),
            next: None,
        }));
        self.slots.push(Box::new(SlotHandle(Arc::clone(&state))));
        Signal::new(id, state)
    }

    /// Register a method process run on every rising edge.
    pub fn method_on_edge(&mut self, name: &str, body: impl FnMut() + 'static) {
        self.methods.push(MethodProcess {
            name: name.to_string(),
            sensitivity: Sensitivity::RisingEdge,
            body: Box::new(body),
        });
    }

    /// Register a method process run whenever one of `sensitivity`
    /// commits a changed value.
    pub fn method(&mut self, name: &str, sensitivity: &[SignalId], body: impl FnMut() + 'static) {
        self.methods.push(MethodProcess {
            name: name.to_string(),
            sensitivity: Sensitivity::Signals(sensitivity.to_vec()),
            body: Box::new(body),
        });
    }

    /// Register a thread process. The body is resumed once per rising
    /// edge and must return at every point the modelled process would
    /// `wait()`.
    pub fn thread(&mut self, name: &str, body: impl FnMut() + 'static) {
        self.threads.push(ThreadProcess {
            name: name.to_string(),
            body: Box::new(body),
        });
    }

    pub fn cycle(&self) -> Cycle {
        self.cycle
    }

    /// Advance one cycle.
    pub fn tick(&mut self) {
        self.cycle += 1;

        for method in &mut self.methods {
            if let Sensitivity::RisingEdge = method.sensitivity {
                trace!("cycle {}: method {}", self.cycle, method.name);
                (method.body)();
            }
        }
        for thread in &mut self.threads {
            trace!("cycle {}: thread {}", self.cycle, thread.name);
            (thread.body)();
        }

        let mut changed = self.commit_all();
        let mut deltas = 0;
        while changed.iter().any(|&c| c) {
            deltas += 1;
            assert!(
                deltas <= DELTA_LIMIT,
                "delta cycle limit exceeded at cycle {}",
                self.cycle
            );
            for method in &mut self.methods {
                if let Sensitivity::Signals(ref ids) = method.sensitivity {
                    if ids.iter().any(|&id| changed[id]) {
                        trace!("cycle {} delta {}: method {}", self.cycle, deltas, method.name);
                        (method.body)();
                    }
                }
            }
            changed = self.commit_all();
        }
    }

    /// Advance `cycles` cycles.
    pub fn run(&mut self, cycles: Cycle) {
        for _ in 0..cycles {
            self.tick();
        }
    }

    fn commit_all(&mut self) -> Vec<bool> {
        self.slots.iter().map(|slot| slot.commit()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn methods_run_before_threads_and_reads_see_old_values() {
        let mut sched = Scheduler::new();
        let sig = sched.signal::<u32>("sig");
        let observed = Rc::new(RefCell::new(Vec::new()));

        {
            let sig = sig.clone();
            sched.method_on_edge("writer", move || sig.write(42));
        }
        {
            let sig = sig.clone();
            let observed = Rc::clone(&observed);
            sched.thread("reader", move || observed.borrow_mut().push(sig.read()));
        }

        sched.tick();
        // The thread ran in the same phase as the write: old value.
        assert_eq!(*observed.borrow(), vec![0]);
        sched.tick();
        assert_eq!(*observed.borrow(), vec![0, 42]);
    }

    #[test]
    fn sensitive_method_wakes_only_on_change() {
        let mut sched = Scheduler::new();
        let sig = sched.signal::<u8>("sig");
        let wakeups = Rc::new(RefCell::new(0));

        {
            let wakeups = Rc::clone(&wakeups);
            sched.method("watcher", &[sig.id()], move || *wakeups.borrow_mut() += 1);
        }

        sig.write(1);
        sched.tick();
        assert_eq!(*wakeups.borrow(), 1);

        // Same value again: no change, no wakeup.
        sig.write(1);
        sched.tick();
        assert_eq!(*wakeups.borrow(), 1);

        sig.write(2);
        sched.tick();
        assert_eq!(*wakeups.borrow(), 2);
    }

    #[test]
    fn delta_chain_settles_within_one_tick() {
        let mut sched = Scheduler::new();
        let a = sched.signal::<u8>("a");
        let b = sched.signal::<u8>("b");
        let c = sched.signal::<u8>("c");

        {
            let (a, b) = (a.clone(), b.clone());
            sched.method("a_to_b", &[a.id()], move || b.write(a.read() + 1));
        }
        {
            let (b, c) = (b.clone(), c.clone());
            sched.method("b_to_c", &[b.id()], move || c.write(b.read() + 1));
        }

        a.write(5);
        sched.tick();
        assert_eq!(b.read(), 6);
        assert_eq!(c.read(), 7);
    }
}
