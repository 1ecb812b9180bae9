//! Single-slot latest-value cells.
//!
//! A [`LatestSlot`] holds only the most recent value; publishing overwrites
//! whatever was there without queueing. This is the hand-off primitive
//! between every producer/consumer pair in the stack: datagram receiver to
//! collector, sampler to streamer. Consumers either take (consume) or wait
//! with a bounded timeout; there is no unbounded park, so a worker always
//! gets back to its stop flag.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// Interior state: the value plus a monotonically increasing generation.
struct State<T> {
    value: Option<T>,
    generation: u64,
}

/// A single-slot latest-value cell.
pub struct LatestSlot<T> {
    state: Mutex<State<T>>,
    changed: Condvar,
}

impl<T> LatestSlot<T> {
    /// Create an empty slot.
    pub fn new() -> Self {
        Self { state: Mutex::new(State { value: None, generation: 0 }), changed: Condvar::new() }
    }

    /// Overwrite the slot with a new value and wake any waiter.
    pub fn publish(&self, value: T) {
        let mut state = self.state.lock();
        state.value = Some(value);
        state.generation += 1;
        drop(state);
        self.changed.notify_all();
    }

    /// Remove and return the current value, if any.
    ///
    /// The generation is untouched, so a waiter keyed on generations still
    /// sees the publish that filled the slot.
    pub fn take(&self) -> Option<T> {
        self.state.lock().value.take()
    }

    /// Generation of the most recent publish (0 before the first).
    pub fn generation(&self) -> u64 {
        self.state.lock().generation
    }
}

impl<T: Clone> LatestSlot<T> {
    /// Clone out the current value without consuming it.
    pub fn peek(&self) -> Option<T> {
        self.state.lock().value.clone()
    }

    /// Wait up to `timeout` for a publish newer than `seen`.
    ///
    /// Returns the value together with its generation so the caller can
    /// thread the cursor through successive waits. `None` means the
    /// deadline elapsed first (or the newer value was already taken).
    pub fn wait_newer(&self, seen: u64, timeout: Duration) -> Option<(T, u64)> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while state.generation <= seen {
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            if self.changed.wait_for(&mut state, deadline - now).timed_out() {
                break;
            }
        }
        if state.generation > seen {
            let generation = state.generation;
            return state.value.clone().map(|value| (value, generation));
        }
        None
    }
}

impl<T> Default for LatestSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}
