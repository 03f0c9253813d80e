//! One-shot timers on a fixed table of slots.
//!
//! Arming a slot spawns a detached worker that waits on the slot's condition
//! variable until the deadline passes or the slot is cancelled. The callback
//! runs exactly once per armed timer: on expiry, or promptly on
//! cancellation. The callback is invoked with the slot mutex held and must
//! not re-arm its own slot.

use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, warn};

/// Number of slots in a [`TimerTable`].
pub const MAX_NUM_TIMER: usize = 4;

#[derive(Default)]
struct SlotState {
    armed: bool,
    cancelled: bool,
}

#[derive(Default)]
struct Slot {
    state: Mutex<SlotState>,
    expired: Condvar,
}

pub struct TimerTable {
    slots: Vec<Arc<Slot>>,
}

impl TimerTable {
    pub fn new() -> Self {
        Self {
            slots: (0..MAX_NUM_TIMER).map(|_| Arc::new(Slot::default())).collect(),
        }
    }

    /// Arms slot `id` to run `callback` after `duration`. A slot that is
    /// already armed stays untouched.
    pub fn arm<F>(&self, id: usize, duration: Duration, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let slot = Arc::clone(&self.slots[id]);
        {
            let mut state = slot.state.lock().unwrap();
            if state.armed {
                warn!("timer {id} is already armed");
                return;
            }
            state.armed = true;
            state.cancelled = false;
        }

        thread::spawn(move || {
            let deadline = Instant::now() + duration;
            let mut state = slot.state.lock().unwrap();
            loop {
                if state.cancelled {
                    break;
                }
                let now = Instant::now();
                if now >= deadline {
                    break;
                }
                let (next, wait) = slot
                    .expired
                    .wait_timeout(state, deadline - now)
                    .unwrap();
                state = next;
                if wait.timed_out() {
                    break;
                }
            }

            if state.armed {
                state.armed = false;
                debug!("timer {id} fired");
                callback();
            }
        });
    }

    /// Wakes the worker of slot `id`; its callback runs immediately. Nothing
    /// happens if the slot is not armed.
    pub fn cancel(&self, id: usize) {
        let slot = &self.slots[id];
        let mut state = slot.state.lock().unwrap();
        if state.armed {
            debug!("timer {id} cancelled");
            state.cancelled = true;
            slot.expired.notify_one();
        }
    }
}

impl Default for TimerTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn expiry_runs_the_callback_once() {
        let fired = Arc::new(AtomicUsize::new(0));
        let table = TimerTable::new();

        let counter = Arc::clone(&fired);
        table.arm(0, Duration::from_millis(20), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        thread::sleep(Duration::from_millis(200));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cancel_fires_promptly_and_only_once() {
        let fired = Arc::new(AtomicUsize::new(0));
        let table = TimerTable::new();

        let counter = Arc::clone(&fired);
        table.arm(0, Duration::from_secs(60), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        table.cancel(0);

        thread::sleep(Duration::from_millis(200));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cancelling_a_disarmed_slot_does_nothing() {
        let table = TimerTable::new();
        table.cancel(0);

        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        table.arm(1, Duration::from_millis(20), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        table.cancel(2);

        thread::sleep(Duration::from_millis(200));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn arming_an_armed_slot_is_refused() {
        let fired = Arc::new(AtomicUsize::new(0));
        let table = TimerTable::new();

        let counter = Arc::clone(&fired);
        table.arm(0, Duration::from_millis(50), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let counter = Arc::clone(&fired);
        table.arm(0, Duration::from_millis(1), move || {
            counter.fetch_add(10, Ordering::SeqCst);
        });

        thread::sleep(Duration::from_millis(200));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn slots_are_reusable_after_firing() {
        let fired = Arc::new(AtomicUsize::new(0));
        let table = TimerTable::new();

        for _ in 0..2 {
            let counter = Arc::clone(&fired);
            table.arm(0, Duration::from_millis(10), move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
            thread::sleep(Duration::from_millis(100));
        }
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }
}
