// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Expiry Scheduler
//!
//! Cancellable, self-rescheduling delay timer — one per live correlation
//! group, no fixed-rate polling. The timer thread sleeps on a condvar with
//! timeout so cancellation wakes it immediately; on firing it invokes the
//! sweep callback, which either returns the next delay (computed from the
//! oldest surviving item) or `None` to let the thread exit.
//!
//! Each item is therefore evicted within one timeout window of its
//! arrival, with at most one extra wake-up per eviction batch.

use log::error;
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

struct TimerState {
    cancelled: Mutex<bool>,
    signal: Condvar,
}

/// Handle to one group's expiry timer.
///
/// Dropping the handle does not cancel the timer; cancellation is explicit
/// so it can be tied atomically to group removal.
pub struct ExpiryTimer {
    state: Arc<TimerState>,
}

impl ExpiryTimer {
    /// Arm a timer that fires after `initial`, then re-arms with whatever
    /// delay `on_fire` returns until it returns `None` or the timer is
    /// cancelled.
    pub fn spawn<F>(initial: Duration, mut on_fire: F) -> Self
    where
        F: FnMut() -> Option<Duration> + Send + 'static,
    {
        let state = Arc::new(TimerState {
            cancelled: Mutex::new(false),
            signal: Condvar::new(),
        });
        let thread_state = Arc::clone(&state);

        thread::spawn(move || {
            let mut delay = initial;
            loop {
                if !wait_for(&thread_state, delay) {
                    return;
                }
                match on_fire() {
                    Some(next) => delay = next,
                    None => return,
                }
            }
        });

        Self { state }
    }

    /// Cancel the timer, waking the thread if it is mid-wait. Idempotent.
    pub fn cancel(&self) {
        match self.state.cancelled.lock() {
            Ok(mut cancelled) => {
                *cancelled = true;
                self.state.signal.notify_all();
            }
            Err(e) => error!("expiry timer state poisoned during cancel: {}", e),
        }
    }
}

impl std::fmt::Debug for ExpiryTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpiryTimer").finish()
    }
}

/// Sleep for `delay` unless cancelled first. Returns false on cancellation.
fn wait_for(state: &TimerState, delay: Duration) -> bool {
    let deadline = Instant::now() + delay;
    let mut cancelled = match state.cancelled.lock() {
        Ok(guard) => guard,
        Err(e) => {
            error!("expiry timer state poisoned during wait: {}", e);
            return false;
        }
    };
    while !*cancelled {
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        cancelled = match state.signal.wait_timeout(cancelled, deadline - now) {
            Ok((guard, _)) => guard,
            Err(e) => {
                error!("expiry timer state poisoned during wait: {}", e);
                return false;
            }
        };
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_timer_fires_after_delay() {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let _timer = ExpiryTimer::spawn(Duration::from_millis(20), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            None
        });

        thread::sleep(Duration::from_millis(120));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_timer_reschedules_with_returned_delay() {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let _timer = ExpiryTimer::spawn(Duration::from_millis(10), move || {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            if n < 3 {
                Some(Duration::from_millis(10))
            } else {
                None
            }
        });

        thread::sleep(Duration::from_millis(200));
        assert_eq!(fired.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_cancel_prevents_firing() {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let timer = ExpiryTimer::spawn(Duration::from_millis(80), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            None
        });

        timer.cancel();
        thread::sleep(Duration::from_millis(160));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let timer = ExpiryTimer::spawn(Duration::from_millis(10), || None);
        timer.cancel();
        timer.cancel();
    }

    #[test]
    fn test_zero_delay_fires_immediately() {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let _timer = ExpiryTimer::spawn(Duration::ZERO, move || {
            counter.fetch_add(1, Ordering::SeqCst);
            None
        });

        thread::sleep(Duration::from_millis(60));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
