#![forbid(unsafe_code)]

//! Time sources.
//!
//! Everything time-derived in the core reads "now" through a [`Clock`] so the
//! host can run on wall time ([`SystemClock`]) while tests and simulators
//! drive a [`ManualClock`] deterministically.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use web_time::{SystemTime, UNIX_EPOCH};

use crate::event::Millis;

/// A source of epoch-millisecond timestamps.
pub trait Clock {
    /// Current time in epoch milliseconds.
    fn now_ms(&self) -> Millis;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> Millis {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0)
    }
}

/// Hand-driven clock. Clones share the same time.
#[derive(Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<Millis>>,
}

impl ManualClock {
    /// Create a clock reading `start`.
    #[must_use]
    pub fn new(start: Millis) -> Self {
        Self {
            now: Rc::new(Cell::new(start)),
        }
    }

    /// Jump to an absolute time. Going backwards is allowed.
    pub fn set(&self, now: Millis) {
        self.now.set(now);
    }

    /// Move forward by `delta` and return the new time.
    pub fn advance(&self, delta: Millis) -> Millis {
        let next = self.now.get().saturating_add(delta);
        self.now.set(next);
        next
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> Millis {
        self.now.get()
    }
}

impl fmt::Debug for ManualClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualClock")
            .field("now", &self.now.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_clones_share_time() {
        let a = ManualClock::new(1_000);
        let b = a.clone();
        assert_eq!(a.advance(250), 1_250);
        assert_eq!(b.now_ms(), 1_250);
        b.set(10);
        assert_eq!(a.now_ms(), 10);
    }

    #[test]
    fn manual_clock_saturates() {
        let c = ManualClock::new(u64::MAX - 1);
        assert_eq!(c.advance(10), u64::MAX);
    }

    #[test]
    fn system_clock_is_past_2020() {
        // 2020-01-01T00:00:00Z
        assert!(SystemClock.now_ms() > 1_577_836_800_000);
    }
}
