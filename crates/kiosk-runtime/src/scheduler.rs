#![forbid(unsafe_code)]

//! Shared tick scheduler (one timer per granularity).
//!
//! Many consumers need periodic wake-ups: the idle timer, auto-advance
//! screens, countdown displays. Rather than each arming its own interval, they
//! register with a [`TickScheduler`], which keeps exactly one ticker per
//! granularity and fans each tick out to every subscriber of that granularity.
//!
//! # How it works
//!
//! 1. `register(granularity, callback)` creates the ticker lazily and arms it
//!    (`next_due = now + granularity`) if it was idle.
//! 2. The host calls [`TickScheduler::pump`] from its event loop. Every ticker
//!    whose deadline has passed fires once, handing all of its subscribers the
//!    same timestamp, then moves its deadline past `now`.
//! 3. `unregister(handle)` removes the subscriber; the last one out destroys
//!    the ticker, so its timer is cleared immediately.
//!
//! # Invariants
//!
//! - At most one ticker exists per granularity.
//! - While running, a ticker is armed iff it has subscribers.
//! - Granularities below [`MIN_GRANULARITY_MS`] are clamped up to it.
//! - A late pump fires each due ticker once, never a burst of catch-up ticks.
//! - A subscriber removed earlier in the same batch is not notified.
//!
//! # Failure Modes
//!
//! - A panicking subscriber is caught, logged, and recorded as a
//!   [`CallbackFault`]. It stays registered and the batch continues.
//! - A subscriber that re-enters `pump` does not receive the nested tick for
//!   itself (its callback is already borrowed); other subscribers do.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use kiosk_core::clock::Clock;
use kiosk_core::event::Millis;
use kiosk_core::fault::{CallbackFault, isolate};

/// Smallest granularity a ticker may run at (about one display frame).
pub const MIN_GRANULARITY_MS: Millis = 16;

type TickFn = Box<dyn FnMut(Millis)>;
type SharedTickFn = Rc<RefCell<TickFn>>;

/// Identifies one registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TickHandle {
    granularity: Millis,
    id: u64,
}

impl TickHandle {
    /// Effective (clamped) granularity of the ticker this handle belongs to.
    #[must_use]
    pub fn granularity(&self) -> Millis {
        self.granularity
    }

    /// Subscriber id, as reported in faults.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }
}

struct Ticker {
    subscribers: Vec<(u64, SharedTickFn)>,
    next_due: Option<Millis>,
    fired: u64,
}

struct SchedulerInner {
    tickers: BTreeMap<Millis, Ticker>,
    next_id: u64,
    running: bool,
    faults: Vec<CallbackFault>,
}

impl SchedulerInner {
    fn is_registered(&self, granularity: Millis, id: u64) -> bool {
        self.tickers
            .get(&granularity)
            .is_some_and(|t| t.subscribers.iter().any(|(sid, _)| *sid == id))
    }
}

/// Owned, injectable tick service.
///
/// Cloning yields another handle to the same scheduler. A new scheduler is
/// running; [`stop`](Self::stop) disarms every ticker without forgetting
/// registrations and [`start`](Self::start) re-arms them.
#[derive(Clone)]
pub struct TickScheduler {
    inner: Rc<RefCell<SchedulerInner>>,
    clock: Rc<dyn Clock>,
}

impl fmt::Debug for TickScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        let tickers: Vec<(Millis, usize, Option<Millis>)> = inner
            .tickers
            .iter()
            .map(|(g, t)| (*g, t.subscribers.len(), t.next_due))
            .collect();
        f.debug_struct("TickScheduler")
            .field("running", &inner.running)
            .field("tickers", &tickers)
            .finish()
    }
}

/// Clamp a requested granularity to the supported floor.
#[must_use]
pub fn clamp_granularity(granularity: Millis) -> Millis {
    granularity.max(MIN_GRANULARITY_MS)
}

impl TickScheduler {
    /// Create a running scheduler reading time from `clock`.
    pub fn new(clock: Rc<dyn Clock>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(SchedulerInner {
                tickers: BTreeMap::new(),
                next_id: 0,
                running: true,
                faults: Vec::new(),
            })),
            clock,
        }
    }

    /// The clock ticks are stamped with.
    #[must_use]
    pub fn clock(&self) -> Rc<dyn Clock> {
        Rc::clone(&self.clock)
    }

    /// Current time according to the scheduler's clock.
    #[must_use]
    pub fn now(&self) -> Millis {
        self.clock.now_ms()
    }

    /// Subscribe `callback` to the ticker for `granularity_ms`.
    pub fn register(&self, granularity_ms: Millis, callback: impl FnMut(Millis) + 'static) -> TickHandle {
        let granularity = clamp_granularity(granularity_ms);
        if granularity != granularity_ms {
            tracing::debug!(requested = granularity_ms, granularity, "granularity clamped");
        }
        let now = self.clock.now_ms();
        let mut inner = self.inner.borrow_mut();
        let id = inner.next_id;
        inner.next_id += 1;
        let running = inner.running;

        let ticker = inner.tickers.entry(granularity).or_insert_with(|| {
            tracing::debug!(granularity, "ticker created");
            Ticker {
                subscribers: Vec::new(),
                next_due: None,
                fired: 0,
            }
        });
        let callback: TickFn = Box::new(callback);
        ticker.subscribers.push((id, Rc::new(RefCell::new(callback))));
        if running && ticker.next_due.is_none() {
            ticker.next_due = Some(now.saturating_add(granularity));
        }

        TickHandle { granularity, id }
    }

    /// Remove a registration. Returns `false` if it was already gone.
    pub fn unregister(&self, handle: TickHandle) -> bool {
        let mut inner = self.inner.borrow_mut();
        let Some(ticker) = inner.tickers.get_mut(&handle.granularity) else {
            return false;
        };
        let before = ticker.subscribers.len();
        ticker.subscribers.retain(|(id, _)| *id != handle.id);
        let removed = ticker.subscribers.len() < before;
        if ticker.subscribers.is_empty() {
            let fired = ticker.fired;
            inner.tickers.remove(&handle.granularity);
            tracing::debug!(granularity = handle.granularity, fired, "ticker destroyed");
        }
        removed
    }

    /// Whether `handle` is still registered.
    #[must_use]
    pub fn is_registered(&self, handle: TickHandle) -> bool {
        self.inner
            .borrow()
            .is_registered(handle.granularity, handle.id)
    }

    /// Re-arm every ticker that has subscribers.
    pub fn start(&self) {
        let now = self.clock.now_ms();
        let mut inner = self.inner.borrow_mut();
        if inner.running {
            return;
        }
        inner.running = true;
        for (g, ticker) in &mut inner.tickers {
            ticker.next_due = Some(now.saturating_add(*g));
        }
        tracing::info!(tickers = inner.tickers.len(), "tick scheduler started");
    }

    /// Disarm every ticker. Registrations are kept.
    pub fn stop(&self) {
        let mut inner = self.inner.borrow_mut();
        if !inner.running {
            return;
        }
        inner.running = false;
        for ticker in inner.tickers.values_mut() {
            ticker.next_due = None;
        }
        tracing::info!(tickers = inner.tickers.len(), "tick scheduler stopped");
    }

    /// Whether the scheduler is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.borrow().running
    }

    /// Fire every due ticker at the clock's current time.
    ///
    /// Returns the number of tickers that fired.
    pub fn pump(&self) -> usize {
        self.pump_at(self.clock.now_ms())
    }

    /// Fire every ticker whose deadline is at or before `now`.
    pub fn pump_at(&self, now: Millis) -> usize {
        let due: Vec<(Millis, Vec<(u64, SharedTickFn)>)> = {
            let mut inner = self.inner.borrow_mut();
            if !inner.running {
                return 0;
            }
            inner
                .tickers
                .iter_mut()
                .filter_map(|(&g, ticker)| {
                    let due_at = ticker.next_due?;
                    if due_at > now {
                        return None;
                    }
                    let periods = (now - due_at) / g + 1;
                    ticker.next_due = Some(due_at.saturating_add(periods.saturating_mul(g)));
                    ticker.fired += 1;
                    Some((g, ticker.subscribers.clone()))
                })
                .collect()
        };

        for (granularity, subscribers) in &due {
            tracing::trace!(granularity, subscribers = subscribers.len(), now, "tick");
            for (id, callback) in subscribers {
                {
                    let inner = self.inner.borrow();
                    if !inner.running {
                        return due.len();
                    }
                    if !inner.is_registered(*granularity, *id) {
                        continue;
                    }
                }
                let Ok(mut f) = callback.try_borrow_mut() else {
                    tracing::warn!(granularity, subscriber = id, "re-entrant tick skipped");
                    continue;
                };
                if let Err(fault) = isolate("tick", *id, || (&mut **f)(now)) {
                    self.inner.borrow_mut().faults.push(fault);
                }
            }
        }
        due.len()
    }

    /// Earliest armed deadline, for hosts that sleep between pumps.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Millis> {
        self.inner
            .borrow()
            .tickers
            .values()
            .filter_map(|t| t.next_due)
            .min()
    }

    /// Number of armed tickers.
    #[must_use]
    pub fn armed_timer_count(&self) -> usize {
        self.inner
            .borrow()
            .tickers
            .values()
            .filter(|t| t.next_due.is_some())
            .count()
    }

    /// Whether the ticker for `granularity_ms` (after clamping) is armed.
    #[must_use]
    pub fn is_armed(&self, granularity_ms: Millis) -> bool {
        self.inner
            .borrow()
            .tickers
            .get(&clamp_granularity(granularity_ms))
            .is_some_and(|t| t.next_due.is_some())
    }

    /// Number of subscribers on the ticker for `granularity_ms`.
    #[must_use]
    pub fn subscriber_count(&self, granularity_ms: Millis) -> usize {
        self.inner
            .borrow()
            .tickers
            .get(&clamp_granularity(granularity_ms))
            .map_or(0, |t| t.subscribers.len())
    }

    /// Granularities that currently have a ticker, ascending.
    #[must_use]
    pub fn granularities(&self) -> Vec<Millis> {
        self.inner.borrow().tickers.keys().copied().collect()
    }

    /// Drain faults caught since the last call.
    pub fn take_faults(&self) -> Vec<CallbackFault> {
        std::mem::take(&mut self.inner.borrow_mut().faults)
    }
}
