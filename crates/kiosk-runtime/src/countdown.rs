#![forbid(unsafe_code)]

//! Countdown engine on top of the shared tick scheduler.
//!
//! A countdown is an anchor (`start`) plus a duration. Every tick recomputes
//!
//! ```text
//! remaining = clamp(duration - (now - start), 0, duration)
//! ```
//!
//! rather than decrementing a counter, so late or skipped ticks never make
//! the displayed value drift.
//!
//! # Invariants
//!
//! 1. `remaining_ms` never increases within a cycle and equals the duration
//!    right after a reset.
//! 2. `on_timeout` fires exactly once per cycle, no matter how many ticks
//!    observe zero or how many resets land inside one tick period.
//! 3. With `restart_on_timeout`, the engine re-anchors in the same tick; no
//!    zero-remaining snapshot is emitted for that cycle.
//! 4. With [`Precision::Seconds`], `on_change` fires only when the displayed
//!    whole-second value changes.
//! 5. A disabled or stopped engine holds no tick registration.
//!
//! # Re-entrancy
//!
//! Callbacks run with no internal borrow held: `on_timeout` and `on_change`
//! may reset or stop the countdown through a [`CountdownControl`]. A callback
//! that triggers itself (e.g. `on_change` resetting, which emits again) is
//! not re-invoked recursively.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use kiosk_core::activity::{ActivitySubscription, UserActivityBroadcaster};
use kiosk_core::event::{InputKind, Millis};
use serde::{Deserialize, Serialize};

use crate::scheduler::{TickHandle, TickScheduler};

/// Duration used when a countdown is configured with zero length.
pub const DEFAULT_COUNTDOWN_MS: Millis = 60_000;

/// Tick granularity for [`Precision::Seconds`] countdowns.
pub const DEFAULT_SECONDS_GRANULARITY_MS: Millis = 250;

/// Tick granularity for [`Precision::Milliseconds`] countdowns.
pub const DEFAULT_MILLIS_GRANULARITY_MS: Millis = 50;

/// How often a countdown reports changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Precision {
    /// Report every tick.
    #[serde(rename = "ms")]
    Milliseconds,
    /// Report only when the whole-second value changes.
    #[default]
    #[serde(rename = "s")]
    Seconds,
}

/// Countdown configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountdownConfig {
    /// Length of one cycle. Zero clamps to [`DEFAULT_COUNTDOWN_MS`].
    pub duration_ms: Millis,
    /// Whether the countdown runs at all.
    pub enabled: bool,
    /// Change-reporting precision.
    pub precision: Precision,
    /// Re-anchor immediately on timeout instead of stopping.
    pub restart_on_timeout: bool,
    /// Activity kinds that reset the countdown once bound to a broadcaster.
    pub reset_events: Vec<InputKind>,
    /// Tick granularity override.
    pub granularity_ms: Option<Millis>,
}

impl Default for CountdownConfig {
    fn default() -> Self {
        Self {
            duration_ms: DEFAULT_COUNTDOWN_MS,
            enabled: true,
            precision: Precision::Seconds,
            restart_on_timeout: false,
            reset_events: Vec::new(),
            granularity_ms: None,
        }
    }
}

impl CountdownConfig {
    /// Enabled, seconds-precision countdown of `duration_ms`.
    #[must_use]
    pub fn new(duration_ms: Millis) -> Self {
        Self {
            duration_ms,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn precision(mut self, precision: Precision) -> Self {
        self.precision = precision;
        self
    }

    #[must_use]
    pub fn restart_on_timeout(mut self, restart: bool) -> Self {
        self.restart_on_timeout = restart;
        self
    }

    #[must_use]
    pub fn reset_on(mut self, kinds: impl IntoIterator<Item = InputKind>) -> Self {
        self.reset_events = kinds.into_iter().collect();
        self
    }

    #[must_use]
    pub fn granularity(mut self, granularity_ms: Millis) -> Self {
        self.granularity_ms = Some(granularity_ms);
        self
    }

    #[must_use]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Granularity the engine registers with.
    #[must_use]
    pub fn effective_granularity(&self) -> Millis {
        self.granularity_ms.unwrap_or(match self.precision {
            Precision::Seconds => DEFAULT_SECONDS_GRANULARITY_MS,
            Precision::Milliseconds => DEFAULT_MILLIS_GRANULARITY_MS,
        })
    }
}

/// Zero is not a usable duration.
#[must_use]
pub fn sanitize_duration(duration_ms: Millis, fallback: Millis) -> Millis {
    if duration_ms == 0 {
        tracing::warn!(fallback, "zero countdown duration replaced by fallback");
        fallback
    } else {
        duration_ms
    }
}

/// Whole seconds for display, rounded up (so "0" only shows at expiry).
#[must_use]
pub fn seconds_ceil(ms: Millis) -> u64 {
    ms.div_ceil(1_000)
}

/// Point-in-time view of a countdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountdownSnapshot {
    pub remaining_ms: Millis,
    pub remaining_seconds: u64,
    pub duration_ms: Millis,
    pub running: bool,
    /// Incremented on every re-anchor.
    pub cycle: u64,
}

struct State {
    config: CountdownConfig,
    start_ms: Millis,
    remaining_ms: Millis,
    has_fired: bool,
    running: bool,
    cycle: u64,
    fires: u64,
    last_emitted_secs: Option<u64>,
    tick: Option<TickHandle>,
}

impl State {
    fn reanchor(&mut self, now: Millis) {
        self.start_ms = now;
        self.remaining_ms = self.config.duration_ms;
        self.has_fired = false;
        self.running = true;
        self.cycle += 1;
        self.last_emitted_secs = Some(seconds_ceil(self.remaining_ms));
    }

    fn snapshot(&self) -> CountdownSnapshot {
        CountdownSnapshot {
            remaining_ms: self.remaining_ms,
            remaining_seconds: seconds_ceil(self.remaining_ms),
            duration_ms: self.config.duration_ms,
            running: self.running,
            cycle: self.cycle,
        }
    }
}

type TimeoutFn = Box<dyn FnMut()>;
type ChangeFn = Box<dyn FnMut(CountdownSnapshot)>;

struct Shared {
    state: RefCell<State>,
    on_timeout: RefCell<Option<TimeoutFn>>,
    on_change: RefCell<Option<ChangeFn>>,
    scheduler: TickScheduler,
}

enum TickOutcome {
    Quiet,
    Changed(CountdownSnapshot),
    Expired(CountdownSnapshot, Option<TickHandle>),
    Restarted,
}

fn fire_timeout(shared: &Shared) {
    match shared.on_timeout.try_borrow_mut() {
        Ok(mut slot) => {
            if let Some(cb) = slot.as_mut() {
                cb();
            }
        }
        Err(_) => tracing::trace!("nested on_timeout suppressed"),
    }
}

fn emit(shared: &Shared, snapshot: CountdownSnapshot) {
    match shared.on_change.try_borrow_mut() {
        Ok(mut slot) => {
            if let Some(cb) = slot.as_mut() {
                cb(snapshot);
            }
        }
        Err(_) => tracing::trace!("nested on_change suppressed"),
    }
}

fn on_tick(shared: &Shared, now: Millis) {
    let outcome = {
        let mut st = shared.state.borrow_mut();
        if !st.running || st.has_fired {
            TickOutcome::Quiet
        } else {
            let elapsed = now.saturating_sub(st.start_ms);
            let remaining = st
                .config
                .duration_ms
                .saturating_sub(elapsed)
                .min(st.remaining_ms);
            st.remaining_ms = remaining;

            if remaining == 0 {
                st.has_fired = true;
                st.fires += 1;
                tracing::debug!(cycle = st.cycle, now, "countdown timeout");
                if st.config.restart_on_timeout {
                    st.reanchor(now);
                    TickOutcome::Restarted
                } else {
                    st.running = false;
                    st.last_emitted_secs = Some(0);
                    let tick = st.tick.take();
                    TickOutcome::Expired(st.snapshot(), tick)
                }
            } else {
                match st.config.precision {
                    Precision::Milliseconds => TickOutcome::Changed(st.snapshot()),
                    Precision::Seconds => {
                        let secs = seconds_ceil(remaining);
                        if st.last_emitted_secs == Some(secs) {
                            TickOutcome::Quiet
                        } else {
                            st.last_emitted_secs = Some(secs);
                            TickOutcome::Changed(st.snapshot())
                        }
                    }
                }
            }
        }
    };

    match outcome {
        TickOutcome::Quiet => {}
        TickOutcome::Changed(snapshot) => emit(shared, snapshot),
        TickOutcome::Expired(snapshot, tick) => {
            if let Some(handle) = tick {
                shared.scheduler.unregister(handle);
            }
            emit(shared, snapshot);
            fire_timeout(shared);
        }
        TickOutcome::Restarted => {
            fire_timeout(shared);
            let snapshot = shared.state.borrow().snapshot();
            emit(shared, snapshot);
        }
    }
}

fn ensure_armed(shared: &Rc<Shared>) {
    let granularity = {
        let st = shared.state.borrow();
        if st.tick.is_some() {
            return;
        }
        st.config.effective_granularity()
    };
    let weak: Weak<Shared> = Rc::downgrade(shared);
    let handle = shared.scheduler.register(granularity, move |now| {
        if let Some(shared) = weak.upgrade() {
            on_tick(&shared, now);
        }
    });
    shared.state.borrow_mut().tick = Some(handle);
}

fn disarm(shared: &Shared) {
    let tick = shared.state.borrow_mut().tick.take();
    if let Some(handle) = tick {
        shared.scheduler.unregister(handle);
    }
}

fn restart(shared: &Rc<Shared>, duration_ms: Option<Millis>) -> bool {
    let now = shared.scheduler.now();
    let snapshot = {
        let mut st = shared.state.borrow_mut();
        if !st.config.enabled {
            tracing::debug!("reset ignored: countdown disabled");
            return false;
        }
        if let Some(d) = duration_ms {
            st.config.duration_ms = sanitize_duration(d, DEFAULT_COUNTDOWN_MS);
        }
        st.reanchor(now);
        st.snapshot()
    };
    ensure_armed(shared);
    emit(shared, snapshot);
    true
}

fn halt(shared: &Shared) {
    shared.state.borrow_mut().running = false;
    disarm(shared);
}

/// A countdown registered with a [`TickScheduler`].
///
/// Dropping the engine unregisters its tick. Use [`control`](Self::control)
/// to obtain a weak handle for callbacks and activity bindings.
pub struct CountdownEngine {
    shared: Rc<Shared>,
    reset_binding: Option<ActivitySubscription>,
}

impl fmt::Debug for CountdownEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CountdownEngine")
            .field("snapshot", &self.snapshot())
            .field("bound", &self.reset_binding.is_some())
            .finish()
    }
}

impl CountdownEngine {
    /// Create a countdown. If enabled, it is anchored at the scheduler's
    /// current time and starts ticking immediately.
    pub fn new(scheduler: &TickScheduler, mut config: CountdownConfig) -> Self {
        config.duration_ms = sanitize_duration(config.duration_ms, DEFAULT_COUNTDOWN_MS);
        let enabled = config.enabled;
        let remaining = config.duration_ms;
        let shared = Rc::new(Shared {
            state: RefCell::new(State {
                config,
                start_ms: scheduler.now(),
                remaining_ms: remaining,
                has_fired: false,
                running: enabled,
                cycle: 0,
                fires: 0,
                last_emitted_secs: None,
                tick: None,
            }),
            on_timeout: RefCell::new(None),
            on_change: RefCell::new(None),
            scheduler: scheduler.clone(),
        });
        if enabled {
            ensure_armed(&shared);
        }
        Self {
            shared,
            reset_binding: None,
        }
    }

    /// Set the timeout callback.
    #[must_use]
    pub fn on_timeout(self, callback: impl FnMut() + 'static) -> Self {
        self.set_on_timeout(callback);
        self
    }

    /// Set the change callback.
    #[must_use]
    pub fn on_change(self, callback: impl FnMut(CountdownSnapshot) + 'static) -> Self {
        self.set_on_change(callback);
        self
    }

    /// Replace the timeout callback.
    pub fn set_on_timeout(&self, callback: impl FnMut() + 'static) {
        *self.shared.on_timeout.borrow_mut() = Some(Box::new(callback));
    }

    /// Replace the change callback.
    pub fn set_on_change(&self, callback: impl FnMut(CountdownSnapshot) + 'static) {
        *self.shared.on_change.borrow_mut() = Some(Box::new(callback));
    }

    /// Reset whenever `broadcaster` publishes one of the configured
    /// `reset_events`. Replaces any previous binding.
    pub fn bind_reset_events(&mut self, broadcaster: &UserActivityBroadcaster) {
        let kinds = self.shared.state.borrow().config.reset_events.clone();
        if kinds.is_empty() {
            self.reset_binding = None;
            return;
        }
        let control = self.control();
        self.reset_binding = Some(broadcaster.subscribe(move |signal| {
            if kinds.contains(&signal.source) {
                control.reset(None);
            }
        }));
    }

    /// Start a fresh cycle of `duration_ms`.
    pub fn start(&self, duration_ms: Millis) -> bool {
        restart(&self.shared, Some(duration_ms))
    }

    /// Re-anchor at now, optionally with a new duration.
    pub fn reset(&self, duration_ms: Option<Millis>) -> bool {
        restart(&self.shared, duration_ms)
    }

    /// Stop ticking. The remaining value is frozen.
    pub fn stop(&self) {
        halt(&self.shared);
    }

    /// Change the duration; re-anchors.
    pub fn set_duration(&self, duration_ms: Millis) -> bool {
        restart(&self.shared, Some(duration_ms))
    }

    /// Enable (re-anchor and start) or disable (stop) the countdown.
    pub fn set_enabled(&self, enabled: bool) {
        let was = {
            let mut st = self.shared.state.borrow_mut();
            std::mem::replace(&mut st.config.enabled, enabled)
        };
        match (was, enabled) {
            (false, true) => {
                restart(&self.shared, None);
            }
            (true, false) => halt(&self.shared),
            _ => {}
        }
    }

    /// Toggle restart-on-timeout. Turning it off is how a looping countdown
    /// is allowed to finish its current cycle and stop.
    pub fn set_restart_on_timeout(&self, restart: bool) {
        self.shared.state.borrow_mut().config.restart_on_timeout = restart;
    }

    #[must_use]
    pub fn remaining_ms(&self) -> Millis {
        self.shared.state.borrow().remaining_ms
    }

    #[must_use]
    pub fn remaining_seconds(&self) -> u64 {
        seconds_ceil(self.remaining_ms())
    }

    #[must_use]
    pub fn snapshot(&self) -> CountdownSnapshot {
        self.shared.state.borrow().snapshot()
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.shared.state.borrow().running
    }

    /// Whether the current cycle has timed out.
    #[must_use]
    pub fn has_fired(&self) -> bool {
        self.shared.state.borrow().has_fired
    }

    /// Number of re-anchors since construction.
    #[must_use]
    pub fn cycle(&self) -> u64 {
        self.shared.state.borrow().cycle
    }

    /// Total timeouts since construction.
    #[must_use]
    pub fn fire_count(&self) -> u64 {
        self.shared.state.borrow().fires
    }

    #[must_use]
    pub fn config(&self) -> CountdownConfig {
        self.shared.state.borrow().config.clone()
    }

    /// Weak handle that can reset or stop this countdown from callbacks.
    #[must_use]
    pub fn control(&self) -> CountdownControl {
        CountdownControl {
            shared: Rc::downgrade(&self.shared),
        }
    }
}

impl Drop for CountdownEngine {
    fn drop(&mut self) {
        disarm(&self.shared);
    }
}

/// Weak handle to a [`CountdownEngine`]. Operations are no-ops once the
/// engine is dropped.
#[derive(Clone)]
pub struct CountdownControl {
    shared: Weak<Shared>,
}

impl fmt::Debug for CountdownControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CountdownControl")
            .field("alive", &(self.shared.strong_count() > 0))
            .finish()
    }
}

impl CountdownControl {
    /// See [`CountdownEngine::reset`]. Returns `false` if the engine is gone
    /// or disabled.
    pub fn reset(&self, duration_ms: Option<Millis>) -> bool {
        self.shared
            .upgrade()
            .is_some_and(|shared| restart(&shared, duration_ms))
    }

    /// See [`CountdownEngine::stop`].
    pub fn stop(&self) {
        if let Some(shared) = self.shared.upgrade() {
            halt(&shared);
        }
    }

    /// Remaining time, if the engine is alive.
    #[must_use]
    pub fn remaining_ms(&self) -> Option<Millis> {
        self.shared
            .upgrade()
            .map(|shared| shared.state.borrow().remaining_ms)
    }
}
