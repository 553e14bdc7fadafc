#![forbid(unsafe_code)]

//! Idle session controller: Active → Warning → Expired.
//!
//! Composes one [`CountdownEngine`] with the canonical activity signal. The
//! controller only decides *when*; it owns no UI. On warning it calls
//! `on_warning`, on expiry `on_timeout`, and the caller clears transient
//! application state and returns to the entry screen.
//!
//! # State machine
//!
//! ```text
//!            remaining <= threshold          remaining == 0
//!   Active ─────────────────────────▶ Warning ───────────────▶ Expired
//!     ▲                                  │                        │
//!     └──────────── reset (activity or reset_timer) ◀─────────────┘
//! ```
//!
//! # Invariants
//!
//! 1. Phases advance in order; Warning is skipped only when the warning
//!    threshold is not below the idle duration.
//! 2. At most one warning per cycle. The shown-flag clears only on the next
//!    effective reset.
//! 3. Expiry fires exactly once per cycle.
//! 4. Resets landing within the collapse window of the previous effective
//!    reset are absorbed (anti-thrash). A reset out of Expired is always
//!    honored.
//!
//! # Suppression
//!
//! The injected [`WarningGate`] decides whether a warning is raised at all
//! (not if a warning UI is already visible) and whether it is spoken (not on
//! the entry screen). The countdown keeps running either way.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use kiosk_core::activity::{ActivitySubscription, UserActivityBroadcaster};
use kiosk_core::clock::Clock;
use kiosk_core::event::Millis;
use kiosk_core::gate::WarningGate;

use crate::countdown::{
    CountdownConfig, CountdownControl, CountdownEngine, Precision, sanitize_duration, seconds_ceil,
};
use crate::scheduler::TickScheduler;

/// Default idle duration before the session resets.
pub const DEFAULT_IDLE_DURATION_MS: Millis = 120_000;

/// Default remaining time at which the warning is raised.
pub const DEFAULT_WARNING_THRESHOLD_MS: Millis = 20_000;

/// Resets closer together than this collapse into one re-arm.
pub const DEFAULT_RESET_COLLAPSE_WINDOW_MS: Millis = 100;

/// Tick granularity of the idle countdown.
pub const DEFAULT_IDLE_GRANULARITY_MS: Millis = 250;

/// Session phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdlePhase {
    Active,
    Warning,
    Expired,
}

impl IdlePhase {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Warning => "warning",
            Self::Expired => "expired",
        }
    }
}

/// Idle controller configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdleConfig {
    pub duration_ms: Millis,
    pub warning_threshold_ms: Millis,
    pub enabled: bool,
    pub reset_on_user_activity: bool,
    pub reset_collapse_window_ms: Millis,
    pub granularity_ms: Millis,
}

impl Default for IdleConfig {
    fn default() -> Self {
        Self {
            duration_ms: DEFAULT_IDLE_DURATION_MS,
            warning_threshold_ms: DEFAULT_WARNING_THRESHOLD_MS,
            enabled: true,
            reset_on_user_activity: true,
            reset_collapse_window_ms: DEFAULT_RESET_COLLAPSE_WINDOW_MS,
            granularity_ms: DEFAULT_IDLE_GRANULARITY_MS,
        }
    }
}

impl IdleConfig {
    /// Whether a Warning phase exists for this configuration.
    #[must_use]
    pub fn warnings_apply(&self) -> bool {
        self.warning_threshold_ms > 0 && self.warning_threshold_ms < self.duration_ms
    }

    /// Replace unusable values with defaults. Never fails.
    #[must_use]
    pub fn sanitized(mut self) -> Self {
        self.duration_ms = sanitize_duration(self.duration_ms, DEFAULT_IDLE_DURATION_MS);
        if self.warning_threshold_ms >= self.duration_ms {
            tracing::warn!(
                threshold = self.warning_threshold_ms,
                duration = self.duration_ms,
                "warning threshold not below idle duration; warning phase disabled"
            );
        }
        self
    }
}

/// Payload handed to `on_warning`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WarningNotice {
    pub remaining_ms: Millis,
    /// `false` when the warning must not be spoken (entry screen).
    pub announce: bool,
}

struct IdleState {
    config: IdleConfig,
    phase: IdlePhase,
    warning_shown: bool,
    last_activity_at: Option<Millis>,
    last_reset_at: Option<Millis>,
    resets: u64,
    collapsed: u64,
}

type WarningFn = Box<dyn FnMut(WarningNotice)>;
type ExpireFn = Box<dyn FnMut()>;

struct IdleShared {
    state: RefCell<IdleState>,
    on_warning: RefCell<Option<WarningFn>>,
    on_timeout: RefCell<Option<ExpireFn>>,
    gate: Rc<dyn WarningGate>,
    clock: Rc<dyn Clock>,
    countdown: CountdownControl,
}

fn observe(shared: &IdleShared, remaining_ms: Millis) {
    let notice = {
        let mut st = shared.state.borrow_mut();
        if st.phase != IdlePhase::Active
            || st.warning_shown
            || !st.config.warnings_apply()
            || remaining_ms > st.config.warning_threshold_ms
        {
            return;
        }
        st.warning_shown = true;
        st.phase = IdlePhase::Warning;
        if shared.gate.warning_visible() {
            tracing::debug!(remaining_ms, "warning UI already visible; not re-raised");
            None
        } else {
            Some(WarningNotice {
                remaining_ms,
                announce: !shared.gate.on_entry_screen(),
            })
        }
    };

    if let Some(notice) = notice {
        tracing::info!(
            remaining_ms = notice.remaining_ms,
            announce = notice.announce,
            "idle warning"
        );
        if let Ok(mut slot) = shared.on_warning.try_borrow_mut()
            && let Some(cb) = slot.as_mut()
        {
            cb(notice);
        }
    }
}

fn expire(shared: &IdleShared) {
    {
        let mut st = shared.state.borrow_mut();
        if st.phase == IdlePhase::Expired {
            return;
        }
        st.phase = IdlePhase::Expired;
    }
    tracing::info!("idle session expired");
    if let Ok(mut slot) = shared.on_timeout.try_borrow_mut()
        && let Some(cb) = slot.as_mut()
    {
        cb();
    }
}

fn rearm(shared: &IdleShared, activity_at: Option<Millis>) -> bool {
    let now = shared.clock.now_ms();
    {
        let mut st = shared.state.borrow_mut();
        if let Some(at) = activity_at {
            st.last_activity_at = Some(at);
        }
        if !st.config.enabled {
            return false;
        }
        if st.phase != IdlePhase::Expired
            && let Some(last) = st.last_reset_at
            && now.saturating_sub(last) < st.config.reset_collapse_window_ms
        {
            st.collapsed += 1;
            tracing::trace!(now, last, "reset collapsed");
            return false;
        }
        st.last_reset_at = Some(now);
        st.phase = IdlePhase::Active;
        st.warning_shown = false;
        st.resets += 1;
    }
    shared.countdown.reset(None)
}

/// Drives the idle session for the whole application lifetime.
pub struct IdleSessionController {
    shared: Rc<IdleShared>,
    countdown: CountdownEngine,
    activity: Option<ActivitySubscription>,
}

impl fmt::Debug for IdleSessionController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let st = self.shared.state.borrow();
        f.debug_struct("IdleSessionController")
            .field("phase", &st.phase)
            .field("warning_shown", &st.warning_shown)
            .field("remaining_ms", &self.countdown.remaining_ms())
            .finish()
    }
}

impl IdleSessionController {
    /// Create a controller; if enabled, the countdown starts now.
    pub fn new(scheduler: &TickScheduler, config: IdleConfig, gate: Rc<dyn WarningGate>) -> Self {
        let config = config.sanitized();
        let countdown = CountdownEngine::new(
            scheduler,
            CountdownConfig::new(config.duration_ms)
                .precision(Precision::Milliseconds)
                .granularity(config.granularity_ms)
                .enabled(config.enabled),
        );
        let shared = Rc::new(IdleShared {
            state: RefCell::new(IdleState {
                config,
                phase: IdlePhase::Active,
                warning_shown: false,
                last_activity_at: None,
                last_reset_at: None,
                resets: 0,
                collapsed: 0,
            }),
            on_warning: RefCell::new(None),
            on_timeout: RefCell::new(None),
            gate,
            clock: scheduler.clock(),
            countdown: countdown.control(),
        });

        let weak: Weak<IdleShared> = Rc::downgrade(&shared);
        countdown.set_on_change(move |snap| {
            if let Some(shared) = weak.upgrade() {
                observe(&shared, snap.remaining_ms);
            }
        });
        let weak: Weak<IdleShared> = Rc::downgrade(&shared);
        countdown.set_on_timeout(move || {
            if let Some(shared) = weak.upgrade() {
                expire(&shared);
            }
        });

        Self {
            shared,
            countdown,
            activity: None,
        }
    }

    /// Set the warning callback.
    #[must_use]
    pub fn on_warning(self, callback: impl FnMut(WarningNotice) + 'static) -> Self {
        *self.shared.on_warning.borrow_mut() = Some(Box::new(callback));
        self
    }

    /// Set the expiry callback.
    #[must_use]
    pub fn on_timeout(self, callback: impl FnMut() + 'static) -> Self {
        *self.shared.on_timeout.borrow_mut() = Some(Box::new(callback));
        self
    }

    /// Subscribe to the canonical activity signal (if configured to reset on
    /// user activity).
    pub fn attach_activity(&mut self, broadcaster: &UserActivityBroadcaster) {
        if !self.shared.state.borrow().config.reset_on_user_activity {
            self.activity = None;
            return;
        }
        let weak: Weak<IdleShared> = Rc::downgrade(&self.shared);
        self.activity = Some(broadcaster.subscribe(move |signal| {
            if let Some(shared) = weak.upgrade() {
                rearm(&shared, Some(signal.timestamp));
            }
        }));
    }

    /// Re-arm the session. Returns `false` if the reset was collapsed into
    /// the previous one or the controller is disabled.
    pub fn reset_timer(&self) -> bool {
        rearm(&self.shared, None)
    }

    /// Enable or disable the whole controller.
    ///
    /// Only a real transition has an effect: re-enabling an already enabled
    /// controller keeps the current phase and timer untouched.
    pub fn set_enabled(&self, enabled: bool) {
        {
            let mut st = self.shared.state.borrow_mut();
            let was = std::mem::replace(&mut st.config.enabled, enabled);
            if was == enabled {
                return;
            }
            if enabled {
                st.phase = IdlePhase::Active;
                st.warning_shown = false;
                st.last_reset_at = Some(self.shared.clock.now_ms());
                st.resets += 1;
            }
        }
        tracing::debug!(enabled, "idle controller toggled");
        self.countdown.set_enabled(enabled);
    }

    #[must_use]
    pub fn phase(&self) -> IdlePhase {
        self.shared.state.borrow().phase
    }

    #[must_use]
    pub fn warning_shown(&self) -> bool {
        self.shared.state.borrow().warning_shown
    }

    #[must_use]
    pub fn remaining_ms(&self) -> Millis {
        self.countdown.remaining_ms()
    }

    #[must_use]
    pub fn remaining_seconds(&self) -> u64 {
        self.countdown.remaining_seconds()
    }

    /// Remaining time as `m:ss`.
    #[must_use]
    pub fn remaining_time_formatted(&self) -> String {
        format_remaining(self.remaining_ms())
    }

    /// Timestamp of the last activity signal seen.
    #[must_use]
    pub fn last_activity_at(&self) -> Option<Millis> {
        self.shared.state.borrow().last_activity_at
    }

    /// Effective resets since construction.
    #[must_use]
    pub fn reset_count(&self) -> u64 {
        self.shared.state.borrow().resets
    }

    /// Resets absorbed by the collapse window.
    #[must_use]
    pub fn collapsed_count(&self) -> u64 {
        self.shared.state.borrow().collapsed
    }

    #[must_use]
    pub fn config(&self) -> IdleConfig {
        self.shared.state.borrow().config.clone()
    }
}

/// Format milliseconds as `m:ss`, rounding up to the next whole second.
#[must_use]
pub fn format_remaining(ms: Millis) -> String {
    let secs = seconds_ceil(ms);
    format!("{}:{:02}", secs / 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiosk_core::clock::ManualClock;
    use kiosk_core::event::{InputEvent, InputKind};
    use kiosk_core::gate::OpenGate;
    use std::cell::Cell;

    struct FlagGate {
        visible: Cell<bool>,
        entry: Cell<bool>,
    }

    impl WarningGate for FlagGate {
        fn warning_visible(&self) -> bool {
            self.visible.get()
        }
        fn on_entry_screen(&self) -> bool {
            self.entry.get()
        }
    }

    struct Rig {
        clock: ManualClock,
        sched: TickScheduler,
        warnings: Rc<RefCell<Vec<WarningNotice>>>,
        expiries: Rc<Cell<u32>>,
    }

    impl Rig {
        fn new() -> Self {
            let clock = ManualClock::new(0);
            let sched = TickScheduler::new(Rc::new(clock.clone()));
            Self {
                clock,
                sched,
                warnings: Rc::new(RefCell::new(Vec::new())),
                expiries: Rc::new(Cell::new(0)),
            }
        }

        fn controller(&self, config: IdleConfig, gate: Rc<dyn WarningGate>) -> IdleSessionController {
            let w = Rc::clone(&self.warnings);
            let e = Rc::clone(&self.expiries);
            IdleSessionController::new(&self.sched, config, gate)
                .on_warning(move |n| w.borrow_mut().push(n))
                .on_timeout(move || e.set(e.get() + 1))
        }

        fn run_for(&self, ms: Millis) {
            let end = self.clock.now_ms() + ms;
            while self.clock.now_ms() < end {
                self.clock.advance(250);
                self.sched.pump();
            }
        }
    }

    #[test]
    fn warning_then_expiry_in_order() {
        let rig = Rig::new();
        let idle = rig.controller(IdleConfig::default(), Rc::new(OpenGate));

        rig.run_for(100_000);
        assert_eq!(idle.phase(), IdlePhase::Warning);
        assert_eq!(rig.warnings.borrow().len(), 1);
        assert_eq!(rig.warnings.borrow()[0].remaining_ms, 20_000);
        assert!(rig.warnings.borrow()[0].announce);

        rig.run_for(19_750);
        assert_eq!(rig.expiries.get(), 0);
        rig.run_for(250);
        assert_eq!(idle.phase(), IdlePhase::Expired);
        assert_eq!(rig.expiries.get(), 1);

        rig.run_for(5_000);
        assert_eq!(rig.expiries.get(), 1);
        assert_eq!(rig.warnings.borrow().len(), 1);
    }

    #[test]
    fn activity_resets_and_clears_warning_flag() {
        let rig = Rig::new();
        let activity = UserActivityBroadcaster::new();
        let mut idle = rig.controller(IdleConfig::default(), Rc::new(OpenGate));
        idle.attach_activity(&activity);

        rig.run_for(100_000);
        assert!(idle.warning_shown());

        activity.capture(&InputEvent::new(InputKind::TouchStart, 100_000));
        assert_eq!(idle.remaining_ms(), 120_000);
        assert!(!idle.warning_shown());
        assert_eq!(idle.phase(), IdlePhase::Active);
        assert_eq!(idle.last_activity_at(), Some(100_000));

        rig.run_for(100_000);
        assert_eq!(rig.warnings.borrow().len(), 2);
    }

    #[test]
    fn resets_within_window_collapse() {
        let rig = Rig::new();
        let idle = rig.controller(IdleConfig::default(), Rc::new(OpenGate));
        rig.clock.set(5_000);
        assert!(idle.reset_timer());
        rig.clock.set(5_060);
        assert!(!idle.reset_timer());
        assert_eq!(idle.reset_count(), 1);
        assert_eq!(idle.collapsed_count(), 1);
        rig.clock.set(5_100);
        assert!(idle.reset_timer());
        assert_eq!(idle.reset_count(), 2);
    }

    #[test]
    fn reset_out_of_expired_is_always_honored() {
        let rig = Rig::new();
        let idle = rig.controller(
            IdleConfig {
                duration_ms: 1_000,
                warning_threshold_ms: 500,
                ..IdleConfig::default()
            },
            Rc::new(OpenGate),
        );
        rig.clock.set(0);
        assert!(idle.reset_timer());
        rig.run_for(1_000);
        assert_eq!(idle.phase(), IdlePhase::Expired);
        assert!(idle.reset_timer());
        assert_eq!(idle.phase(), IdlePhase::Active);
        assert_eq!(idle.remaining_ms(), 1_000);
    }

    #[test]
    fn visible_warning_is_not_reraised() {
        let rig = Rig::new();
        let gate = Rc::new(FlagGate {
            visible: Cell::new(true),
            entry: Cell::new(false),
        });
        let idle = rig.controller(IdleConfig::default(), gate);
        rig.run_for(101_000);
        assert_eq!(idle.phase(), IdlePhase::Warning);
        assert!(idle.warning_shown());
        assert!(rig.warnings.borrow().is_empty());
    }

    #[test]
    fn entry_screen_warning_is_silent_but_timer_runs() {
        let rig = Rig::new();
        let gate = Rc::new(FlagGate {
            visible: Cell::new(false),
            entry: Cell::new(true),
        });
        let idle = rig.controller(IdleConfig::default(), gate);
        rig.run_for(120_000);
        assert_eq!(rig.warnings.borrow().len(), 1);
        assert!(!rig.warnings.borrow()[0].announce);
        assert_eq!(idle.phase(), IdlePhase::Expired);
    }

    #[test]
    fn threshold_at_or_above_duration_skips_warning() {
        let rig = Rig::new();
        let idle = rig.controller(
            IdleConfig {
                duration_ms: 10_000,
                warning_threshold_ms: 10_000,
                ..IdleConfig::default()
            },
            Rc::new(OpenGate),
        );
        rig.run_for(10_000);
        assert!(rig.warnings.borrow().is_empty());
        assert_eq!(idle.phase(), IdlePhase::Expired);
        assert_eq!(rig.expiries.get(), 1);
    }

    #[test]
    fn coarse_jump_still_warns_before_expiring() {
        let rig = Rig::new();
        let idle = rig.controller(IdleConfig::default(), Rc::new(OpenGate));
        rig.clock.set(200_000);
        rig.sched.pump();
        assert_eq!(rig.warnings.borrow().len(), 1);
        assert_eq!(rig.warnings.borrow()[0].remaining_ms, 0);
        assert_eq!(rig.expiries.get(), 1);
        assert_eq!(idle.phase(), IdlePhase::Expired);
    }

    #[test]
    fn disabled_controller_never_fires() {
        let rig = Rig::new();
        let idle = rig.controller(
            IdleConfig {
                enabled: false,
                ..IdleConfig::default()
            },
            Rc::new(OpenGate),
        );
        rig.run_for(200_000);
        assert_eq!(rig.expiries.get(), 0);
        assert!(!idle.reset_timer());
        assert_eq!(rig.sched.armed_timer_count(), 0);

        idle.set_enabled(true);
        assert_eq!(rig.sched.armed_timer_count(), 1);
        assert_eq!(idle.remaining_ms(), 120_000);
    }

    #[test]
    fn reenabling_during_warning_keeps_the_cycle() {
        let rig = Rig::new();
        let idle = rig.controller(IdleConfig::default(), Rc::new(OpenGate));
        rig.run_for(100_000);
        assert_eq!(idle.phase(), IdlePhase::Warning);

        idle.set_enabled(true);
        rig.run_for(500);
        assert_eq!(idle.phase(), IdlePhase::Warning);
        assert!(idle.warning_shown());
        assert_eq!(rig.warnings.borrow().len(), 1);
        assert_eq!(idle.remaining_ms(), 19_500);

        rig.run_for(19_500);
        assert_eq!(rig.expiries.get(), 1);
    }

    #[test]
    fn reenabling_after_expiry_stays_expired_until_reset() {
        let rig = Rig::new();
        let idle = rig.controller(IdleConfig::default(), Rc::new(OpenGate));
        rig.run_for(120_000);
        assert_eq!(idle.phase(), IdlePhase::Expired);

        idle.set_enabled(true);
        assert_eq!(idle.phase(), IdlePhase::Expired);
        rig.run_for(200_000);
        assert_eq!(rig.expiries.get(), 1);
        assert_eq!(rig.warnings.borrow().len(), 1);

        assert!(idle.reset_timer());
        assert_eq!(idle.phase(), IdlePhase::Active);
        assert_eq!(rig.sched.armed_timer_count(), 1);
        rig.run_for(120_000);
        assert_eq!(rig.expiries.get(), 2);
    }

    #[test]
    fn disable_then_enable_rearms_from_full() {
        let rig = Rig::new();
        let idle = rig.controller(IdleConfig::default(), Rc::new(OpenGate));
        rig.run_for(100_000);
        assert_eq!(idle.phase(), IdlePhase::Warning);

        idle.set_enabled(false);
        assert_eq!(rig.sched.armed_timer_count(), 0);
        idle.set_enabled(true);
        assert_eq!(idle.phase(), IdlePhase::Active);
        assert!(!idle.warning_shown());
        assert_eq!(idle.remaining_ms(), 120_000);

        rig.run_for(100_000);
        assert_eq!(rig.warnings.borrow().len(), 2);
    }

    #[test]
    fn formatting() {
        assert_eq!(format_remaining(120_000), "2:00");
        assert_eq!(format_remaining(19_001), "0:20");
        assert_eq!(format_remaining(0), "0:00");
        assert_eq!(format_remaining(61_000), "1:01");
    }
}
