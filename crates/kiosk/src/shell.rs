#![forbid(unsafe_code)]

//! The kiosk shell: one owner for every coordination component.
//!
//! The host feeds raw input through [`KioskShell::handle_input`] and calls
//! [`KioskShell::pump`] from its frame or timer loop. Both return the
//! [`ShellEvent`]s the host should render or play.
//!
//! # Input routing
//!
//! 1. Activity capture (idle reset) runs before anything else.
//! 2. The speech interaction gate sees every raw kind.
//! 3. Tab / Shift+Tab go to the modal trap, arrows to the navigator scoped
//!    to the top modal, Escape closes the top modal.
//! 4. Pointer hover is offered to speech; a click on a focusable element
//!    focuses it.
//!
//! # Deferred work
//!
//! Idle and auto-advance callbacks fire inside the scheduler's notify loop.
//! They only enqueue; the shell acts on the queue once the loop has
//! returned, so no component is borrowed twice.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::path::Path;
use std::rc::Rc;

use kiosk_core::activity::UserActivityBroadcaster;
use kiosk_core::clock::Clock;
use kiosk_core::event::{ElementId, InputEvent, InputKind, KeyCode, KeyEvent, Millis};
use kiosk_core::gate::WarningGate;
use kiosk_runtime::config::KioskConfig;
use kiosk_runtime::countdown::CountdownEngine;
use kiosk_runtime::idle::{IdlePhase, IdleSessionController, WarningNotice, format_remaining};
use kiosk_runtime::scheduler::TickScheduler;
use kiosk_widgets::focus::{ElementRegistry, FocusChange, FocusCursor, FocusNavigator, KeyOutcome};
use kiosk_widgets::modal::{ModalFocusStack, ModalKind, ModalTransition};
use kiosk_widgets::speech::{Announcement, AudioOutput, SpeechConfig, SpeechCoordinator};

use crate::error::{Error, Result};

/// Something the host should react to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellEvent {
    /// The idle warning was raised.
    IdleWarning(WarningNotice),
    /// The session expired and was reset to the entry screen.
    IdleExpired,
    /// An auto-advance countdown elapsed.
    AutoAdvance { target: String },
    /// Focus moved; the host moves its real focus ring.
    FocusMoved(FocusChange),
    /// The current screen changed.
    ScreenChanged { from: String, to: String },
    /// Audio was asked to speak.
    Announced(Announcement),
}

/// Result of [`KioskShell::handle_input`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputResult {
    /// The key was handled; the host suppresses its default action.
    pub consumed: bool,
    pub events: Vec<ShellEvent>,
}

type EventQueue = Rc<RefCell<VecDeque<ShellEvent>>>;
type ResetHook = Box<dyn FnMut()>;
type WarningMessage = Box<dyn Fn(Millis) -> String>;

struct AutoAdvance {
    target: String,
    countdown: CountdownEngine,
}

fn default_warning_message(remaining_ms: Millis) -> String {
    format!(
        "Are you still there? Your session ends in {}.",
        format_remaining(remaining_ms)
    )
}

/// Composes scheduler, activity, idle session, focus, modals and speech.
pub struct KioskShell<A: AudioOutput> {
    config: KioskConfig,
    scheduler: TickScheduler,
    activity: UserActivityBroadcaster,
    idle: IdleSessionController,
    registry: ElementRegistry,
    cursor: FocusCursor,
    navigator: FocusNavigator,
    modals: ModalFocusStack,
    speech: SpeechCoordinator<A>,
    entry_screen: String,
    screen: String,
    auto_advance: Option<AutoAdvance>,
    warning_root: Option<ElementId>,
    pending: EventQueue,
    on_session_reset: Option<ResetHook>,
    warning_message: WarningMessage,
}

impl<A: AudioOutput> fmt::Debug for KioskShell<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KioskShell")
            .field("screen", &self.screen)
            .field("entry_screen", &self.entry_screen)
            .field("idle", &self.idle)
            .field("focused", &self.cursor.current())
            .field("modal_depth", &self.modals.depth())
            .field(
                "auto_advance",
                &self.auto_advance.as_ref().map(|a| a.target.as_str()),
            )
            .finish()
    }
}

impl<A: AudioOutput> KioskShell<A> {
    /// Shell with default tunables.
    pub fn new(clock: Rc<dyn Clock>, audio: A) -> Self {
        Self::from_config(KioskConfig::default(), clock, audio)
    }

    /// Load a TOML or JSON config file and build a shell from it.
    pub fn from_config_file(path: impl AsRef<Path>, clock: Rc<dyn Clock>, audio: A) -> Result<Self> {
        let config = KioskConfig::from_file(path)?;
        Ok(Self::from_config(config, clock, audio))
    }

    /// Build a shell on the entry screen. Invalid tunables are logged and
    /// clamped.
    pub fn from_config(config: KioskConfig, clock: Rc<dyn Clock>, audio: A) -> Self {
        for issue in config.validate() {
            tracing::warn!(%issue, "kiosk config");
        }
        let scheduler = TickScheduler::new(clock);
        let activity = UserActivityBroadcaster::new();
        let modals = ModalFocusStack::new();
        modals.set_entry_screen(true);
        let pending: EventQueue = Rc::new(RefCell::new(VecDeque::new()));

        let gate: Rc<dyn WarningGate> = modals.gate();
        let on_warning = Rc::clone(&pending);
        let on_expired = Rc::clone(&pending);
        let mut idle = IdleSessionController::new(&scheduler, config.to_idle_config(), gate)
            .on_warning(move |notice| {
                on_warning
                    .borrow_mut()
                    .push_back(ShellEvent::IdleWarning(notice));
            })
            .on_timeout(move || on_expired.borrow_mut().push_back(ShellEvent::IdleExpired));
        idle.attach_activity(&activity);

        let speech = SpeechCoordinator::with_config(
            audio,
            SpeechConfig {
                enabled: config.speech.enabled,
                require_interaction: config.speech.require_interaction,
                separator: config.speech.separator.clone(),
            },
        );
        let entry_screen = config.entry_screen();
        tracing::info!(entry = %entry_screen, "kiosk shell ready");

        Self {
            screen: entry_screen.clone(),
            entry_screen,
            config,
            scheduler,
            activity,
            idle,
            registry: ElementRegistry::new(),
            cursor: FocusCursor::default(),
            navigator: FocusNavigator::new(),
            modals,
            speech,
            auto_advance: None,
            warning_root: None,
            pending,
            on_session_reset: None,
            warning_message: Box::new(default_warning_message),
        }
    }

    /// Hook run on idle expiry before the shell resets itself; the host
    /// clears carts and other transient state here.
    #[must_use]
    pub fn on_session_reset(mut self, hook: impl FnMut() + 'static) -> Self {
        self.on_session_reset = Some(Box::new(hook));
        self
    }

    /// Text spoken with the idle warning, given the remaining time.
    #[must_use]
    pub fn with_warning_message(mut self, message: impl Fn(Millis) -> String + 'static) -> Self {
        self.warning_message = Box::new(message);
        self
    }

    /// Element opened as an idle-warning modal when the warning is raised.
    /// Without one, the warning is only reported and spoken.
    pub fn set_warning_modal(&mut self, root: Option<ElementId>) {
        self.warning_root = root;
    }

    // ── Input ───────────────────────────────────────────────────────────

    /// Process one raw input event.
    pub fn handle_input(&mut self, event: InputEvent) -> InputResult {
        let mut out = Vec::new();
        self.cursor.revalidate(&self.registry);

        let signal = self.activity.capture(&event);
        self.speech.note_interaction(event.kind);
        if signal.is_some() {
            self.dismiss_warning(&mut out);
        }

        let consumed = match event.kind {
            InputKind::KeyDown => event
                .key
                .is_some_and(|key| self.route_key(&key, &mut out)),
            InputKind::PointerOver => {
                if let Some(target) = event.target
                    && self.in_modal_scope(target)
                    && let Some(a) = self.speech.on_hover(&self.registry, target)
                {
                    out.push(ShellEvent::Announced(a));
                }
                false
            }
            InputKind::Click | InputKind::FocusIn => {
                if let Some(target) = event.target
                    && self.accepts_focus(target)
                    && let Some(change) = self.cursor.focus(target)
                {
                    self.focus_moved(change, &mut out);
                }
                false
            }
            _ => false,
        };

        self.drain(&mut out);
        InputResult {
            consumed,
            events: out,
        }
    }

    fn accepts_focus(&self, target: ElementId) -> bool {
        self.registry.is_focusable(target) && self.in_modal_scope(target)
    }

    /// Background content behind an open modal is inert.
    fn in_modal_scope(&self, target: ElementId) -> bool {
        self.modals
            .scope()
            .is_none_or(|root| self.registry.is_within(target, root))
    }

    fn route_key(&mut self, key: &KeyEvent, out: &mut Vec<ShellEvent>) -> bool {
        let outcome = if key.is_tab() {
            self.modals.handle_key(&self.registry, &mut self.cursor, key)
        } else if FocusNavigator::handles(key) {
            let scope = self.modals.scope();
            self.navigator
                .handle_key(&self.registry, &mut self.cursor, key, scope)
        } else if key.code == KeyCode::Escape && !self.modals.is_empty() {
            let transition = self.modals.close(&mut self.registry, &mut self.cursor);
            KeyOutcome::Consumed(transition.and_then(|t| t.focus))
        } else {
            KeyOutcome::Ignored
        };
        if let Some(change) = outcome.change() {
            self.focus_moved(change, out);
        }
        outcome.is_consumed()
    }

    fn focus_moved(&mut self, change: FocusChange, out: &mut Vec<ShellEvent>) {
        out.push(ShellEvent::FocusMoved(change));
        if let Some(a) = self.speech.on_focus_in(&self.registry, change.to) {
            out.push(ShellEvent::Announced(a));
        }
    }

    /// Activity while the warning modal is up re-armed the session; take
    /// the modal down.
    fn dismiss_warning(&mut self, out: &mut Vec<ShellEvent>) {
        if self.modals.top_kind() != Some(ModalKind::IdleWarning)
            || self.idle.phase() != IdlePhase::Active
        {
            return;
        }
        if let Some(t) = self
            .modals
            .close_kind(&mut self.registry, &mut self.cursor, ModalKind::IdleWarning)
        {
            tracing::debug!(modal = t.id, "idle warning dismissed by activity");
            if let Some(change) = t.focus {
                self.focus_moved(change, out);
            }
        }
    }

    // ── Time ────────────────────────────────────────────────────────────

    /// Run due ticks and act on what they raised.
    pub fn pump(&mut self) -> Vec<ShellEvent> {
        let mut out = Vec::new();
        self.scheduler.pump();
        self.drain(&mut out);
        out
    }

    fn drain(&mut self, out: &mut Vec<ShellEvent>) {
        loop {
            let next = self.pending.borrow_mut().pop_front();
            let Some(event) = next else {
                break;
            };
            match event {
                ShellEvent::IdleWarning(notice) => self.raise_warning(notice, out),
                ShellEvent::IdleExpired => self.expire_session(out),
                ShellEvent::AutoAdvance { target } => self.auto_advance_elapsed(target, out),
                other => out.push(other),
            }
        }
    }

    fn raise_warning(&mut self, notice: WarningNotice, out: &mut Vec<ShellEvent>) {
        out.push(ShellEvent::IdleWarning(notice));
        if let Some(root) = self.warning_root
            && !self.modals.is_open(ModalKind::IdleWarning)
            && let Some(t) = self.modals.open(
                &mut self.registry,
                &mut self.cursor,
                root,
                ModalKind::IdleWarning,
            )
            && let Some(change) = t.focus
        {
            self.focus_moved(change, out);
        }
        if notice.announce {
            let text = (self.warning_message)(notice.remaining_ms);
            if let Some(a) = self.speech.announce_text(&text) {
                out.push(ShellEvent::Announced(a));
            }
        }
    }

    fn expire_session(&mut self, out: &mut Vec<ShellEvent>) {
        out.push(ShellEvent::IdleExpired);
        if let Some(hook) = self.on_session_reset.as_mut() {
            hook();
        }
        let closed = self.modals.close_all(&mut self.registry, &mut self.cursor);
        if !closed.is_empty() {
            tracing::debug!(count = closed.len(), "modals closed on expiry");
        }
        self.cursor.blur();
        let entry = self.entry_screen.clone();
        self.go_to(entry, out);
    }

    fn auto_advance_elapsed(&mut self, target: String, out: &mut Vec<ShellEvent>) {
        if self
            .auto_advance
            .as_ref()
            .is_none_or(|a| a.target != target)
        {
            tracing::trace!(%target, "stale auto-advance ignored");
            return;
        }
        out.push(ShellEvent::AutoAdvance {
            target: target.clone(),
        });
        self.go_to(target, out);
    }

    // ── Screens ─────────────────────────────────────────────────────────

    /// Switch screens. Speech context is forgotten and any pending
    /// auto-advance is cancelled; arriving at the entry screen re-arms the
    /// idle session.
    pub fn navigate_to(&mut self, screen: impl Into<String>) -> Vec<ShellEvent> {
        let mut out = Vec::new();
        self.go_to(screen.into(), &mut out);
        self.drain(&mut out);
        out
    }

    fn go_to(&mut self, to: String, out: &mut Vec<ShellEvent>) {
        let on_entry = to == self.entry_screen;
        self.modals.set_entry_screen(on_entry);
        self.speech.reset_context();
        self.auto_advance = None;
        if on_entry {
            self.idle.reset_timer();
        }
        if to != self.screen {
            let from = std::mem::replace(&mut self.screen, to.clone());
            tracing::info!(%from, %to, "screen changed");
            out.push(ShellEvent::ScreenChanged { from, to });
        }
    }

    /// Navigate to `target` once `duration_ms` (or the configured
    /// auto-advance duration) elapses. Replaces any pending auto-advance.
    pub fn schedule_auto_advance(&mut self, target: impl Into<String>, duration_ms: Option<Millis>) {
        let mut config = self.config.to_auto_advance_config();
        if let Some(ms) = duration_ms {
            config.duration_ms = ms;
        }
        let target = target.into();
        let queue = Rc::clone(&self.pending);
        let fired = target.clone();
        let countdown = CountdownEngine::new(&self.scheduler, config).on_timeout(move || {
            queue.borrow_mut().push_back(ShellEvent::AutoAdvance {
                target: fired.clone(),
            });
        });
        tracing::debug!(%target, remaining_ms = countdown.remaining_ms(), "auto-advance scheduled");
        self.auto_advance = Some(AutoAdvance { target, countdown });
    }

    pub fn cancel_auto_advance(&mut self) -> bool {
        self.auto_advance.take().is_some()
    }

    /// Whole seconds left on the pending auto-advance.
    #[must_use]
    pub fn auto_advance_remaining_seconds(&self) -> Option<u64> {
        self.auto_advance
            .as_ref()
            .map(|a| a.countdown.remaining_seconds())
    }

    // ── Modals ──────────────────────────────────────────────────────────

    /// Open a dialog rooted at `root` and trap focus inside it.
    pub fn open_modal(&mut self, root: ElementId) -> Vec<ShellEvent> {
        let mut out = Vec::new();
        let opened = self
            .modals
            .open(&mut self.registry, &mut self.cursor, root, ModalKind::Dialog);
        if let Some(change) = opened.and_then(|t| t.focus) {
            self.focus_moved(change, &mut out);
        }
        out
    }

    /// Close the top modal and restore focus.
    pub fn close_modal(&mut self) -> Vec<ShellEvent> {
        let mut out = Vec::new();
        let closed: Option<ModalTransition> = self.modals.close(&mut self.registry, &mut self.cursor);
        if let Some(change) = closed.and_then(|t| t.focus) {
            self.focus_moved(change, &mut out);
        }
        out
    }

    // ── Speech ──────────────────────────────────────────────────────────

    /// The audio backend finished announcement `seq`.
    pub fn playback_finished(&mut self, seq: u64) {
        self.speech.playback_finished(seq);
    }

    // ── Faults ──────────────────────────────────────────────────────────

    /// Subscriber panics and dropped announcements since the last call.
    pub fn faults(&mut self) -> Vec<Error> {
        self.scheduler
            .take_faults()
            .into_iter()
            .chain(self.activity.take_faults())
            .map(Error::Callback)
            .chain(self.speech.take_dropped().into_iter().map(Error::Audio))
            .collect()
    }

    // ── Accessors ───────────────────────────────────────────────────────

    #[must_use]
    pub fn screen(&self) -> &str {
        &self.screen
    }

    #[must_use]
    pub fn entry_screen(&self) -> &str {
        &self.entry_screen
    }

    #[must_use]
    pub fn is_on_entry_screen(&self) -> bool {
        self.screen == self.entry_screen
    }

    #[must_use]
    pub fn focused(&self) -> Option<ElementId> {
        self.cursor.current()
    }

    #[must_use]
    pub fn config(&self) -> &KioskConfig {
        &self.config
    }

    #[must_use]
    pub fn scheduler(&self) -> &TickScheduler {
        &self.scheduler
    }

    #[must_use]
    pub fn activity(&self) -> &UserActivityBroadcaster {
        &self.activity
    }

    #[must_use]
    pub fn idle(&self) -> &IdleSessionController {
        &self.idle
    }

    #[must_use]
    pub fn registry(&self) -> &ElementRegistry {
        &self.registry
    }

    /// Mount, unmount, or update elements. Focus on an unmounted element is
    /// dropped on the next input.
    pub fn registry_mut(&mut self) -> &mut ElementRegistry {
        &mut self.registry
    }

    #[must_use]
    pub fn modals(&self) -> &ModalFocusStack {
        &self.modals
    }

    #[must_use]
    pub fn speech(&self) -> &SpeechCoordinator<A> {
        &self.speech
    }

    pub fn speech_mut(&mut self) -> &mut SpeechCoordinator<A> {
        &mut self.speech
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiosk_core::clock::ManualClock;
    use kiosk_widgets::focus::ElementSpec;
    use kiosk_widgets::speech::MemoryAudio;

    fn shell() -> (KioskShell<MemoryAudio>, ManualClock) {
        let clock = ManualClock::new(1_000);
        let shell = KioskShell::new(Rc::new(clock.clone()), MemoryAudio::new());
        (shell, clock)
    }

    #[test]
    fn starts_on_entry_screen() {
        let (shell, _) = shell();
        assert_eq!(shell.screen(), "welcome");
        assert!(shell.is_on_entry_screen());
        assert!(shell.modals().gate().on_entry_screen());
        assert_eq!(shell.idle().phase(), IdlePhase::Active);
    }

    #[test]
    fn navigate_reports_screen_change_once() {
        let (mut shell, _) = shell();
        let events = shell.navigate_to("menu");
        assert_eq!(
            events,
            vec![ShellEvent::ScreenChanged {
                from: "welcome".into(),
                to: "menu".into()
            }]
        );
        assert!(!shell.modals().gate().on_entry_screen());
        assert!(shell.navigate_to("menu").is_empty());
    }

    #[test]
    fn click_focuses_only_focusable_targets() {
        let (mut shell, clock) = shell();
        let root = shell.registry_mut().mount_root(ElementSpec::container());
        let button = shell
            .registry_mut()
            .mount(root, ElementSpec::interactive("Start"))
            .unwrap();
        let now = clock.now_ms();

        let result = shell.handle_input(InputEvent::new(InputKind::Click, now).with_target(root));
        assert!(result.events.is_empty());
        assert_eq!(shell.focused(), None);

        let result = shell.handle_input(InputEvent::new(InputKind::Click, now).with_target(button));
        assert_eq!(shell.focused(), Some(button));
        assert!(matches!(result.events[0], ShellEvent::FocusMoved(_)));
    }

    #[test]
    fn unmounted_focus_is_dropped_on_next_input() {
        let (mut shell, clock) = shell();
        let root = shell.registry_mut().mount_root(ElementSpec::container());
        let a = shell
            .registry_mut()
            .mount(root, ElementSpec::interactive("A"))
            .unwrap();
        shell.handle_input(InputEvent::new(InputKind::Click, clock.now_ms()).with_target(a));
        shell.registry_mut().unmount(a);
        shell.handle_input(InputEvent::new(InputKind::KeyUp, clock.now_ms()));
        assert_eq!(shell.focused(), None);
    }

    #[test]
    fn unrelated_keys_are_not_consumed() {
        let (mut shell, clock) = shell();
        let key = KeyEvent::new(KeyCode::Char('x'));
        let result = shell.handle_input(InputEvent::key_down(key, clock.now_ms()));
        assert!(!result.consumed);
        let esc = KeyEvent::new(KeyCode::Escape);
        assert!(!shell.handle_input(InputEvent::key_down(esc, clock.now_ms())).consumed);
    }

    #[test]
    fn auto_advance_is_cancelled_by_navigation() {
        let (mut shell, clock) = shell();
        shell.navigate_to("receipt");
        shell.schedule_auto_advance("welcome", Some(5_000));
        assert_eq!(shell.auto_advance_remaining_seconds(), Some(5));
        shell.navigate_to("menu");
        assert_eq!(shell.auto_advance_remaining_seconds(), None);
        clock.advance(6_000);
        assert!(shell.pump().is_empty());
        assert_eq!(shell.screen(), "menu");
    }

    #[test]
    fn default_warning_message_uses_minutes_and_seconds() {
        assert_eq!(
            default_warning_message(20_000),
            "Are you still there? Your session ends in 0:20."
        );
    }
}
