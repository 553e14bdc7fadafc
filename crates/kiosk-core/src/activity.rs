#![forbid(unsafe_code)]

//! Canonical user-activity signal.
//!
//! Raw input arrives in many shapes (key press and release, pointer and touch
//! press and release, clicks). [`UserActivityBroadcaster`] sees every raw
//! event first, before any other handler, and republishes the activity kinds
//! as a single [`ActivitySignal`]. Consumers that care about "the user is
//! here" subscribe to that signal only, so every activity-driven reset in the
//! application observes identical timing.
//!
//! # Invariants
//!
//! 1. Only kinds with [`InputKind::is_activity`] produce a signal.
//! 2. Subscribers are notified in registration order.
//! 3. Dropping an [`ActivitySubscription`] guard unsubscribes; dead entries
//!    are pruned lazily on the next broadcast.
//! 4. A panicking subscriber is logged and skipped; the others still run.
//! 5. Subscribing or publishing from inside a subscriber is allowed.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::event::{InputEvent, InputKind, Millis};
use crate::fault::{CallbackFault, isolate};

/// One canonical activity event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivitySignal {
    /// The raw kind that produced this signal.
    pub source: InputKind,
    /// When the raw event happened (epoch ms).
    pub timestamp: Millis,
}

impl ActivitySignal {
    /// Name of the raw event type, e.g. `"pointerdown"`.
    #[must_use]
    pub fn source_event_type(&self) -> &'static str {
        self.source.as_str()
    }
}

type ListenerRc = Rc<dyn Fn(&ActivitySignal)>;
type ListenerWeak = Weak<dyn Fn(&ActivitySignal)>;

struct Inner {
    listeners: Vec<(u64, ListenerWeak)>,
    next_id: u64,
    last: Option<ActivitySignal>,
    published: u64,
    faults: Vec<CallbackFault>,
}

/// Normalizes raw input into one activity signal and fans it out.
///
/// Cloning creates another handle to the same broadcaster.
#[derive(Clone)]
pub struct UserActivityBroadcaster {
    inner: Rc<RefCell<Inner>>,
}

impl Default for UserActivityBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for UserActivityBroadcaster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("UserActivityBroadcaster")
            .field("listeners", &inner.listeners.len())
            .field("published", &inner.published)
            .field("last", &inner.last)
            .finish()
    }
}

impl UserActivityBroadcaster {
    /// Create a broadcaster with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                listeners: Vec::new(),
                next_id: 0,
                last: None,
                published: 0,
                faults: Vec::new(),
            })),
        }
    }

    /// Capture-phase hook: inspect a raw event and broadcast it if it is
    /// activity. Returns the signal that was published, if any.
    pub fn capture(&self, event: &InputEvent) -> Option<ActivitySignal> {
        if !event.kind.is_activity() {
            return None;
        }
        let signal = ActivitySignal {
            source: event.kind,
            timestamp: event.timestamp,
        };
        self.publish(signal);
        Some(signal)
    }

    /// Broadcast a signal to every live subscriber.
    pub fn publish(&self, signal: ActivitySignal) {
        let listeners: Vec<(u64, ListenerRc)> = {
            let mut inner = self.inner.borrow_mut();
            inner.last = Some(signal);
            inner.published += 1;
            inner.listeners.retain(|(_, w)| w.strong_count() > 0);
            inner
                .listeners
                .iter()
                .filter_map(|(id, w)| w.upgrade().map(|cb| (*id, cb)))
                .collect()
        };

        tracing::trace!(
            source = signal.source.as_str(),
            timestamp = signal.timestamp,
            listeners = listeners.len(),
            "activity"
        );

        for (id, cb) in listeners {
            if let Err(fault) = isolate("activity", id, || cb(&signal)) {
                self.inner.borrow_mut().faults.push(fault);
            }
        }
    }

    /// Subscribe to activity signals.
    ///
    /// The callback stays registered for as long as the returned guard lives.
    pub fn subscribe(&self, callback: impl Fn(&ActivitySignal) + 'static) -> ActivitySubscription {
        let strong: ListenerRc = Rc::new(callback);
        let mut inner = self.inner.borrow_mut();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.listeners.push((id, Rc::downgrade(&strong)));
        ActivitySubscription { id, _guard: strong }
    }

    /// The most recent signal, if any.
    #[must_use]
    pub fn last_signal(&self) -> Option<ActivitySignal> {
        self.inner.borrow().last
    }

    /// Total number of signals published.
    #[must_use]
    pub fn published_count(&self) -> u64 {
        self.inner.borrow().published
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .borrow()
            .listeners
            .iter()
            .filter(|(_, w)| w.strong_count() > 0)
            .count()
    }

    /// Drain faults caught since the last call.
    pub fn take_faults(&self) -> Vec<CallbackFault> {
        std::mem::take(&mut self.inner.borrow_mut().faults)
    }
}

/// RAII guard for an activity subscriber.
pub struct ActivitySubscription {
    id: u64,
    _guard: ListenerRc,
}

impl ActivitySubscription {
    /// Subscriber identifier (as reported in faults).
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl fmt::Debug for ActivitySubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActivitySubscription")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}
