#![forbid(unsafe_code)]

//! Callback fault isolation.
//!
//! Shared notify loops (ticks, activity) invoke callbacks owned by many
//! independent consumers. A panicking consumer is caught here, logged, and
//! reported as a [`CallbackFault`]; the loop continues with the next one.

use std::any::Any;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};

/// A consumer callback panicked inside a shared notify loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackFault {
    /// Which loop caught it (`"tick"`, `"activity"`, ...).
    pub source: &'static str,
    /// Subscriber identifier within that loop.
    pub subscriber: u64,
    /// Panic payload rendered as text.
    pub message: String,
}

impl fmt::Display for CallbackFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} subscriber {} panicked: {}",
            self.source, self.subscriber, self.message
        )
    }
}

impl std::error::Error for CallbackFault {}

/// Run `f`, converting a panic into a logged [`CallbackFault`].
pub fn isolate<F: FnOnce()>(source: &'static str, subscriber: u64, f: F) -> Result<(), CallbackFault> {
    catch_unwind(AssertUnwindSafe(f)).map_err(|payload| {
        let fault = CallbackFault {
            source,
            subscriber,
            message: panic_message(payload.as_ref()),
        };
        tracing::error!(
            source = fault.source,
            subscriber = fault.subscriber,
            message = %fault.message,
            "callback panicked; continuing with remaining subscribers"
        );
        fault
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
