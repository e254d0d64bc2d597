//! Invalidation handlers and panic-isolated dispatch.

use crate::error::InvalidatorError;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

/// Receives the name of every key that changed.
///
/// Implemented for any `Fn(&str) + Send + Sync + 'static`, so a closure is
/// usually enough:
///
/// ```rust
/// use keyspace_invalidator::notify::InvalidationHandler;
///
/// fn assert_handler<H: InvalidationHandler>(_: H) {}
/// assert_handler(|key: &str| println!("evict {key}"));
/// ```
///
/// The handler runs on the receive loop: the next notification is not read
/// until it returns, so slow handlers throttle throughput.
pub trait InvalidationHandler: Send + Sync + 'static {
    /// Invalidate `key`.
    fn invalidate(&self, key: &str);
}

impl<F> InvalidationHandler for F
where
    F: Fn(&str) + Send + Sync + 'static,
{
    fn invalidate(&self, key: &str) {
        self(key)
    }
}

/// Call `handler` for `key`, converting a panic into `InvalidatorError::Handler`.
pub(crate) fn dispatch<H: InvalidationHandler + ?Sized>(
    handler: &H,
    key: &str,
) -> std::result::Result<(), InvalidatorError> {
    panic::catch_unwind(AssertUnwindSafe(|| handler.invalidate(key)))
        .map_err(|payload| InvalidatorError::Handler(panic_message(payload.as_ref())))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "handler panicked".to_string()
    }
}
