//! Consumer-facing callback seams.
//!
//! Both traits are invoked from the subscription's driver task. Calls are
//! guarded: a panicking consumer is logged and the connection carries on.

use std::panic::{AssertUnwindSafe, catch_unwind};

use crate::domain::{ChangeOperation, Message};
use crate::error::StreamError;

/// Optional lifecycle callbacks. Every method defaults to a no-op.
pub trait SubscriptionListener: Send + Sync {
    /// Every successfully parsed message, after internal handling.
    fn on_message(&self, _message: &Message) {}

    /// Every error reported to the snapshot.
    fn on_error(&self, _error: &StreamError) {}

    /// The producer confirmed the subscription.
    fn on_connect(&self) {}

    /// A confirmed connection went away.
    fn on_disconnect(&self) {}
}

/// Listener that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopListener;

impl SubscriptionListener for NoopListener {}

/// Cache hook called once per relevant `change` message.
///
/// Must tolerate redundant calls: delivery is at-least-once and carries no
/// ordering guarantee across reconnections.
pub trait CacheInvalidator: Send + Sync {
    /// Marks `collection` stale.
    fn invalidate(&self, collection: &str, operation: ChangeOperation, data: &serde_json::Value);
}

impl<F> CacheInvalidator for F
where
    F: Fn(&str, ChangeOperation, &serde_json::Value) + Send + Sync,
{
    fn invalidate(&self, collection: &str, operation: ChangeOperation, data: &serde_json::Value) {
        self(collection, operation, data);
    }
}

/// Runs a consumer callback, swallowing any panic.
pub(crate) fn guarded(callback: &'static str, f: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(f)).is_err() {
        tracing::error!(callback, "consumer callback panicked");
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn closures_are_invalidators() {
        let hits = AtomicUsize::new(0);
        let invalidate = |collection: &str, _op: ChangeOperation, _data: &serde_json::Value| {
            assert_eq!(collection, "orders");
            hits.fetch_add(1, Ordering::SeqCst);
        };
        invalidate.invalidate("orders", ChangeOperation::Delete, &serde_json::Value::Null);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn guarded_swallows_panics() {
        guarded("test", || panic!("consumer bug"));
        let mut ran = false;
        guarded("test", || ran = true);
        assert!(ran);
    }
}
