//! Type-safe subscription identifier.
//!
//! [`SubscriptionId`] tags every facade instance so that log lines from
//! concurrently running subscriptions can be told apart.

use std::fmt;

/// Unique identifier for one subscription facade instance.
///
/// Wraps a UUID v4 generated when the subscription is spawned. It lives
/// exactly as long as the facade and is attached to the driver's tracing
/// span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(uuid::Uuid);

impl SubscriptionId {
    /// Creates a new random `SubscriptionId` (UUID v4).
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Returns the inner [`uuid::Uuid`].
    #[must_use]
    pub const fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
