//! Tunables for one subscription.

use std::time::Duration;

use super::policy::ReconnectPolicy;
use crate::domain::DEFAULT_MAX_MESSAGE_BYTES;

/// Default pause between `force_reconnect` and the new attempt.
pub const DEFAULT_FORCE_RECONNECT_DELAY: Duration = Duration::from_millis(100);

/// Client behaviour knobs. [`Default`] matches production settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientOptions {
    /// Backoff and retry limit.
    pub policy: ReconnectPolicy,
    /// Delay before reopening after `force_reconnect`, so a manual retry
    /// never reopens synchronously.
    pub force_reconnect_delay: Duration,
    /// Treat the stream as dead if no message arrives for this long.
    /// `None` relies on transport errors alone.
    pub liveness_timeout: Option<Duration>,
    /// Frames larger than this are discarded as malformed.
    pub max_message_bytes: usize,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            policy: ReconnectPolicy::default(),
            force_reconnect_delay: DEFAULT_FORCE_RECONNECT_DELAY,
            liveness_timeout: None,
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
        }
    }
}
