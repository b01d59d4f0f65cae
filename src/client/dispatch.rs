//! Pure state-transition function for parsed messages.
//!
//! | Current state            | Message    | Next state | Effects                                   |
//! |--------------------------|------------|------------|-------------------------------------------|
//! | any                      | connection | Connected  | reset attempts, clear error, notify       |
//! | Connected                | change     | Connected  | invalidate `(collection, operation, data)`|
//! | any                      | heartbeat  | unchanged  | liveness only                             |
//! | any                      | error      | unchanged  | log diagnostic                            |
//!
//! Every other combination is a no-op. The manager applies the returned
//! effects; nothing here touches a transport or a timer.

use crate::domain::{ChangeOperation, Message};

use super::state::ConnectionState;

/// Side effect requested by [`transition`].
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Set the reconnect attempt counter to zero.
    ResetAttempts,
    /// Drop the reported error.
    ClearError,
    /// Call the consumer's `on_connect`.
    NotifyConnect,
    /// The stream proved it is alive; re-arm the liveness watchdog.
    Liveness,
    /// Tell the cache that `collection` may be stale.
    Invalidate {
        /// Collection to invalidate.
        collection: String,
        /// Operation that triggered it.
        operation: ChangeOperation,
        /// Opaque payload.
        data: serde_json::Value,
    },
    /// Log a producer-side diagnostic.
    LogDiagnostic(serde_json::Value),
}

/// Result of feeding one message to the state machine.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    /// State after the message.
    pub state: ConnectionState,
    /// Effects to apply, in order.
    pub effects: Vec<Effect>,
}

impl Transition {
    fn unchanged(state: ConnectionState) -> Self {
        Self {
            state,
            effects: Vec::new(),
        }
    }
}

/// Computes the next state and effects for `message` received in `state`.
#[must_use]
pub fn transition(state: ConnectionState, message: &Message) -> Transition {
    match message {
        Message::Connection { .. } => Transition {
            state: ConnectionState::Connected,
            effects: vec![
                Effect::ResetAttempts,
                Effect::ClearError,
                Effect::Liveness,
                Effect::NotifyConnect,
            ],
        },
        Message::Change {
            collection,
            operation,
            data,
            ..
        } if state == ConnectionState::Connected => Transition {
            state,
            effects: vec![
                Effect::Liveness,
                Effect::Invalidate {
                    collection: collection.clone(),
                    operation: *operation,
                    data: data.clone(),
                },
            ],
        },
        Message::Heartbeat { .. } => Transition {
            state,
            effects: vec![Effect::Liveness],
        },
        Message::Error { data, .. } => Transition {
            state,
            effects: vec![Effect::LogDiagnostic(data.clone())],
        },
        Message::Change { .. } | Message::Unknown { .. } => Transition::unchanged(state),
    }
}
