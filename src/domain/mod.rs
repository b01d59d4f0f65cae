//! Domain layer: subscription model, wire messages and environment signals.

pub mod environment;
pub mod message;
pub mod subscription_config;
pub mod subscription_id;

pub use environment::{EnvironmentBus, EnvironmentSignal, Network, Visibility};
pub use message::{
    ChangeOperation, DEFAULT_MAX_MESSAGE_BYTES, Message, parse, parse_with_limit,
};
pub use subscription_config::SubscriptionConfig;
pub use subscription_id::SubscriptionId;
