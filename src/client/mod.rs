//! Real-time update client.
//!
//! ```text
//! Subscription (facade, driver task)
//!     │
//!     ├── EnvironmentWatchers ── visibility / network signals
//!     │
//!     └── ConnectionManager ──── single transport handle + timers
//!             ├── dispatch (pure transition table)
//!             └── ReconnectPolicy (pure backoff)
//! ```

pub mod dispatch;
pub mod listener;
pub mod manager;
pub mod options;
pub mod policy;
pub mod state;
pub mod subscription;
pub mod watchers;

pub use listener::{CacheInvalidator, NoopListener, SubscriptionListener};
pub use manager::{ConnectionManager, TimerKind};
pub use options::ClientOptions;
pub use policy::ReconnectPolicy;
pub use state::{ConnectionSnapshot, ConnectionState};
pub use subscription::{Subscription, SubscriptionBuilder};
