//! # collection-stream
//!
//! Real-time update client for collection-oriented backends.
//!
//! A server publishes one event per change to a set of named collections
//! over a long-lived server-sent-events stream. This crate keeps exactly
//! one such stream open per subscription, recovers from failures with
//! bounded exponential backoff, reacts to host visibility and network
//! signals, and turns `change` events into cache invalidations.
//!
//! ## Architecture
//!
//! ```text
//! Application
//!     │
//!     ├── Subscription (client/)      ── snapshot (watch), force_reconnect
//!     │       ├── EnvironmentWatchers ── EnvironmentBus (domain/)
//!     │       └── ConnectionManager   ── ReconnectPolicy, dispatch
//!     │
//!     ├── Message model (domain/)
//!     │
//!     └── Transport (transport/)      ── HttpTransport (SSE), MockTransport
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use collection_stream::client::Subscription;
//! use collection_stream::domain::{ChangeOperation, SubscriptionConfig};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let endpoint: reqwest::Url = "http://localhost:3000/api/stream".parse()?;
//! let config = SubscriptionConfig::new(["expenses", "subscriptions"])?.with_subject("user-1");
//! let subscription = Subscription::builder(endpoint, config)
//!     .invalidator(|collection: &str, _: ChangeOperation, _: &serde_json::Value| {
//!         println!("refetch {collection}");
//!     })
//!     .spawn();
//! # subscription.close().await;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod domain;
pub mod error;
pub mod transport;
