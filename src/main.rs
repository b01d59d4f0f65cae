//! collection-stream entry point.
//!
//! Subscribes to the configured collections and logs every invalidation
//! and connection state change until Ctrl-C.

use collection_stream::client::{Subscription, SubscriptionListener};
use collection_stream::config::{LogFormat, StreamConfig};
use collection_stream::domain::{ChangeOperation, Message};
use collection_stream::error::StreamError;
use tracing_subscriber::EnvFilter;

/// Logs lifecycle callbacks.
#[derive(Debug)]
struct LoggingListener;

impl SubscriptionListener for LoggingListener {
    fn on_message(&self, message: &Message) {
        tracing::trace!(kind = message.kind(), "message");
    }

    fn on_error(&self, error: &StreamError) {
        tracing::warn!(code = error.error_code(), %error, "stream error");
    }

    fn on_connect(&self) {
        tracing::info!("subscription live");
    }

    fn on_disconnect(&self) {
        tracing::info!("subscription lost");
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = StreamConfig::from_env()?;
    init_tracing(config.log_format);
    tracing::info!(
        endpoint = %config.endpoint,
        collections = ?config.subscription.collections(),
        "starting collection-stream"
    );

    let subscription = Subscription::builder(config.endpoint, config.subscription)
        .options(config.options)
        .listener(LoggingListener)
        .invalidator(|collection: &str, operation: ChangeOperation, _: &serde_json::Value| {
            tracing::info!(collection, operation = operation.as_str(), "invalidate");
        })
        .spawn();

    let mut updates = subscription.watch();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = updates.borrow_and_update().clone();
                tracing::info!(
                    state = %snapshot.state,
                    attempts = snapshot.reconnect_attempts,
                    retry = ?snapshot.retry_delay,
                    "connection state"
                );
                if snapshot.is_failed() {
                    tracing::error!("connection lost; restart or send SIGINT");
                }
            }
        }
    }

    tracing::info!("shutting down");
    subscription.close().await;
    Ok(())
}
