//! What a client wants to hear about.
//!
//! A [`SubscriptionConfig`] is the (collections, subject id, enabled) tuple.
//! It is immutable for the lifetime of a connection; the only field a running
//! facade may change is `enabled`, through
//! [`crate::client::Subscription::set_enabled`].

use std::collections::BTreeSet;

use reqwest::Url;

use crate::error::ConfigError;

/// Query parameter carrying the comma-separated collection list.
pub const COLLECTIONS_PARAM: &str = "collections";

/// Query parameter carrying the optional subject filter.
pub const SUBJECT_PARAM: &str = "userId";

/// Subscription request sent to the producer as query parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionConfig {
    /// Collection names. Never empty; kept sorted so the URL is stable.
    collections: BTreeSet<String>,
    /// Optional user/tenant scope.
    subject_id: Option<String>,
    /// When false no connection is attempted.
    enabled: bool,
}

impl SubscriptionConfig {
    /// Builds an enabled subscription for the given collections.
    ///
    /// Names are trimmed and deduplicated; blank names are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if no non-blank collection name
    /// remains.
    pub fn new<I, S>(collections: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let collections: BTreeSet<String> = collections
            .into_iter()
            .map(|c| c.as_ref().trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();
        if collections.is_empty() {
            return Err(ConfigError::Invalid {
                key: "collections",
                reason: "at least one collection is required".to_string(),
            });
        }
        Ok(Self {
            collections,
            subject_id: None,
            enabled: true,
        })
    }

    /// Scopes the subscription to one subject. Blank ids clear the scope.
    #[must_use]
    pub fn with_subject(mut self, subject_id: impl Into<String>) -> Self {
        let subject_id = subject_id.into();
        self.subject_id = (!subject_id.trim().is_empty()).then_some(subject_id);
        self
    }

    /// Sets the initial `enabled` flag.
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Subscribed collection names in sorted order.
    #[must_use]
    pub const fn collections(&self) -> &BTreeSet<String> {
        &self.collections
    }

    /// Subject filter, if any.
    #[must_use]
    pub fn subject_id(&self) -> Option<&str> {
        self.subject_id.as_deref()
    }

    /// Whether a connection should be held open.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub(crate) fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Returns `true` if `collection` is one of the subscribed names.
    #[must_use]
    pub fn matches(&self, collection: &str) -> bool {
        self.collections.contains(collection)
    }

    /// Builds the stream address: `endpoint?collections=a,b[&userId=..]`.
    ///
    /// Existing query pairs on `endpoint` are preserved.
    #[must_use]
    pub fn stream_url(&self, endpoint: &Url) -> Url {
        let mut url = endpoint.clone();
        let joined = self
            .collections
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(",");
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair(COLLECTIONS_PARAM, &joined);
            if let Some(subject) = &self.subject_id {
                pairs.append_pair(SUBJECT_PARAM, subject);
            }
        }
        url
    }
}
