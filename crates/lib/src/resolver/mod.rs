//! Deduplicated, memoized resolution of channel identities to display labels.
//!
//! The cache guarantees at most one resolution attempt per identity per page
//! lifetime. The in-flight window is covered by a `Pending` sentinel written
//! synchronously before the asynchronous lookup is issued, so concurrently
//! discovered messages from the same author defer to the first lookup instead
//! of duplicating it. Failures are cached as absent and never retried.

use std::{collections::HashMap, fmt, time::Duration};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{Result, constants::RESOLVE_TIMEOUT};

mod error;
pub mod feed;
pub mod relay;

pub use error::ResolverError;
pub use feed::FeedResolver;
pub use relay::{RelayRequest, RelayResolver, RelayResponse, RelayTransport};

/// Stable opaque identity of a message author's channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct ChannelId(String);

impl ChannelId {
    /// Creates a new ChannelId from any string-like input.
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Returns the identity as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ChannelId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ChannelId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for ChannelId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.0)
    }
}

/// The asynchronous black box that turns an identity into a label.
///
/// Implementations may fetch in-process ([`FeedResolver`]) or hop through a
/// privileged process when cross-origin policy blocks the direct request
/// ([`RelayResolver`]). `Ok(None)` means the lookup completed but found no
/// label; errors are treated identically by the caller.
#[async_trait]
pub trait LabelResolver: Send + Sync {
    /// Resolve a channel identity to a display label.
    async fn resolve_label(&self, channel_id: &ChannelId) -> Result<Option<String>>;
}

/// One slot of the resolver cache.
#[derive(Debug, Clone, PartialEq, Eq)]
enum CacheEntry {
    /// Fetch in flight; do not refetch.
    Pending,
    /// Lookup completed. `None` records a failed or empty resolution.
    Resolved(Option<String>),
}

/// Outcome of consulting the cache for an identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLookup {
    /// A completed entry exists; no lookup may be issued.
    Hit(Option<String>),
    /// A lookup for this identity is already in flight; defer.
    Pending,
    /// First sight of this identity. The slot is now marked pending and the
    /// caller is responsible for issuing exactly one lookup.
    Miss,
}

/// Mapping from channel identity to resolution state.
///
/// Entries are never evicted; identity cardinality is small relative to a
/// single session. The cache is owned by the engine's single execution
/// context, so no internal locking is needed.
#[derive(Debug, Default)]
pub struct ResolverCache {
    entries: HashMap<ChannelId, CacheEntry>,
}

impl ResolverCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Consult the cache for an identity.
    ///
    /// On first sight the slot is atomically marked `Pending` before this
    /// call returns: there is no suspension point between "check cache" and
    /// "mark pending", which is the sole concurrency-control device keeping
    /// lookups deduplicated.
    pub fn begin(&mut self, channel_id: &ChannelId) -> CacheLookup {
        match self.entries.get(channel_id) {
            Some(CacheEntry::Resolved(label)) => CacheLookup::Hit(label.clone()),
            Some(CacheEntry::Pending) => CacheLookup::Pending,
            None => {
                self.entries.insert(channel_id.clone(), CacheEntry::Pending);
                CacheLookup::Miss
            }
        }
    }

    /// Record the outcome of the lookup issued after a [`CacheLookup::Miss`].
    pub fn fill(&mut self, channel_id: &ChannelId, label: Option<String>) {
        self.entries
            .insert(channel_id.clone(), CacheEntry::Resolved(label));
    }

    /// Peek at a completed entry without touching pending state.
    pub fn get(&self, channel_id: &ChannelId) -> Option<Option<&str>> {
        match self.entries.get(channel_id) {
            Some(CacheEntry::Resolved(label)) => Some(label.as_deref()),
            _ => None,
        }
    }

    /// Number of identities ever seen (pending or resolved).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the cache has seen no identities yet.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Run a resolver under the standard 8 second bound.
///
/// Timeouts and resolver errors both collapse to "no label"; the caller
/// caches that as absent and moves on.
pub async fn resolve_with_timeout(
    resolver: &dyn LabelResolver,
    channel_id: &ChannelId,
) -> Option<String> {
    resolve_with_deadline(resolver, channel_id, RESOLVE_TIMEOUT).await
}

/// Like [`resolve_with_timeout`] with an explicit bound.
pub async fn resolve_with_deadline(
    resolver: &dyn LabelResolver,
    channel_id: &ChannelId,
    deadline: Duration,
) -> Option<String> {
    match tokio::time::timeout(deadline, resolver.resolve_label(channel_id)).await {
        Ok(Ok(label)) => label,
        Ok(Err(e)) => {
            warn!(channel_id = %channel_id, "label lookup failed: {e}");
            None
        }
        Err(_) => {
            warn!(channel_id = %channel_id, "label lookup timed out after {deadline:?}");
            None
        }
    }
}
