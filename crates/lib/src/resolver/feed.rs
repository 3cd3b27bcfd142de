//! Raw external lookup against the per-identity feed URL.
//!
//! Used when the page context is allowed to reach the feed origin directly.
//! The label is the contents of the first well-formed `<title>` element of
//! the returned document; a non-success status or a parse miss yields no
//! label.

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{ChannelId, LabelResolver};
use crate::{Result, constants::FEED_URL_BASE};

/// Resolver that fetches the channel's public feed over HTTP.
pub struct FeedResolver {
    client: reqwest::Client,
    base_url: String,
}

impl Default for FeedResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl FeedResolver {
    /// Create a resolver against the standard feed endpoint.
    pub fn new() -> Self {
        Self::with_base_url(FEED_URL_BASE)
    }

    /// Create a resolver against an alternate endpoint.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    /// The feed URL queried for an identity.
    pub fn feed_url(&self, channel_id: &ChannelId) -> String {
        format!("{}?channel_id={}", self.base_url, channel_id)
    }
}

#[async_trait]
impl LabelResolver for FeedResolver {
    async fn resolve_label(&self, channel_id: &ChannelId) -> Result<Option<String>> {
        let url = self.feed_url(channel_id);
        debug!(channel_id = %channel_id, "fetching channel feed");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(super::ResolverError::Request)?;

        if !response.status().is_success() {
            warn!(
                channel_id = %channel_id,
                status = %response.status(),
                "feed fetch returned non-success status"
            );
            return Ok(None);
        }

        let body = response.text().await.map_err(super::ResolverError::Request)?;
        Ok(extract_feed_title(&body).map(str::to_string))
    }
}

/// Extract the contents of the first well-formed `<title>` element.
///
/// The content runs up to the next `<`, which must open the closing tag, and
/// must be non-empty. Candidates that fail those checks (empty or containing
/// nested markup) are skipped and the scan continues forward.
pub(crate) fn extract_feed_title(body: &str) -> Option<&str> {
    let mut rest = body;
    while let Some(at) = rest.find("<title>") {
        let content = &rest[at + "<title>".len()..];
        if let Some(end) = content.find('<')
            && end > 0
            && content[end..].starts_with("</title>")
        {
            return Some(&content[..end]);
        }
        rest = content;
    }
    None
}
