//! Constants used throughout the chatlens library.
//!
//! This module provides central definitions for the render-surface tag names,
//! chip attribute keys, and lookup parameters shared across modules.

use std::time::Duration;

/// Ordered candidate root selectors, accounting for the different hosting
/// surfaces (main site chat app vs. the embedded/studio iframe renderer).
/// First match wins.
pub const CHAT_ROOT_SELECTORS: &[&str] = &["yt-live-chat-app", "yt-live-chat-renderer"];

/// Tag of a plain text chat message renderer.
pub const TEXT_MESSAGE_TAG: &str = "yt-live-chat-text-message-renderer";

/// Tag of a paid ("super") chat message renderer.
pub const PAID_MESSAGE_TAG: &str = "yt-live-chat-paid-message-renderer";

/// Tag of a membership event renderer.
pub const MEMBERSHIP_ITEM_TAG: &str = "yt-live-chat-membership-item-renderer";

/// Tag of a paid sticker renderer.
pub const PAID_STICKER_TAG: &str = "yt-live-chat-paid-sticker-renderer";

/// Tag of the chip element rendering one author's name within a message.
pub const AUTHOR_CHIP_TAG: &str = "yt-live-chat-author-chip";

/// Tag of the text element inside a chip that carries the rendered name.
pub const AUTHOR_NAME_TAG: &str = "author-name";

/// Chip attribute marking a node as already patched.
pub const ATTR_HANDLE_MODIFIED: &str = "handleModified";

/// Chip attribute caching the unmodified author name.
pub const ATTR_ORIGINAL_NAME: &str = "originalName";

/// Chip attribute caching the resolved label (empty string when none found).
pub const ATTR_CHANNEL_HANDLE: &str = "channelHandle";

/// Base URL of the per-identity feed queried by the raw external lookup.
pub const FEED_URL_BASE: &str = "https://www.youtube.com/feeds/videos.xml";

/// Upper bound on any single resolution attempt. The relay hop has no other
/// timeout, and a hung request must not block its cache slot forever.
pub const RESOLVE_TIMEOUT: Duration = Duration::from_secs(8);
