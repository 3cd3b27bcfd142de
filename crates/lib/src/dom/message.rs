//! Message-node classification and author extraction.
//!
//! A chat message node is one of several renderer kinds, carries an attached
//! data record describing its author, and contains an author chip child that
//! renders the name. Host-framework versions vary both the attachment point
//! of the data record and the exact shape of its fields, so everything here
//! is shape-checked and yields an `Option` instead of trusting the host.

use serde_json::Value;

use super::{ChatDom, NodeId};
use crate::{
    Result,
    constants::{
        ATTR_HANDLE_MODIFIED, AUTHOR_CHIP_TAG, MEMBERSHIP_ITEM_TAG, PAID_MESSAGE_TAG,
        PAID_STICKER_TAG, TEXT_MESSAGE_TAG,
    },
    resolver::ChannelId,
};

/// The qualifying chat-message renderer kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Plain text message.
    Text,
    /// Paid ("super") message.
    Paid,
    /// Membership event.
    Membership,
    /// Paid sticker.
    Sticker,
}

impl MessageKind {
    /// Every qualifying kind, in sweep order.
    pub const ALL: [MessageKind; 4] = [
        MessageKind::Text,
        MessageKind::Paid,
        MessageKind::Membership,
        MessageKind::Sticker,
    ];

    /// Classify an element tag. Non-message elements yield `None`.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            TEXT_MESSAGE_TAG => Some(MessageKind::Text),
            PAID_MESSAGE_TAG => Some(MessageKind::Paid),
            MEMBERSHIP_ITEM_TAG => Some(MessageKind::Membership),
            PAID_STICKER_TAG => Some(MessageKind::Sticker),
            _ => None,
        }
    }

    /// The element tag for this kind.
    pub fn tag(&self) -> &'static str {
        match self {
            MessageKind::Text => TEXT_MESSAGE_TAG,
            MessageKind::Paid => PAID_MESSAGE_TAG,
            MessageKind::Membership => MEMBERSHIP_ITEM_TAG,
            MessageKind::Sticker => PAID_STICKER_TAG,
        }
    }
}

/// Author identity extracted from a message node's attached data record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorInfo {
    /// The rendered author name (`authorName.simpleText`).
    pub name: String,
    /// The stable channel identity (`authorExternalChannelId`).
    pub channel_id: ChannelId,
}

impl AuthorInfo {
    /// Shape-check a raw attached data record.
    fn from_value(data: &Value) -> Option<Self> {
        let name = data.get("authorName")?.get("simpleText")?.as_str()?;
        let channel_id = data.get("authorExternalChannelId")?.as_str()?;
        if name.is_empty() || channel_id.is_empty() {
            return None;
        }
        Some(AuthorInfo {
            name: name.to_string(),
            channel_id: ChannelId::from(channel_id),
        })
    }
}

/// Extract the author identity from a message node.
///
/// Tries both known attachment points of the data record. Returns `Ok(None)`
/// for any malformed or unsupported shape; those are expected to occur and
/// must never halt the watch.
pub fn parse_author_info(dom: &ChatDom, node: NodeId) -> Result<Option<AuthorInfo>> {
    let Some(data) = dom.attached_data(node)? else {
        return Ok(None);
    };
    Ok(AuthorInfo::from_value(&data))
}

/// Locate the author-chip child of a message node.
///
/// System and announcement messages have no chip; those yield `Ok(None)`.
pub fn find_author_chip(dom: &ChatDom, node: NodeId) -> Result<Option<NodeId>> {
    dom.find_descendant(node, AUTHOR_CHIP_TAG)
}

/// Check the "already patched" marker on a chip.
pub fn chip_is_patched(dom: &ChatDom, chip: NodeId) -> Result<bool> {
    Ok(dom.dataset_get(chip, ATTR_HANDLE_MODIFIED)?.is_some())
}
