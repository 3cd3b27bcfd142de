//! Display formatting for author names.
//!
//! The formatter is a pure mapping from (original name, resolved label,
//! display mode) to the rendered string. Applying it to a chip is idempotent:
//! the same inputs always produce the same visible text and the same stored
//! attributes, so re-renders and repeated fan-outs are safe.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    Result,
    constants::{ATTR_CHANNEL_HANDLE, ATTR_HANDLE_MODIFIED, ATTR_ORIGINAL_NAME, AUTHOR_NAME_TAG},
    dom::{ChatDom, MessageKind, NodeId, find_author_chip},
};

/// How an author's name is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayMode {
    /// Original name only.
    Name,
    /// Resolved label only, falling back to the name when none was found.
    Handle,
    /// `"name (label)"` when a label was found, the name alone otherwise.
    #[default]
    Both,
}

/// Error parsing a display-mode string.
#[derive(Debug, Error)]
#[error("unknown display mode: {0}")]
pub struct DisplayModeError(String);

impl FromStr for DisplayMode {
    type Err = DisplayModeError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "name" => Ok(DisplayMode::Name),
            "handle" => Ok(DisplayMode::Handle),
            "both" => Ok(DisplayMode::Both),
            other => Err(DisplayModeError(other.to_string())),
        }
    }
}

impl fmt::Display for DisplayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DisplayMode::Name => "name",
            DisplayMode::Handle => "handle",
            DisplayMode::Both => "both",
        };
        write!(f, "{s}")
    }
}

/// Map (mode, original name, resolved label) to the rendered string.
///
/// A missing label always falls back to the original name; the formatter
/// never produces a blank display.
pub fn format_display_name(mode: DisplayMode, original: &str, label: Option<&str>) -> String {
    match (mode, label) {
        (DisplayMode::Name, _) => original.to_string(),
        (DisplayMode::Handle, Some(label)) => label.to_string(),
        (DisplayMode::Both, Some(label)) => format!("{original} ({label})"),
        (_, None) => original.to_string(),
    }
}

/// Write the formatted name into a chip and mark it patched.
///
/// Caches `originalName` and `channelHandle` (empty string when no label) on
/// the chip so later mode changes can re-format without re-fetching. Returns
/// `Ok(false)` when the chip has no name element to write into.
pub fn apply_label(
    dom: &ChatDom,
    chip: NodeId,
    original: &str,
    label: Option<&str>,
    mode: DisplayMode,
) -> Result<bool> {
    let Some(name_el) = dom.find_descendant(chip, AUTHOR_NAME_TAG)? else {
        return Ok(false);
    };

    dom.set_text(name_el, format_display_name(mode, original, label))?;
    dom.dataset_set(chip, ATTR_HANDLE_MODIFIED, "true")?;
    dom.dataset_set(chip, ATTR_ORIGINAL_NAME, original)?;
    dom.dataset_set(chip, ATTR_CHANNEL_HANDLE, label.unwrap_or(""))?;
    Ok(true)
}

/// Re-format every already-patched message under `root` for a new mode.
///
/// Works purely from the chips' cached attributes: zero lookups, and chips
/// that were never patched (no `originalName`) are left untouched. Returns
/// the number of chips rewritten.
pub fn reformat_all(dom: &ChatDom, root: NodeId, mode: DisplayMode) -> Result<usize> {
    let mut updated = 0;
    for kind in MessageKind::ALL {
        for node in dom.find_descendants(root, kind.tag())? {
            match reformat_node(dom, node, mode) {
                Ok(true) => updated += 1,
                Ok(false) => {}
                // The host may evict a message between the sweep and the
                // rewrite; that is a skip, not a failure.
                Err(e) if e.is_node_gone() => {}
                Err(e) => return Err(e),
            }
        }
    }
    Ok(updated)
}

fn reformat_node(dom: &ChatDom, node: NodeId, mode: DisplayMode) -> Result<bool> {
    let Some(chip) = find_author_chip(dom, node)? else {
        return Ok(false);
    };
    let Some(original) = dom.dataset_get(chip, ATTR_ORIGINAL_NAME)? else {
        return Ok(false);
    };
    let handle = dom.dataset_get(chip, ATTR_CHANNEL_HANDLE)?.unwrap_or_default();
    let label = (!handle.is_empty()).then_some(handle.as_str());
    apply_label(dom, chip, &original, label, mode)
}
