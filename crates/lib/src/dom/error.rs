//! Error types for the render-tree module.

use thiserror::Error;

use super::NodeId;

/// Errors that can occur while reading or annotating the render tree.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DomError {
    /// The node is no longer part of the tree. The host evicts nodes when the
    /// chat buffer trims old messages, so callers usually treat this as a skip.
    #[error("node not found: {id:?}")]
    NodeNotFound { id: NodeId },

    /// The structural watch stream has already been handed out. Only one
    /// consumer may observe a document's mutations.
    #[error("mutation watch already taken")]
    WatchAlreadyTaken,
}

impl DomError {
    /// Check if this error indicates an evicted or unknown node.
    pub fn is_not_found(&self) -> bool {
        matches!(self, DomError::NodeNotFound { .. })
    }
}
