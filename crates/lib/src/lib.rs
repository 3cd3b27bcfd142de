//!
//! Chatlens: an incremental augmentation engine for live-chat render trees.
//! It discovers newly rendered chat message nodes, resolves each author's
//! channel identity to a display label through a deduplicated asynchronous
//! lookup, and rewrites the visible author name without flicker, duplicate
//! fetches, or stale text.
//!
//! ## Core Concepts
//!
//! * **Render tree (`dom::ChatDom`)**: An observable in-memory model of the
//!   host page's chat subtree. The host inserts and evicts message nodes; the
//!   engine only reads and annotates them.
//! * **Discovery engine (`engine::Augmenter`)**: A background actor driven by
//!   insertion events. It locates the chat root, sweeps already-buffered
//!   messages, and routes each qualifying node through the per-node pipeline.
//! * **Resolver (`resolver::LabelResolver`)**: The asynchronous black box that
//!   turns a channel identity into a label. Results are memoized for the
//!   lifetime of the page; an in-flight sentinel guarantees at most one
//!   lookup per identity.
//! * **Formatter (`display`)**: A pure mapping from (original name, resolved
//!   label, display mode) to the rendered string, plus the idempotent patch
//!   that applies it to an author chip.
//! * **Preferences (`prefs::PreferenceStore`)**: The persisted display-mode
//!   boundary. A live mode change triggers a full re-format pass from cached
//!   chip state, never a re-fetch.

pub mod constants;
pub mod display;
pub mod dom;
pub mod engine;
pub mod prefs;
pub mod resolver;

pub use display::DisplayMode;
pub use dom::{ChatDom, MessageKind, NodeId, NodeSpec};
pub use engine::Augmenter;
pub use prefs::{MemoryPrefs, PreferenceStore};
pub use resolver::{ChannelId, LabelResolver, ResolverCache};

/// Result type used throughout the chatlens library.
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for the chatlens library.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Structured render-tree errors from the dom module
    #[error(transparent)]
    Dom(#[from] dom::DomError),

    /// Structured lookup errors from the resolver module
    #[error(transparent)]
    Resolver(#[from] resolver::ResolverError),

    /// Structured engine errors from the engine module
    #[error(transparent)]
    Engine(#[from] engine::EngineError),

    /// Display-mode parse errors
    #[error(transparent)]
    Display(#[from] display::DisplayModeError),
}

impl Error {
    /// Get the originating module for this error.
    pub fn module(&self) -> &'static str {
        match self {
            Error::Dom(_) => "dom",
            Error::Resolver(_) => "resolver",
            Error::Engine(_) => "engine",
            Error::Display(_) => "display",
        }
    }

    /// Check if this error indicates a node that is no longer rendered.
    ///
    /// The host evicts nodes whenever the chat buffer trims old messages, so
    /// callers racing an eviction treat this as a skip, not a failure.
    pub fn is_node_gone(&self) -> bool {
        matches!(self, Error::Dom(dom::DomError::NodeNotFound { .. }))
    }
}
