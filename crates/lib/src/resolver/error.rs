//! Error types for the label resolution module.

use thiserror::Error;

/// Errors that can occur during label resolution.
///
/// Every resolution failure is cached as an absent label and never surfaced
/// to an end user; these errors exist for diagnostics at the lookup boundary.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ResolverError {
    /// The feed request could not be performed.
    #[error("feed request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The relay transport rejected or failed to deliver a request.
    #[error("relay transport error: {0}")]
    Transport(String),
}

impl ResolverError {
    /// Check if this is a transport-level relay error.
    pub fn is_transport_error(&self) -> bool {
        matches!(self, ResolverError::Transport(_))
    }
}
