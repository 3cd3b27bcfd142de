//! Error types for the discovery engine.

use thiserror::Error;

/// Errors that can occur interacting with the discovery engine.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EngineError {
    /// The background engine has shut down and no longer accepts commands.
    #[error("engine is not running")]
    EngineStopped,
}
