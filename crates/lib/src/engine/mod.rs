//! Message discovery engine.
//!
//! The engine is a background actor driven by two inbound streams: the render
//! tree's structural watch (node insertions) and a command channel (mode
//! changes, lookup completions, flush barriers). All shared state — the
//! resolver cache, the current display mode, the watch state machine — is
//! owned by the actor's single execution context, so correctness rests on
//! interleaving-safety rather than locking.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use crate::{
    Result,
    display::DisplayMode,
    dom::ChatDom,
    prefs::PreferenceStore,
    resolver::{ChannelId, LabelResolver},
};

mod background;
mod error;

use background::BackgroundEngine;
pub use error::EngineError;

/// Commands consumed by the background engine.
pub enum EngineCommand {
    /// The persisted display-mode preference changed; re-format every
    /// already-patched chip from cached state.
    ModeChanged(DisplayMode),
    /// A detached lookup task finished. `None` records a failed or empty
    /// resolution.
    LabelResolved {
        channel_id: ChannelId,
        label: Option<String>,
    },
    /// Quiescence barrier: acknowledged once every command and insertion
    /// received so far is processed and no lookups remain in flight.
    Flush { response: oneshot::Sender<()> },
    /// Stop the background engine.
    Shutdown,
}

impl std::fmt::Debug for EngineCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ModeChanged(mode) => f.debug_tuple("ModeChanged").field(mode).finish(),
            Self::LabelResolved { channel_id, label } => f
                .debug_struct("LabelResolved")
                .field("channel_id", channel_id)
                .field("label", label)
                .finish(),
            Self::Flush { .. } => write!(f, "Flush"),
            Self::Shutdown => write!(f, "Shutdown"),
        }
    }
}

/// Handle to a running discovery engine.
///
/// Dropping the handle does not stop the engine; call [`Augmenter::shutdown`]
/// for an orderly stop. In the reference environment the engine simply runs
/// for the lifetime of the page and is torn down with it.
pub struct Augmenter {
    command_tx: mpsc::Sender<EngineCommand>,
}

impl Augmenter {
    /// Start the engine against a render tree.
    ///
    /// Takes the document's structural watch (single consumer), reads the
    /// initial display mode from the preference store, performs the initial
    /// root check, and begins observing insertions.
    pub fn start(
        dom: ChatDom,
        resolver: Arc<dyn LabelResolver>,
        prefs: &dyn PreferenceStore,
    ) -> Result<Self> {
        let watch = dom.take_watch()?;
        let mode = prefs.display_mode();
        let command_tx = BackgroundEngine::start(dom, watch, resolver, mode);
        Ok(Self { command_tx })
    }

    /// Push a display-mode change. The engine re-formats every patched chip
    /// from cached attributes; no lookups are issued.
    pub async fn set_display_mode(&self, mode: DisplayMode) -> Result<()> {
        self.send(EngineCommand::ModeChanged(mode)).await
    }

    /// Wait until the engine has processed everything received so far,
    /// including lookups still in flight.
    pub async fn flush(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send(EngineCommand::Flush { response: tx }).await?;
        rx.await.map_err(|_| EngineError::EngineStopped.into())
    }

    /// Stop the background engine.
    pub async fn shutdown(&self) -> Result<()> {
        self.send(EngineCommand::Shutdown).await
    }

    async fn send(&self, command: EngineCommand) -> Result<()> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| EngineError::EngineStopped.into())
    }
}
