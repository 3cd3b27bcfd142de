//! Preference store boundary.
//!
//! The persisted display-mode preference lives outside this crate (browser
//! storage in the reference host). The engine reads it once at startup; live
//! changes are pushed through [`crate::Augmenter::set_display_mode`] by
//! whatever subscription the host wires to its settings surface.

use std::sync::Mutex;

use crate::display::DisplayMode;

/// Read access to the persisted display-mode preference.
pub trait PreferenceStore: Send + Sync {
    /// The mode to start with.
    fn display_mode(&self) -> DisplayMode;
}

/// In-memory preference store for hosts and tests.
#[derive(Debug, Default)]
pub struct MemoryPrefs {
    mode: Mutex<DisplayMode>,
}

impl MemoryPrefs {
    /// Create a store holding the default mode (`both`).
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding a specific mode.
    pub fn with_mode(mode: DisplayMode) -> Self {
        Self {
            mode: Mutex::new(mode),
        }
    }

    /// Overwrite the stored mode. Does not notify anyone; the host is
    /// responsible for forwarding the change to the engine.
    pub fn set(&self, mode: DisplayMode) {
        *self.mode.lock().unwrap() = mode;
    }
}

impl PreferenceStore for MemoryPrefs {
    fn display_mode(&self) -> DisplayMode {
        *self.mode.lock().unwrap()
    }
}
