//! Lifecycle states and the notifications emitted when they change

use ad_provider::AdFormat;

/// Lifecycle state of one ad format
///
/// Full-screen formats use `Unloaded → Loading → Loaded → Showing → Closed`, with
/// `Failed` after too many consecutive load failures. Banners use `Displayed`
/// instead of `Showing`/`Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AdState {
    #[default]
    Unloaded,
    Loading,
    Loaded,
    Showing,
    Closed,
    Failed,
    Displayed,
}

impl AdState {
    /// States from which a load request starts a new load
    pub fn accepts_load(&self) -> bool {
        matches!(self, AdState::Unloaded | AdState::Closed)
    }
}

/// What happened to a format
#[derive(Debug, Clone, PartialEq)]
pub enum AdEventKind {
    /// An ad finished loading
    Loaded,

    /// A load failed
    LoadFailed {
        reason: String,
        consecutive_failures: u32,
        /// The format moved to `Failed` and needs an explicit reset
        terminal: bool,
    },

    /// An ad went on screen
    Displayed,

    /// A full-screen ad closed; `completed` is the outcome handed to the caller
    Closed { completed: bool },

    /// The banner was hidden
    Hidden,

    /// The banner was destroyed
    Destroyed,
}

/// Notification delivered to observers
#[derive(Debug, Clone, PartialEq)]
pub struct AdEvent {
    pub format: AdFormat,
    pub kind: AdEventKind,
    /// State after the change
    pub state: AdState,
}

impl AdEvent {
    pub fn new(format: AdFormat, kind: AdEventKind, state: AdState) -> Self {
        Self {
            format,
            kind,
            state,
        }
    }
}
