//! Loop engine state machine states

use std::fmt;

/// Recording/playback state of the loop engine
///
/// ```text
///   Empty ──footswitch──► InitRecording ──footswitch / buffer full──► Playing
///     ▲                                                               │   ▲
///     └──────────────── reset (from any state) ◄──────────────────────┘   │
///                                                 footswitch ▼            │ footswitch / undo
///                                                        Overdubbing ─────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EngineState {
    /// Nothing recorded, output is silent
    #[default]
    Empty,
    /// Capturing the base loop; the loop length grows with every sample
    InitRecording,
    /// Looping the base buffer plus all committed layers
    Playing,
    /// Playing while accumulating input into the newest layer
    Overdubbing,
}

impl EngineState {
    /// Encode for lock-free storage in an `AtomicU8`
    #[inline]
    pub fn as_u8(self) -> u8 {
        match self {
            EngineState::Empty => 0,
            EngineState::InitRecording => 1,
            EngineState::Playing => 2,
            EngineState::Overdubbing => 3,
        }
    }

    /// Decode a value written by [`EngineState::as_u8`]
    ///
    /// Unknown values decode as `Empty`.
    #[inline]
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => EngineState::InitRecording,
            2 => EngineState::Playing,
            3 => EngineState::Overdubbing,
            _ => EngineState::Empty,
        }
    }

    /// Whether the loop length is frozen and the playhead is moving
    pub fn is_looping(self) -> bool {
        matches!(self, EngineState::Playing | EngineState::Overdubbing)
    }

    /// Short lowercase label for logs and status lines
    pub fn label(self) -> &'static str {
        match self {
            EngineState::Empty => "empty",
            EngineState::InitRecording => "recording",
            EngineState::Playing => "playing",
            EngineState::Overdubbing => "overdubbing",
        }
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
