//! Audio host configuration
//!
//! Device selection, buffer and sample rate preferences, and the constraints
//! requested from the capture device.

use serde::{Deserialize, Serialize};

/// Largest render block processed in one go (frames)
///
/// Device callbacks with more frames are split into blocks of this size.
pub const MAX_BUFFER_SIZE: usize = 8192;

/// Default buffer size when no preference is specified (frames)
pub const DEFAULT_BUFFER_SIZE: u32 = 256;

/// Buffer size used in low-latency mode (frames)
///
/// 128 frames @ 48kHz = ~2.7ms per block.
pub const LOW_LATENCY_BUFFER_SIZE: u32 = 128;

/// Default sample rate for the audio system (48kHz)
pub const DEFAULT_SAMPLE_RATE: u32 = 48000;

/// Preferred buffer size for audio streams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BufferSize {
    /// Let the host pick
    #[default]
    Default,
    /// Request a specific buffer size in frames (clamped to a sane range)
    Fixed(u32),
    /// Ask for the smallest block size we consider stable
    LowLatency,
}

impl BufferSize {
    /// Requested frames, or None to leave the choice to the device
    pub fn as_frames(&self) -> Option<u32> {
        match self {
            BufferSize::Default => None,
            BufferSize::Fixed(frames) => Some((*frames).clamp(16, MAX_BUFFER_SIZE as u32)),
            BufferSize::LowLatency => Some(LOW_LATENCY_BUFFER_SIZE),
        }
    }

    /// Frames assumed for latency estimates when the device decides
    pub fn nominal_frames(&self) -> u32 {
        self.as_frames().unwrap_or(DEFAULT_BUFFER_SIZE)
    }
}

/// Audio device identifier
///
/// Includes both the device name and the host backend (JACK, ALSA, etc.)
/// so a device can be picked from a specific host when several are present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceId {
    /// Device name as reported by the system
    pub name: String,
    /// Audio host identifier (e.g., "JACK", "ALSA", "CoreAudio")
    /// If None, every host is searched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

impl DeviceId {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host: None,
        }
    }

    pub fn with_host(name: &str, host: &str) -> Self {
        Self {
            name: name.to_string(),
            host: Some(host.to_string()),
        }
    }

    /// Get a display label that includes the host if available
    pub fn display_label(&self) -> String {
        match &self.host {
            Some(host) => format!("[{}] {}", host, self.name),
            None => self.name.clone(),
        }
    }
}

/// Processing requested from the capture device
///
/// cpal exposes raw device input, so `echo_cancellation`, `noise_suppression`
/// and `auto_gain_control` are requests the host may not be able to honour;
/// the host logs the ones it can't apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConstraints {
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
    /// Channels captured from the device; they are mixed down to mono
    pub channel_count: u16,
    /// Ask the device for its smallest buffer
    pub low_latency: bool,
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self {
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: false,
            channel_count: 1,
            low_latency: true,
        }
    }
}

/// Configuration for the audio host
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Capture device (None = system default input)
    pub input_device: Option<DeviceId>,

    /// Playback device (None = system default output)
    pub output_device: Option<DeviceId>,

    /// Preferred buffer size
    pub buffer_size: BufferSize,

    /// Preferred sample rate (None = output device default)
    pub sample_rate: Option<u32>,
}
