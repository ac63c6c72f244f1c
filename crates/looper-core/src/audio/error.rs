//! Audio host error types

use std::fmt;

use thiserror::Error;

/// What kind of failure an [`AudioError`] is, as shown to the performer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// The system refused access to the capture device
    PermissionDenied,
    /// The requested (or any) capture device does not exist
    NotFound,
    /// A system policy blocked capture
    SecurityBlocked,
    /// Capture failed for a reason we can't classify
    Unknown,
    /// Setup was cancelled; not an error for the performer
    Cancelled,
    /// The output side of the graph could not be built or started
    Output,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorCategory::PermissionDenied => "permission denied",
            ErrorCategory::NotFound => "not found",
            ErrorCategory::SecurityBlocked => "blocked",
            ErrorCategory::Unknown => "unknown",
            ErrorCategory::Cancelled => "cancelled",
            ErrorCategory::Output => "output",
        };
        f.write_str(label)
    }
}

/// Errors that can occur while building or driving the audio graph
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AudioError {
    // ─────────────────────────────────────────────────────────────
    // Capture acquisition
    // ─────────────────────────────────────────────────────────────
    /// Access to the microphone was refused
    #[error("Microphone access denied: {0}")]
    CapturePermissionDenied(String),

    /// No usable input device
    #[error("Microphone not found: {0}")]
    CaptureDeviceNotFound(String),

    /// Capture blocked by a system policy
    #[error("Microphone access blocked: {0}")]
    CaptureBlocked(String),

    /// Any other capture failure
    #[error("Failed to open microphone: {0}")]
    CaptureFailed(String),

    // ─────────────────────────────────────────────────────────────
    // Output and graph
    // ─────────────────────────────────────────────────────────────
    /// No output device available
    #[error("No audio output device available")]
    NoOutputDevice,

    /// Configured output device not found
    #[error("Audio device not found: {0}")]
    DeviceNotFound(String),

    /// Failed to get device configuration
    #[error("Failed to get device config: {0}")]
    ConfigError(String),

    /// Failed to build audio stream
    #[error("Failed to build audio stream: {0}")]
    StreamBuildError(String),

    /// Failed to start, pause or resume a stream
    #[error("Failed to control audio stream: {0}")]
    StreamPlayError(String),

    /// Unsupported sample format
    #[error("Unsupported sample format: {0}")]
    UnsupportedFormat(String),

    /// Input and output devices can't agree on a sample rate
    #[error("Sample rate mismatch: output={output}Hz, input={input}Hz")]
    SampleRateMismatch { output: u32, input: u32 },

    // ─────────────────────────────────────────────────────────────
    // Control plane
    // ─────────────────────────────────────────────────────────────
    /// Setup was cancelled before it completed
    #[error("Audio setup cancelled")]
    Cancelled,

    /// The engine is not running (capture never acquired or already closed)
    #[error("Loop engine is not running")]
    EngineUnavailable,

    /// The command queue is full; the command was not delivered
    #[error("Engine command queue is full")]
    CommandQueueFull,
}

impl AudioError {
    /// Classify this error for display
    pub fn category(&self) -> ErrorCategory {
        match self {
            AudioError::CapturePermissionDenied(_) => ErrorCategory::PermissionDenied,
            AudioError::CaptureDeviceNotFound(_) => ErrorCategory::NotFound,
            AudioError::CaptureBlocked(_) => ErrorCategory::SecurityBlocked,
            AudioError::CaptureFailed(_) => ErrorCategory::Unknown,
            AudioError::Cancelled => ErrorCategory::Cancelled,
            AudioError::NoOutputDevice
            | AudioError::DeviceNotFound(_)
            | AudioError::ConfigError(_)
            | AudioError::StreamBuildError(_)
            | AudioError::StreamPlayError(_)
            | AudioError::UnsupportedFormat(_)
            | AudioError::SampleRateMismatch { .. } => ErrorCategory::Output,
            AudioError::EngineUnavailable | AudioError::CommandQueueFull => ErrorCategory::Unknown,
        }
    }

    /// Cancellation is reported silently
    pub fn is_cancellation(&self) -> bool {
        matches!(self, AudioError::Cancelled)
    }

    /// Message suitable for showing to the performer
    pub fn user_message(&self) -> String {
        match self.category() {
            ErrorCategory::PermissionDenied => {
                "Microphone access was denied. Allow audio input for this application and try again."
                    .to_string()
            }
            ErrorCategory::NotFound => {
                "No microphone was found. Connect an input device or check the configured input."
                    .to_string()
            }
            ErrorCategory::SecurityBlocked => {
                "Microphone access is blocked by a system policy.".to_string()
            }
            ErrorCategory::Cancelled => "Audio setup was cancelled.".to_string(),
            ErrorCategory::Output => format!("Audio output could not be started: {}", self),
            ErrorCategory::Unknown => format!("Audio input failed: {}", self),
        }
    }

    /// Classify a free-form capture failure message from the platform
    pub fn from_capture_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        if lower.contains("permission") || lower.contains("denied") || lower.contains("not allowed")
        {
            AudioError::CapturePermissionDenied(message)
        } else if lower.contains("policy") || lower.contains("blocked") || lower.contains("security")
        {
            AudioError::CaptureBlocked(message)
        } else if lower.contains("not found")
            || lower.contains("no such")
            || lower.contains("not available")
            || lower.contains("no longer available")
            || lower.contains("unavailable")
        {
            AudioError::CaptureDeviceNotFound(message)
        } else {
            AudioError::CaptureFailed(message)
        }
    }
}

/// Result type for audio operations
pub type AudioResult<T> = Result<T, AudioError>;
