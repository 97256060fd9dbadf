//! # Error Module
//!
//! All fallible operations in the tuner core return [`TunerError`]. Audio
//! backend failures are classified by cause so the caller can tell the user
//! whether to grant permission, plug in a device, or change a policy.

use thiserror::Error;

/// Errors surfaced by the tuner core.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TunerError {
    /// Microphone access was refused by the user or the OS.
    #[error("microphone access was denied ({0}); allow microphone access for this application and start again")]
    PermissionDenied(String),

    /// No capture device, or nothing to tune against.
    #[error("audio input unavailable: {0}")]
    InputUnavailable(String),

    /// The platform blocked audio capture for policy reasons.
    #[error("audio capture is blocked by a security policy ({0}); the input cannot be opened from this context")]
    SecurityPolicy(String),

    /// An input or output context was suspended and could not be resumed.
    #[error("audio was interrupted: {0}")]
    TransientAudioInterruption(String),

    /// No playback device for reference tones.
    #[error("audio output unavailable: {0}")]
    OutputUnavailable(String),

    #[error("A4 reference of {0} Hz is outside the supported range of 400-480 Hz")]
    ReferenceOutOfRange(f32),

    #[error("unknown note name '{0}'")]
    UnknownNote(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, TunerError>;

impl TunerError {
    /// Classifies an input backend failure by its message.
    ///
    /// Backends report permission and policy problems as free-form text, so
    /// the message is the only reliable signal across hosts.
    pub fn from_input_failure(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        if ["permission", "denied", "not authorized", "unauthorized", "not permitted"]
            .iter()
            .any(|needle| lower.contains(needle))
        {
            TunerError::PermissionDenied(message)
        } else if ["policy", "sandbox", "security"]
            .iter()
            .any(|needle| lower.contains(needle))
        {
            TunerError::SecurityPolicy(message)
        } else {
            TunerError::InputUnavailable(message)
        }
    }
}
