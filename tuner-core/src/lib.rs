// tuner-core/src/lib.rs

//! The core logic for the instrument tuner.
//! This crate is responsible for audio capture, pitch detection,
//! temporal smoothing, note locking and reference-tone synthesis.
//! It is completely headless and contains no UI code.

pub mod audio;
pub mod config;
pub mod error;
pub mod noise_gate;
pub mod pitch;
pub mod playback;
pub mod session;
pub mod smoothing;
pub mod stabilizer;
pub mod synth;
pub mod tuning;

pub use audio::{AudioFrame, AudioInput};
pub use config::TunerConfig;
pub use error::{Result, TunerError};
pub use pitch::DetectionResult;
pub use playback::AudioOutput;
pub use session::{CancellationFlag, TunerSession, TunerState};
pub use tuning::{Instrument, StringInfo, TuningPreset, frequency_to_note, note_to_frequency};
