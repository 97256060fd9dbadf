//! # Configuration Module
//!
//! Settings a tuner session starts from. Every field has a default, so a
//! config file only needs to name what it changes.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;

use crate::audio::DEFAULT_BUFFER_SIZE;
use crate::error::{Result, TunerError};
use crate::tuning::{self, DEFAULT_A4_HZ};

/// Detection loop cadence, roughly one display frame.
pub const DEFAULT_FRAME_INTERVAL_MS: u64 = 16;
pub const DEFAULT_TONE_DURATION_MS: u64 = 1000;
pub const DEFAULT_TUNING: &str = "guitar-standard";
/// Smallest analysis window. Two periods of the lowest detectable pitch must
/// fit, which 4096 samples guarantees up to 61 kHz capture rates; at higher
/// rates the lowest notes go undetected rather than misreported.
pub const MIN_BUFFER_SIZE: usize = 4096;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TunerConfig {
    /// A4 reference in Hz.
    pub a4_hz: f32,
    /// Id of the built-in tuning preset.
    pub tuning: String,
    /// Samples per analysis frame.
    pub buffer_size: usize,
    pub frame_interval_ms: u64,
    pub tone_duration_ms: u64,
}

impl Default for TunerConfig {
    fn default() -> Self {
        Self {
            a4_hz: DEFAULT_A4_HZ,
            tuning: DEFAULT_TUNING.to_string(),
            buffer_size: DEFAULT_BUFFER_SIZE,
            frame_interval_ms: DEFAULT_FRAME_INTERVAL_MS,
            tone_duration_ms: DEFAULT_TONE_DURATION_MS,
        }
    }
}

impl TunerConfig {
    /// Loads a config from a JSON file and validates it.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut file = File::open(path)
            .map_err(|e| TunerError::Config(format!("{}: {}", path.display(), e)))?;
        let mut data = String::new();
        file.read_to_string(&mut data)
            .map_err(|e| TunerError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&data)
    }

    pub fn from_json(data: &str) -> Result<Self> {
        let config: TunerConfig =
            serde_json::from_str(data).map_err(|e| TunerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        tuning::validate_a4(self.a4_hz)?;
        if self.buffer_size < MIN_BUFFER_SIZE {
            return Err(TunerError::Config(format!(
                "buffer_size {} is too small, at least {} samples are needed",
                self.buffer_size, MIN_BUFFER_SIZE
            )));
        }
        if self.frame_interval_ms == 0 {
            return Err(TunerError::Config("frame_interval_ms must be positive".into()));
        }
        if tuning::find_preset(&self.tuning).is_none() {
            return Err(TunerError::Config(format!("unknown tuning '{}'", self.tuning)));
        }
        Ok(())
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(TunerConfig::default().validate().is_ok());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = TunerConfig::from_json(r#"{ "a4_hz": 432.0, "tuning": "bass-standard" }"#).unwrap();
        assert_eq!(config.a4_hz, 432.0);
        assert_eq!(config.tuning, "bass-standard");
        assert_eq!(config.buffer_size, DEFAULT_BUFFER_SIZE);
    }

    #[test]
    fn rejects_out_of_range_reference() {
        let err = TunerConfig::from_json(r#"{ "a4_hz": 500.0 }"#).unwrap_err();
        assert_eq!(err, TunerError::ReferenceOutOfRange(500.0));
    }

    #[test]
    fn rejects_window_too_short_for_low_strings() {
        assert!(matches!(
            TunerConfig::from_json(r#"{ "buffer_size": 1024 }"#),
            Err(TunerError::Config(_))
        ));
        assert!(TunerConfig::from_json(r#"{ "buffer_size": 4096 }"#).is_ok());
    }

    #[test]
    fn rejects_unknown_tuning() {
        assert!(matches!(
            TunerConfig::from_json(r#"{ "tuning": "theremin" }"#),
            Err(TunerError::Config(_))
        ));
    }
}
