//! Tuner configuration
//!
//! All tunables of the pipeline live in one in-memory struct. Defaults
//! are the values the tuner ships with; `validate` is run once before a
//! `Tuner` is built.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ConfigError;

pub const DEFAULT_BUFFER_SIZE: usize = 4096;
pub const MIN_BUFFER_SIZE: usize = 64;
pub const DEFAULT_YIN_THRESHOLD: f32 = 0.15;
pub const DEFAULT_MIN_RMS: f32 = 0.001;

/// Half-width of the in-tune band, in Hz around the nearest chromatic note.
pub const IN_TUNE_THRESHOLD_HZ: f32 = 1.0;

pub const FEEDBACK_CLEAR_MS: u64 = 3000;
pub const POSITION_DAMPING: f32 = 0.5;
pub const POSITION_RANGE: f32 = 40.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TunerConfig {
    /// Samples per estimation pass
    pub buffer_size: usize,
    /// Absolute threshold on the cumulative mean normalized difference
    pub yin_threshold: f32,
    /// Buffers quieter than this RMS are treated as silence
    pub min_rms: f32,
    pub in_tune_threshold_hz: f32,
    /// Delay before TuneUp/TuneDown feedback clears itself
    pub feedback_clear_ms: u64,
    pub position_damping: f32,
    pub position_range: f32,
    /// Input device name, `None` for the host default
    pub input_device: Option<String>,
}

impl Default for TunerConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            yin_threshold: DEFAULT_YIN_THRESHOLD,
            min_rms: DEFAULT_MIN_RMS,
            in_tune_threshold_hz: IN_TUNE_THRESHOLD_HZ,
            feedback_clear_ms: FEEDBACK_CLEAR_MS,
            position_damping: POSITION_DAMPING,
            position_range: POSITION_RANGE,
            input_device: None,
        }
    }
}

impl TunerConfig {
    pub fn feedback_clear_delay(&self) -> Duration {
        Duration::from_millis(self.feedback_clear_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.buffer_size < MIN_BUFFER_SIZE {
            return Err(ConfigError::BufferTooSmall(self.buffer_size, MIN_BUFFER_SIZE));
        }

        if !(self.yin_threshold > 0.0 && self.yin_threshold < 1.0) {
            return Err(ConfigError::InvalidValue {
                field: "yin_threshold",
                value: self.yin_threshold,
            });
        }

        let non_negative = [
            ("min_rms", self.min_rms),
            ("in_tune_threshold_hz", self.in_tune_threshold_hz),
            ("position_damping", self.position_damping),
        ];
        for (field, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidValue { field, value });
            }
        }

        if !self.position_range.is_finite() || self.position_range <= 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "position_range",
                value: self.position_range,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = TunerConfig::default();
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.buffer_size, 4096);
        assert_eq!(config.feedback_clear_delay(), Duration::from_millis(3000));
    }

    #[test]
    fn test_rejects_bad_values() {
        let small = TunerConfig {
            buffer_size: 16,
            ..Default::default()
        };
        assert_eq!(
            small.validate(),
            Err(ConfigError::BufferTooSmall(16, MIN_BUFFER_SIZE))
        );

        let threshold = TunerConfig {
            yin_threshold: 1.5,
            ..Default::default()
        };
        assert!(matches!(
            threshold.validate(),
            Err(ConfigError::InvalidValue { field: "yin_threshold", .. })
        ));

        let range = TunerConfig {
            position_range: 0.0,
            ..Default::default()
        };
        assert!(range.validate().is_err());

        let nan = TunerConfig {
            min_rms: f32::NAN,
            ..Default::default()
        };
        assert!(nan.validate().is_err());
    }

    #[test]
    fn test_partial_json_falls_back_to_defaults() {
        let config: TunerConfig =
            serde_json::from_str(r#"{ "buffer_size": 2048, "input_device": "USB Audio" }"#)
                .unwrap();
        assert_eq!(config.buffer_size, 2048);
        assert_eq!(config.input_device.as_deref(), Some("USB Audio"));
        assert_eq!(config.yin_threshold, DEFAULT_YIN_THRESHOLD);
    }
}
