//! Error types for the tuner pipeline
//!
//! "No pitch found" is not an error: the estimator reports it as `Ok(None)`.
//! Everything here is either a broken precondition or a device failure.

use thiserror::Error;

/// Frequency estimator errors
#[derive(Debug, Error)]
pub enum PitchError {
    /// The buffer holds no samples at all
    #[error("Audio buffer is empty")]
    EmptyBuffer,

    /// Sample rate is zero, negative or not finite
    #[error("Invalid sample rate: {0} Hz")]
    InvalidSampleRate(f32),

    /// FFT plan rejected the buffers it was given
    #[error("FFT error: {0}")]
    Fft(String),
}

/// Audio source errors
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("No input device available")]
    NoInputDevice,

    #[error("Input device not found: {0}")]
    DeviceNotFound(String),

    #[error("Could not read device name: {0}")]
    DeviceName(#[from] cpal::DeviceNameError),

    #[error("Could not enumerate input devices: {0}")]
    Devices(#[from] cpal::DevicesError),

    #[error("No usable input configuration: {0}")]
    StreamConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("Could not open input stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("Could not start input stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error("Unsupported sample format: {0}")]
    UnsupportedSampleFormat(String),

    /// `read` was called before `acquire` or after `release`
    #[error("Audio source has not been acquired")]
    NotAcquired,

    #[error("Capture buffer lock poisoned")]
    LockPoisoned,
}

/// Configuration errors
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Buffer size {0} is too small, need at least {1} samples")]
    BufferTooSmall(usize, usize),

    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: &'static str, value: f32 },
}

/// Anything that can go wrong inside one pass of the acquisition loop
#[derive(Debug, Error)]
pub enum TunerError {
    #[error(transparent)]
    Audio(#[from] AudioError),

    #[error(transparent)]
    Pitch(#[from] PitchError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type PitchResult<T> = Result<T, PitchError>;
pub type AudioResult<T> = Result<T, AudioError>;
