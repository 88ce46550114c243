//! Six-string guitar tuner core
//!
//! Headless pipeline: audio source -> YIN frequency estimator -> note
//! mapper -> string tracker, driven one pass per display frame by the
//! acquisition loop in [`tuner`]. Rendering is left to the host, which only
//! consumes [`tuner::DisplaySnapshot`]s.

pub mod audio;
pub mod config;
pub mod error;
pub mod note;
pub mod pitch;
pub mod tracker;
pub mod tuner;

pub use audio::{AudioBuffer, AudioSource, MicrophoneSource};
pub use config::TunerConfig;
pub use error::{AudioError, ConfigError, PitchError, TunerError};
pub use note::{
    canonical_frequency, map_to_note, Direction, GuitarString, NoteObservation, PitchClass,
};
pub use pitch::PitchDetector;
pub use tracker::{StringState, StringTracker};
pub use tuner::{DisplaySnapshot, LoopState, Tuner};
