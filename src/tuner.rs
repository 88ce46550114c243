//! Acquisition loop
//!
//! [`Tuner`] owns the audio source and runs one estimate -> map -> track
//! pass per [`Tuner::tick`]. The host calls `tick` once per display refresh
//! and renders the returned [`DisplaySnapshot`]; ticks never overlap because
//! `tick` takes `&mut self`. A tick that arrives while not listening does
//! nothing, and no failure inside a tick escapes it.

use log::{debug, error, info, trace, warn};
use serde::Serialize;
use std::time::Instant;

use crate::audio::AudioSource;
use crate::config::TunerConfig;
use crate::error::{AudioError, ConfigError, TunerError};
use crate::note::{
    map_to_note_with_threshold, note_position, Direction, NoteObservation, NO_NOTE, STRING_COUNT,
};
use crate::pitch::{PitchDetector, MIN_FREQUENCY};
use crate::tracker::StringTracker;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LoopState {
    Idle,
    /// Waiting on the audio device
    Starting,
    Running,
}

/// Plain data handed to the display once per tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplaySnapshot {
    pub current_note: String,
    /// Last detected frequency, rounded to 0.01 Hz
    pub frequency: Option<f32>,
    /// `None` (serialized as `null`) when no direction is showing
    pub direction: Option<Direction>,
    /// Offset indicator position in `[-position_range, position_range]`
    pub note_position: f32,
    pub tuned_strings: [bool; STRING_COUNT],
    pub is_listening: bool,
    /// Last device error, kept until the next successful start
    pub error: Option<String>,
}

impl DisplaySnapshot {
    fn idle(error: Option<String>) -> Self {
        Self {
            current_note: NO_NOTE.to_string(),
            frequency: None,
            direction: None,
            note_position: 0.0,
            tuned_strings: [false; STRING_COUNT],
            is_listening: false,
            error,
        }
    }
}

/// State of one listening session, dropped when tuning stops.
struct TunerSession {
    observation: Option<NoteObservation>,
    frequency: Option<f32>,
    note_position: f32,
    tracker: StringTracker,
}

impl TunerSession {
    fn new(config: &TunerConfig) -> Self {
        Self {
            observation: None,
            frequency: None,
            note_position: 0.0,
            tracker: StringTracker::new(config.feedback_clear_delay()),
        }
    }

    fn direction(&self) -> Option<Direction> {
        match self.observation {
            Some(observation) if observation.direction == Direction::InTune => {
                Some(Direction::InTune)
            }
            _ => self.tracker.feedback(),
        }
    }
}

pub struct Tuner<S: AudioSource> {
    source: S,
    detector: PitchDetector,
    config: TunerConfig,
    state: LoopState,
    session: Option<TunerSession>,
    last_error: Option<String>,
    failing: bool,
}

impl<S: AudioSource> Tuner<S> {
    pub fn new(source: S, config: TunerConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        Ok(Self {
            detector: PitchDetector::new(&config),
            source,
            config,
            state: LoopState::Idle,
            session: None,
            last_error: None,
            failing: false,
        })
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn is_listening(&self) -> bool {
        self.state == LoopState::Running
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn config(&self) -> &TunerConfig {
        &self.config
    }

    /// The start/stop button.
    pub fn toggle(&mut self) {
        match self.state {
            LoopState::Idle => {
                if let Err(err) = self.start() {
                    debug!("Toggle left the tuner idle: {}", err);
                }
            }
            LoopState::Running => self.stop(),
            LoopState::Starting => {}
        }
    }

    /// Acquires the audio source and begins a fresh session. A no-op while
    /// already running. On failure the tuner is back to `Idle` and the error
    /// is kept for display.
    pub fn start(&mut self) -> Result<(), AudioError> {
        if self.state != LoopState::Idle {
            return Ok(());
        }

        self.state = LoopState::Starting;
        match self.source.acquire() {
            Ok(()) => {
                self.session = Some(TunerSession::new(&self.config));
                self.last_error = None;
                self.failing = false;
                self.state = LoopState::Running;
                info!("Tuning started at {} Hz", self.source.sample_rate());
                Ok(())
            }
            Err(err) => {
                error!("Could not start tuning: {}", err);
                self.source.release();
                self.last_error = Some(err.to_string());
                self.state = LoopState::Idle;
                Err(err)
            }
        }
    }

    /// Releases the audio source and discards the session.
    pub fn stop(&mut self) {
        if self.state == LoopState::Idle {
            return;
        }
        self.source.release();
        self.session = None;
        self.state = LoopState::Idle;
        info!("Tuning stopped");
    }

    /// One pass of the loop at time `now`. Always returns a snapshot.
    pub fn tick(&mut self, now: Instant) -> DisplaySnapshot {
        if self.state != LoopState::Running {
            return self.snapshot();
        }

        match self.run_pass(now) {
            Ok(()) => self.failing = false,
            Err(err) => {
                // Once per run of failures, not once per frame
                if !self.failing {
                    warn!("Tuner pass failed: {}", err);
                }
                self.failing = true;
            }
        }

        self.snapshot()
    }

    fn run_pass(&mut self, now: Instant) -> Result<(), TunerError> {
        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };
        session.tracker.poll(now);

        let buffer = self.source.read(self.config.buffer_size)?;
        let Some(frequency) = self.detector.estimate(&buffer)? else {
            return Ok(());
        };
        if frequency < MIN_FREQUENCY {
            return Ok(());
        }

        let Some(observation) =
            map_to_note_with_threshold(frequency, self.config.in_tune_threshold_hz)
        else {
            return Ok(());
        };

        trace!(
            "{:.2} Hz -> {} {:+.2} Hz {:?}",
            frequency,
            observation.note_name(),
            observation.deviation_hz,
            observation.direction
        );

        let update = session.tracker.observe(&observation, frequency, now);
        if let Some(string) = update.newly_tuned {
            info!("{} string tuned at {:.2} Hz", string, frequency);
        }
        session.note_position = note_position(
            &observation,
            frequency,
            self.config.position_damping,
            self.config.position_range,
        );
        session.observation = Some(observation);
        session.frequency = Some(frequency);

        Ok(())
    }

    pub fn snapshot(&self) -> DisplaySnapshot {
        let session = match &self.session {
            Some(session) if self.state == LoopState::Running => session,
            _ => return DisplaySnapshot::idle(self.last_error.clone()),
        };

        DisplaySnapshot {
            current_note: session
                .observation
                .map(|observation| observation.note_name().to_string())
                .unwrap_or_else(|| NO_NOTE.to_string()),
            frequency: session.frequency.map(|f| (f * 100.0).round() / 100.0),
            direction: session.direction(),
            note_position: session.note_position,
            tuned_strings: session.tracker.tuned_flags(),
            is_listening: true,
            error: self.last_error.clone(),
        }
    }
}

impl<S: AudioSource> Drop for Tuner<S> {
    fn drop(&mut self) {
        if self.state != LoopState::Idle {
            self.source.release();
        }
    }
}
