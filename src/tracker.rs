//! Per-string tuned state and direction feedback
//!
//! A string latches to tuned the first time it is heard in tune and stays
//! tuned until the tracker is reset. TuneUp/TuneDown feedback clears itself
//! after a delay, but only if the same direction is still showing and no
//! string has been tuned in the meantime.

use log::debug;
use serde::Serialize;
use std::time::{Duration, Instant};

use crate::note::{Direction, GuitarString, NoteObservation, STRING_COUNT};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StringState {
    pub string: GuitarString,
    pub canonical_frequency: f32,
    pub tuned: bool,
    pub last_direction: Option<Direction>,
}

impl StringState {
    fn new(string: GuitarString) -> Self {
        Self {
            string,
            canonical_frequency: string.canonical_frequency(),
            tuned: false,
            last_direction: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct PendingClear {
    direction: Direction,
    due: Instant,
}

/// Result of one observation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackerUpdate {
    pub strings: [StringState; STRING_COUNT],
    /// Set when this observation flipped a string's latch
    pub newly_tuned: Option<GuitarString>,
}

pub struct StringTracker {
    strings: [StringState; STRING_COUNT],
    feedback: Option<Direction>,
    // At most one entry per direction.
    pending: Vec<PendingClear>,
    clear_delay: Duration,
}

impl StringTracker {
    pub fn new(clear_delay: Duration) -> Self {
        Self {
            strings: GuitarString::ALL.map(StringState::new),
            feedback: None,
            pending: Vec::with_capacity(2),
            clear_delay,
        }
    }

    pub fn observe(
        &mut self,
        observation: &NoteObservation,
        frequency: f32,
        now: Instant,
    ) -> TrackerUpdate {
        self.poll(now);

        let string = GuitarString::for_note(observation.pitch_class, frequency);
        let mut newly_tuned = None;

        match observation.direction {
            Direction::InTune => {
                if let Some(string) = string {
                    let state = &mut self.strings[string.index()];
                    state.last_direction = Some(Direction::InTune);
                    if !state.tuned {
                        state.tuned = true;
                        newly_tuned = Some(string);
                    }
                }
                self.feedback = None;
                self.pending.clear();
            }
            direction => {
                if let Some(string) = string {
                    self.strings[string.index()].last_direction = Some(direction);
                }
                self.feedback = Some(direction);
                self.pending.retain(|pending| pending.direction != direction);
                self.pending.push(PendingClear {
                    direction,
                    due: now + self.clear_delay,
                });
            }
        }

        TrackerUpdate {
            strings: self.strings,
            newly_tuned,
        }
    }

    /// Fires every pending clear that is due at `now`.
    pub fn poll(&mut self, now: Instant) {
        let any_tuned = self.any_tuned();
        let feedback = &mut self.feedback;

        self.pending.retain(|pending| {
            if pending.due > now {
                return true;
            }
            if *feedback == Some(pending.direction) && !any_tuned {
                debug!("Clearing stale {:?} feedback", pending.direction);
                *feedback = None;
            }
            false
        });
    }

    /// Direction feedback currently showing, if any.
    pub fn feedback(&self) -> Option<Direction> {
        self.feedback
    }

    pub fn strings(&self) -> &[StringState; STRING_COUNT] {
        &self.strings
    }

    pub fn tuned_flags(&self) -> [bool; STRING_COUNT] {
        self.strings.map(|state| state.tuned)
    }

    pub fn any_tuned(&self) -> bool {
        self.strings.iter().any(|state| state.tuned)
    }

    pub fn reset(&mut self) {
        self.strings = GuitarString::ALL.map(StringState::new);
        self.feedback = None;
        self.pending.clear();
    }
}
