//! Frequency to note mapping
//!
//! Quantizes a frequency to the nearest equal-tempered pitch class
//! (A4 = 440 Hz), measures its deviation in Hz, and knows the six open
//! strings of a guitar in standard tuning.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::IN_TUNE_THRESHOLD_HZ;
use crate::pitch::{MAX_FREQUENCY, MIN_FREQUENCY};

pub const A4_FREQUENCY: f32 = 440.0;

/// Below this an observed E is the low string, otherwise the high one.
pub const LOW_E_SPLIT_HZ: f32 = 100.0;

pub const STRING_COUNT: usize = 6;

/// Shown in place of a note name when there is nothing to show.
pub const NO_NOTE: &str = "--";

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PitchClass {
    C,
    CSharp,
    D,
    DSharp,
    E,
    F,
    FSharp,
    G,
    GSharp,
    A,
    ASharp,
    B,
}

impl PitchClass {
    pub const ALL: [PitchClass; 12] = [
        PitchClass::C,
        PitchClass::CSharp,
        PitchClass::D,
        PitchClass::DSharp,
        PitchClass::E,
        PitchClass::F,
        PitchClass::FSharp,
        PitchClass::G,
        PitchClass::GSharp,
        PitchClass::A,
        PitchClass::ASharp,
        PitchClass::B,
    ];

    pub fn from_index(index: usize) -> Self {
        Self::ALL[index % 12]
    }

    pub fn name(self) -> &'static str {
        NOTE_NAMES[self as usize]
    }
}

impl fmt::Display for PitchClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Flat: tighten the string
    TuneUp,
    /// Sharp: loosen the string
    TuneDown,
    InTune,
}

/// Open strings in standard tuning, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GuitarString {
    LowE,
    A,
    D,
    G,
    B,
    HighE,
}

impl GuitarString {
    pub const ALL: [GuitarString; STRING_COUNT] = [
        GuitarString::LowE,
        GuitarString::A,
        GuitarString::D,
        GuitarString::G,
        GuitarString::B,
        GuitarString::HighE,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn canonical_frequency(self) -> f32 {
        match self {
            GuitarString::LowE => 82.41,
            GuitarString::A => 110.00,
            GuitarString::D => 146.83,
            GuitarString::G => 196.00,
            GuitarString::B => 246.94,
            GuitarString::HighE => 329.63,
        }
    }

    pub fn pitch_class(self) -> PitchClass {
        match self {
            GuitarString::LowE | GuitarString::HighE => PitchClass::E,
            GuitarString::A => PitchClass::A,
            GuitarString::D => PitchClass::D,
            GuitarString::G => PitchClass::G,
            GuitarString::B => PitchClass::B,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            GuitarString::LowE => "E2",
            GuitarString::A => "A2",
            GuitarString::D => "D3",
            GuitarString::G => "G3",
            GuitarString::B => "B3",
            GuitarString::HighE => "E4",
        }
    }

    /// The open string a pitch class belongs to. E is split by frequency.
    pub fn for_note(pitch_class: PitchClass, frequency: f32) -> Option<GuitarString> {
        match pitch_class {
            PitchClass::E if frequency < LOW_E_SPLIT_HZ => Some(GuitarString::LowE),
            PitchClass::E => Some(GuitarString::HighE),
            PitchClass::A => Some(GuitarString::A),
            PitchClass::D => Some(GuitarString::D),
            PitchClass::G => Some(GuitarString::G),
            PitchClass::B => Some(GuitarString::B),
            _ => None,
        }
    }

    pub fn nearest(frequency: f32) -> GuitarString {
        let mut best = GuitarString::LowE;
        for string in Self::ALL {
            if (string.canonical_frequency() - frequency).abs()
                < (best.canonical_frequency() - frequency).abs()
            {
                best = string;
            }
        }
        best
    }
}

impl fmt::Display for GuitarString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

pub fn canonical_frequency(string: GuitarString) -> f32 {
    string.canonical_frequency()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoteObservation {
    pub pitch_class: PitchClass,
    /// Equal-tempered frequency of the nearest chromatic note
    pub target_frequency: f32,
    /// Observed minus target, in Hz
    pub deviation_hz: f32,
    pub direction: Direction,
}

impl NoteObservation {
    pub fn note_name(&self) -> &'static str {
        self.pitch_class.name()
    }
}

/// Maps `frequency` onto the nearest chromatic note using the default
/// in-tune band. `None` outside the practical guitar range.
pub fn map_to_note(frequency: f32) -> Option<NoteObservation> {
    map_to_note_with_threshold(frequency, IN_TUNE_THRESHOLD_HZ)
}

/// As [`map_to_note`] with an explicit band. The band is closed: a deviation
/// of exactly `threshold_hz` either way is still `InTune`.
pub fn map_to_note_with_threshold(frequency: f32, threshold_hz: f32) -> Option<NoteObservation> {
    if !frequency.is_finite() || !(MIN_FREQUENCY..=MAX_FREQUENCY).contains(&frequency) {
        return None;
    }

    // Halves round up.
    let semitones = (12.0 * (frequency / A4_FREQUENCY).log2() + 0.5).floor() as i32;
    let pitch_class = PitchClass::from_index((semitones + 69).rem_euclid(12) as usize);
    let target_frequency = A4_FREQUENCY * 2.0_f32.powf(semitones as f32 / 12.0);
    let deviation_hz = frequency - target_frequency;

    let direction = if deviation_hz < -threshold_hz {
        Direction::TuneUp
    } else if deviation_hz > threshold_hz {
        Direction::TuneDown
    } else {
        Direction::InTune
    };

    Some(NoteObservation {
        pitch_class,
        target_frequency,
        deviation_hz,
        direction,
    })
}

/// Offset for the display indicator: deviation from the matched open
/// string, damped and clamped to `[-range, range]`. Notes that belong to
/// no open string are measured against the nearest one.
pub fn note_position(
    observation: &NoteObservation,
    frequency: f32,
    damping: f32,
    range: f32,
) -> f32 {
    let string = GuitarString::for_note(observation.pitch_class, frequency)
        .unwrap_or_else(|| GuitarString::nearest(frequency));
    ((frequency - string.canonical_frequency()) * damping).clamp(-range, range)
}
