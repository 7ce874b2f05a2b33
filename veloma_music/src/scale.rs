//! Scales — the closed set of pitch collections the instrument can play.
//!
//! Each [`Scale`] owns its interval table; [`Scale::degrees`] turns it into
//! an endless ascending generator of absolute pitches starting at a root.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::OCTAVE;

// ════════════════════════════════════════════════════════════════════════════
// Scale
// ════════════════════════════════════════════════════════════════════════════

/// Supported scales.
///
/// Intervals are semitone offsets from the root within one octave.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scale {
    #[default]
    Chromatic,
    Major,
    Minor,
    HarmonicMinor,
    PentatonicMajor,
    PentatonicMinor,
    Blues,
    Dorian,
    Phrygian,
    Lydian,
    Mixolydian,
    WholeTone,
    Diminished,
}

impl Scale {
    /// Every scale, in menu order.
    pub const ALL: [Scale; 13] = [
        Scale::Chromatic,
        Scale::Major,
        Scale::Minor,
        Scale::HarmonicMinor,
        Scale::PentatonicMajor,
        Scale::PentatonicMinor,
        Scale::Blues,
        Scale::Dorian,
        Scale::Phrygian,
        Scale::Lydian,
        Scale::Mixolydian,
        Scale::WholeTone,
        Scale::Diminished,
    ];

    /// Semitone offsets from the root, ascending, all below 12.
    pub fn intervals(self) -> &'static [u8] {
        match self {
            Scale::Chromatic       => &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11],
            Scale::Major           => &[0, 2, 4, 5, 7, 9, 11],
            Scale::Minor           => &[0, 2, 3, 5, 7, 8, 10],
            Scale::HarmonicMinor   => &[0, 2, 3, 5, 7, 8, 11],
            Scale::PentatonicMajor => &[0, 2, 4, 7, 9],
            Scale::PentatonicMinor => &[0, 3, 5, 7, 10],
            Scale::Blues           => &[0, 3, 5, 6, 7, 10],
            Scale::Dorian          => &[0, 2, 3, 5, 7, 9, 10],
            Scale::Phrygian        => &[0, 1, 3, 5, 7, 8, 10],
            Scale::Lydian          => &[0, 2, 4, 6, 7, 9, 11],
            Scale::Mixolydian      => &[0, 2, 4, 5, 7, 9, 10],
            Scale::WholeTone       => &[0, 2, 4, 6, 8, 10],
            Scale::Diminished      => &[0, 2, 3, 5, 6, 8, 9, 11],
        }
    }

    /// Human-readable name, also accepted by [`FromStr`].
    pub fn name(self) -> &'static str {
        match self {
            Scale::Chromatic       => "Chromatic",
            Scale::Major           => "Major",
            Scale::Minor           => "Minor",
            Scale::HarmonicMinor   => "Harmonic Minor",
            Scale::PentatonicMajor => "Pentatonic Major",
            Scale::PentatonicMinor => "Pentatonic Minor",
            Scale::Blues           => "Blues",
            Scale::Dorian          => "Dorian",
            Scale::Phrygian        => "Phrygian",
            Scale::Lydian          => "Lydian",
            Scale::Mixolydian      => "Mixolydian",
            Scale::WholeTone       => "Whole Tone",
            Scale::Diminished      => "Diminished",
        }
    }

    /// Ascending absolute pitches of this scale starting at `root`.
    pub fn degrees(self, root: i32) -> Degrees {
        Degrees { intervals: self.intervals(), root, index: 0 }
    }

    /// The scale after this one in [`Scale::ALL`], wrapping.
    pub fn next(self) -> Scale {
        let i = Scale::ALL.iter().position(|s| *s == self).unwrap_or(0);
        Scale::ALL[(i + 1) % Scale::ALL.len()]
    }
}

impl fmt::Display for Scale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Parsing
// ════════════════════════════════════════════════════════════════════════════

/// Returned when a scale name is not one of [`Scale::ALL`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScaleParseError(pub String);

impl fmt::Display for ScaleParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown scale: {:?}", self.0)
    }
}

impl std::error::Error for ScaleParseError {}

impl FromStr for Scale {
    type Err = ScaleParseError;

    /// Case-insensitive; spaces, `-` and `_` are ignored, so
    /// `"Pentatonic Major"`, `"pentatonic_major"` and `"PENTATONIC-MAJOR"`
    /// all parse.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = normalise(s);
        Scale::ALL
            .iter()
            .copied()
            .find(|scale| normalise(scale.name()) == key)
            .ok_or_else(|| ScaleParseError(s.to_string()))
    }
}

fn normalise(s: &str) -> String {
    s.chars()
        .filter(|c| !matches!(c, ' ' | '-' | '_'))
        .flat_map(char::to_lowercase)
        .collect()
}

// ════════════════════════════════════════════════════════════════════════════
// Degrees — endless degree generator
// ════════════════════════════════════════════════════════════════════════════

/// Iterator over the absolute pitches of a scale, octave after octave.
///
/// Never returns `None`; callers bound it with `take_while`.
#[derive(Clone, Debug)]
pub struct Degrees {
    intervals: &'static [u8],
    root:      i32,
    index:     usize,
}

impl Iterator for Degrees {
    type Item = i32;

    fn next(&mut self) -> Option<i32> {
        let n      = self.intervals.len();
        let octave = (self.index / n) as i32;
        let step   = self.intervals[self.index % n] as i32;
        self.index += 1;
        Some(self.root + octave * OCTAVE + step)
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Tests
// ════════════════════════════════════════════════════════════════════════════
