//! Instrument voices — the General MIDI programs offered by the instrument.
//!
//! The engine treats a [`Voice`] as an opaque backend id; the MIDI backend
//! turns it into a Program Change.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Voices offered to the player, by General MIDI program number (0-indexed).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Voice {
    AcousticGrandPiano = 0,
    ElectricPiano      = 4,
    MusicBox           = 10,
    Vibraphone         = 11,
    Marimba            = 12,
    ChurchOrgan        = 19,
    NylonGuitar        = 24,
    Violin             = 40,
    Cello              = 42,
    StringEnsemble     = 48,
    ChoirAahs          = 52,
    Trumpet            = 56,
    Flute              = 73,
    SquareLead         = 80,
    VoiceLead          = 85,
    WarmPad            = 89,
    Kalimba            = 108,
}

impl Voice {
    /// Every voice, in menu order.
    pub const ALL: [Voice; 17] = [
        Voice::AcousticGrandPiano,
        Voice::ElectricPiano,
        Voice::MusicBox,
        Voice::Vibraphone,
        Voice::Marimba,
        Voice::ChurchOrgan,
        Voice::NylonGuitar,
        Voice::Violin,
        Voice::Cello,
        Voice::StringEnsemble,
        Voice::ChoirAahs,
        Voice::Trumpet,
        Voice::Flute,
        Voice::SquareLead,
        Voice::VoiceLead,
        Voice::WarmPad,
        Voice::Kalimba,
    ];

    /// The voice used while gliding: a sustained, bowed timbre that
    /// tolerates continuous pitch bends.
    pub const GLIDE: Voice = Voice::Violin;

    /// Raw MIDI program number (0–127).
    pub fn program(self) -> u8 { self as u8 }

    /// Look a voice up by program number.
    pub fn from_program(program: u8) -> Option<Voice> {
        Voice::ALL.iter().copied().find(|v| v.program() == program)
    }

    /// The voice after this one in [`Voice::ALL`], wrapping.
    pub fn next(self) -> Voice {
        let i = Voice::ALL.iter().position(|v| *v == self).unwrap_or(0);
        Voice::ALL[(i + 1) % Voice::ALL.len()]
    }

    /// Human-readable name.
    pub fn name(self) -> &'static str {
        match self {
            Voice::AcousticGrandPiano => "Acoustic Grand Piano",
            Voice::ElectricPiano      => "Electric Piano",
            Voice::MusicBox           => "Music Box",
            Voice::Vibraphone         => "Vibraphone",
            Voice::Marimba            => "Marimba",
            Voice::ChurchOrgan        => "Church Organ",
            Voice::NylonGuitar        => "Nylon Guitar",
            Voice::Violin             => "Violin",
            Voice::Cello              => "Cello",
            Voice::StringEnsemble     => "String Ensemble",
            Voice::ChoirAahs          => "Choir Aahs",
            Voice::Trumpet            => "Trumpet",
            Voice::Flute              => "Flute",
            Voice::SquareLead         => "Square Lead",
            Voice::VoiceLead          => "Voice Lead",
            Voice::WarmPad            => "Warm Pad",
            Voice::Kalimba            => "Kalimba",
        }
    }
}

impl Default for Voice {
    fn default() -> Self { Voice::AcousticGrandPiano }
}

impl fmt::Display for Voice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Voice {
    type Err = String;

    /// Accepts a name (case-insensitive, separators ignored) or a program
    /// number from [`Voice::ALL`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(program) = s.trim().parse::<u8>() {
            return Voice::from_program(program)
                .ok_or_else(|| format!("no voice with program {}", program));
        }
        let key: String = s.chars()
            .filter(|c| c.is_alphanumeric())
            .flat_map(char::to_lowercase)
            .collect();
        Voice::ALL
            .iter()
            .copied()
            .find(|v| {
                v.name().chars()
                    .filter(|c| c.is_alphanumeric())
                    .flat_map(char::to_lowercase)
                    .collect::<String>() == key
            })
            .ok_or_else(|| format!("unknown voice: {:?}", s))
    }
}
