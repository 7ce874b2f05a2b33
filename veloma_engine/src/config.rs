//! Instrument configuration and the immutable [`Tuning`] snapshot.
//!
//! The control loop never reads an [`InstrumentConfig`] directly.  Every
//! change builds a fresh [`Tuning`] (config plus the pitch pool derived from
//! it) which the engine publishes with a single pointer swap.

use serde::{Deserialize, Serialize};
use veloma_music::{PitchPool, Scale, Voice, OCTAVE};

use crate::error::EngineError;

/// Left edge of the playable region.  Everything left of it is silence.
pub const PITCH_REGION_START: f32 = 0.5;

// ════════════════════════════════════════════════════════════════════════════
// Mode
// ════════════════════════════════════════════════════════════════════════════

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Continuous pitch with a sustained note.
    Glide,
    /// Quantized pitch, one short note per block entered.
    #[default]
    Discrete,
}

impl Mode {
    pub fn name(self) -> &'static str {
        match self {
            Mode::Glide    => "Glide",
            Mode::Discrete => "Discrete",
        }
    }

    pub fn toggled(self) -> Mode {
        match self {
            Mode::Glide    => Mode::Discrete,
            Mode::Discrete => Mode::Glide,
        }
    }
}

impl std::str::FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "glide"    => Ok(Mode::Glide),
            "discrete" => Ok(Mode::Discrete),
            other      => Err(format!("unknown mode: {:?} (expected glide or discrete)", other)),
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// InstrumentConfig
// ════════════════════════════════════════════════════════════════════════════

/// Everything the player can change about the instrument.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentConfig {
    /// Lowest pitch (MIDI note number).
    pub root_key:               i32,
    /// Octaves above the root covered by the playable region.
    pub octave_range:           u32,
    pub scale:                  Scale,
    pub mode:                   Mode,
    pub voice:                  Voice,
    /// Per-tick smoothing coefficient in (0, 1]; 1.0 snaps immediately.
    pub smoothing_factor:       f32,
    /// Notes sound only while the smoothed volume is strictly above this.
    pub volume_threshold:       f32,
    /// Minimum gap between Discrete-mode notes.
    pub note_cooldown_seconds:  f64,
    /// Parallel voices per Glide note.
    pub unison_voice_count:     usize,
    /// Length of each Discrete-mode note.
    pub momentary_note_seconds: f32,
    /// Control loop rate.
    pub tick_hz:                u32,
    /// Fraction reserved at the right edge of the frame.
    pub pitch_margin:           f32,
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        InstrumentConfig {
            root_key:               60,
            octave_range:           2,
            scale:                  Scale::Chromatic,
            mode:                   Mode::Discrete,
            voice:                  Voice::Violin,
            smoothing_factor:       1.0,
            volume_threshold:       0.3,
            note_cooldown_seconds:  0.2,
            unison_voice_count:     3,
            momentary_note_seconds: 0.5,
            tick_hz:                1000,
            pitch_margin:           0.01,
        }
    }
}

impl InstrumentConfig {
    /// Check every numeric field against its allowed range.
    pub fn validate(&self) -> Result<(), EngineError> {
        if !(0..=127).contains(&self.root_key) {
            return Err(EngineError::invalid("root_key", format!("{} is not a MIDI note", self.root_key)));
        }
        if self.octave_range == 0 {
            return Err(EngineError::invalid("octave_range", "must be at least 1"));
        }
        if self.root_key + self.octave_range as i32 * OCTAVE > 127 {
            return Err(EngineError::invalid(
                "octave_range",
                format!("{} octaves above {} leaves the MIDI range", self.octave_range, self.root_key),
            ));
        }
        if !(self.smoothing_factor > 0.0 && self.smoothing_factor <= 1.0) {
            return Err(EngineError::invalid("smoothing_factor", format!("{} not in (0, 1]", self.smoothing_factor)));
        }
        if !(0.0..1.0).contains(&self.volume_threshold) {
            return Err(EngineError::invalid("volume_threshold", format!("{} not in [0, 1)", self.volume_threshold)));
        }
        if !(self.note_cooldown_seconds >= 0.0) {
            return Err(EngineError::invalid("note_cooldown_seconds", "must be non-negative"));
        }
        if self.unison_voice_count == 0 {
            return Err(EngineError::invalid("unison_voice_count", "must be at least 1"));
        }
        if !(self.momentary_note_seconds > 0.0) {
            return Err(EngineError::invalid("momentary_note_seconds", "must be positive"));
        }
        if self.tick_hz == 0 {
            return Err(EngineError::invalid("tick_hz", "must be positive"));
        }
        if !(0.0..0.5).contains(&self.pitch_margin) {
            return Err(EngineError::invalid("pitch_margin", format!("{} not in [0, 0.5)", self.pitch_margin)));
        }
        Ok(())
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Tuning — validated config + derived pitch pool
// ════════════════════════════════════════════════════════════════════════════

/// An immutable, validated configuration together with its pitch pool.
#[derive(Clone, Debug, PartialEq)]
pub struct Tuning {
    pub config: InstrumentConfig,
    pub pool:   PitchPool,
}

impl Tuning {
    pub fn new(config: InstrumentConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let pool = PitchPool::build(config.root_key, config.octave_range, config.scale)?;
        Ok(Tuning { config, pool })
    }

    /// `(start, end)` of the playable region in normalised frame x.
    pub fn pitch_region(&self) -> (f32, f32) {
        (PITCH_REGION_START, 1.0 - self.config.pitch_margin)
    }

    /// Lowest and highest continuous pitch reachable in Glide mode.
    pub fn pitch_span(&self) -> (f32, f32) {
        let lo = self.config.root_key;
        let hi = lo + self.config.octave_range as i32 * OCTAVE;
        (lo as f32, hi as f32)
    }

    /// True when `other` plays from a different pool.
    pub fn pool_differs(&self, other: &Tuning) -> bool {
        self.pool != other.pool
    }
}
