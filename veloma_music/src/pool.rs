//! Pitch pools and position quantization.
//!
//! A [`PitchPool`] is the ordered set of pitches Discrete mode may play.  It
//! is built once per configuration change and never mutated afterwards;
//! callers that need a different pool build a new one and swap it in whole.

use std::fmt;

use crate::scale::Scale;
use crate::OCTAVE;

// ════════════════════════════════════════════════════════════════════════════
// PoolError
// ════════════════════════════════════════════════════════════════════════════

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PoolError {
    /// `octave_range` was zero.
    NoOctaves,
    /// No scale degree fell inside the requested range.
    Empty { root: i32, octave_range: u32, scale: Scale },
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolError::NoOctaves => write!(f, "octave range must be at least 1"),
            PoolError::Empty { root, octave_range, scale } => write!(
                f,
                "{} from root {} over {} octave(s) yields no pitches",
                scale, root, octave_range
            ),
        }
    }
}

impl std::error::Error for PoolError {}

// ════════════════════════════════════════════════════════════════════════════
// PitchPool
// ════════════════════════════════════════════════════════════════════════════

/// Ascending, non-empty set of absolute pitches (MIDI note numbers) within
/// `[root, root + 12 · octave_range]`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PitchPool {
    pitches: Vec<i32>,
}

impl PitchPool {
    /// Walk `scale`'s degree generator from `root`, keeping every degree up
    /// to and including `root + 12 · octave_range`.
    ///
    /// For [`Scale::Chromatic`] this is every semitone, `12 · octave_range + 1`
    /// pitches.  Other scales include the top root only when a degree lands
    /// exactly on it.
    pub fn build(root: i32, octave_range: u32, scale: Scale) -> Result<Self, PoolError> {
        if octave_range == 0 {
            return Err(PoolError::NoOctaves);
        }
        let top = root + octave_range as i32 * OCTAVE;
        let pitches: Vec<i32> = scale.degrees(root).take_while(|&p| p <= top).collect();
        if pitches.is_empty() {
            return Err(PoolError::Empty { root, octave_range, scale });
        }
        Ok(PitchPool { pitches })
    }

    pub fn pitches(&self) -> &[i32] { &self.pitches }
    pub fn len(&self) -> usize { self.pitches.len() }
    pub fn is_empty(&self) -> bool { self.pitches.is_empty() }
    pub fn get(&self, index: usize) -> Option<i32> { self.pitches.get(index).copied() }
    pub fn lowest(&self) -> i32 { self.pitches[0] }
    pub fn highest(&self) -> i32 { self.pitches[self.pitches.len() - 1] }
}

// ════════════════════════════════════════════════════════════════════════════
// quantize — position → pool index
// ════════════════════════════════════════════════════════════════════════════

/// Map a normalised position onto one of `pool_size` equal-width blocks
/// spanning `[region_start, region_end]`.
///
/// Positions left of `region_start` return `None`: that is the deliberate
/// "no note" zone, distinct from index 0.  Positions past `region_end`
/// clamp to the last block.  An empty pool returns `None`; a zero-width
/// region maps everything inside it to block 0.
pub fn quantize(position: f32, region_start: f32, region_end: f32, pool_size: usize) -> Option<usize> {
    if position < region_start || pool_size == 0 {
        return None;
    }
    let width = region_end - region_start;
    if width <= 0.0 {
        return Some(0);
    }
    let clamped = position.min(region_end);
    let block   = width / pool_size as f32;
    let index   = ((clamped - region_start) / block).floor() as usize;
    Some(index.min(pool_size - 1))
}

// ════════════════════════════════════════════════════════════════════════════
// Tests
// ════════════════════════════════════════════════════════════════════════════
