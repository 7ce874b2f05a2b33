//! # veloma_music
//!
//! The musical vocabulary of the Veloma gesture instrument:
//!
//! * [`map_range`] — clamped linear interpolation used by every gesture axis.
//! * [`Scale`] — the closed set of supported scales, each with its own
//!   degree generator.
//! * [`PitchPool`] — the ascending set of playable pitches for a root key,
//!   octave span and scale, plus [`quantize`] to turn a hand position into a
//!   pool index.
//! * [`Voice`] — General MIDI programs used as instrument voices.
//! * [`note_name`] — display names for pitches.
//!
//! ## Quick start
//!
//! ```rust
//! use veloma_music::{PitchPool, Scale, quantize};
//!
//! let pool = PitchPool::build(60, 1, Scale::Major).unwrap();
//! assert_eq!(pool.pitches(), &[60, 62, 64, 65, 67, 69, 71, 72]);
//!
//! // Right half of the frame is the playable region.
//! let idx = quantize(0.52, 0.5, 0.99, pool.len()).unwrap();
//! assert_eq!(pool.get(idx), Some(60));
//! ```

pub mod scale;
pub mod pool;
pub mod voice;

pub use scale::{Degrees, Scale, ScaleParseError};
pub use pool::{quantize, PitchPool, PoolError};
pub use voice::Voice;

/// Semitones per octave.
pub const OCTAVE: i32 = 12;

// ════════════════════════════════════════════════════════════════════════════
// map_range — clamped linear interpolation
// ════════════════════════════════════════════════════════════════════════════

/// Map `value` from `[in_min, in_max]` onto `[out_min, out_max]`.
///
/// The input bounds may be given in either order; `value` is clamped into
/// them before interpolating, so the result always lies between `out_min`
/// and `out_max`.  A zero-width input range yields `out_min`.
///
/// ```rust
/// use veloma_music::map_range;
///
/// assert_eq!(map_range(0.75, 0.5, 1.0, 60.0, 84.0), 72.0);
/// assert_eq!(map_range(2.0,  0.0, 1.0,  0.0, 10.0), 10.0);
/// assert_eq!(map_range(0.3,  0.5, 0.5,  7.0, 99.0),  7.0);
/// ```
pub fn map_range(value: f32, in_min: f32, in_max: f32, out_min: f32, out_max: f32) -> f32 {
    let span = in_max - in_min;
    if span == 0.0 {
        return out_min;
    }
    let (lo, hi) = if in_min <= in_max { (in_min, in_max) } else { (in_max, in_min) };
    let v = value.clamp(lo, hi);
    let t = ((v - in_min) / span).clamp(0.0, 1.0);
    out_min + t * (out_max - out_min)
}

/// Scientific pitch name of a MIDI note (`60` → `"C4"`).
pub fn note_name(pitch: i32) -> String {
    const NAMES: [&str; 12] = ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"];
    let class  = pitch.rem_euclid(OCTAVE) as usize;
    let octave = pitch.div_euclid(OCTAVE) - 1;
    format!("{}{}", NAMES[class], octave)
}

// ════════════════════════════════════════════════════════════════════════════
// Tests
// ════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_range_endpoints() {
        assert_eq!(map_range(0.0, 0.0, 0.5, 0.0, 1.0), 0.0);
        assert_eq!(map_range(0.5, 0.0, 0.5, 0.0, 1.0), 1.0);
        assert_eq!(map_range(0.5, 0.5, 0.99, 60.0, 84.0), 60.0);
        assert_eq!(map_range(0.99, 0.5, 0.99, 60.0, 84.0), 84.0);
    }

    #[test]
    fn map_range_clamps_outside_input() {
        assert_eq!(map_range(-3.0, 0.0, 1.0, 10.0, 20.0), 10.0);
        assert_eq!(map_range(7.0,  0.0, 1.0, 10.0, 20.0), 20.0);
    }

    #[test]
    fn map_range_output_stays_in_bounds() {
        let cases = [
            (0.0, 1.0, 5.0, -5.0),
            (-2.0, 3.0, 0.0, 1.0),
            (0.25, 0.75, 100.0, 40.0),
        ];
        for &(in_min, in_max, out_min, out_max) in &cases {
            let lo = f32::min(out_min, out_max);
            let hi = f32::max(out_min, out_max);
            let mut v = -4.0_f32;
            while v <= 4.0 {
                let y = map_range(v, in_min, in_max, out_min, out_max);
                assert!(y >= lo - 1e-5 && y <= hi + 1e-5, "{} -> {}", v, y);
                v += 0.125;
            }
        }
    }

    #[test]
    fn map_range_degenerate_input_returns_out_min() {
        for v in [-1.0, 0.0, 0.5, 1.0, 42.0] {
            assert_eq!(map_range(v, 0.5, 0.5, 3.0, 9.0), 3.0);
        }
    }

    #[test]
    fn map_range_reversed_input_bounds() {
        // in_min > in_max: still anchored at in_min → out_min.
        assert_eq!(map_range(1.0, 1.0, 0.0, 0.0, 10.0), 0.0);
        assert_eq!(map_range(0.0, 1.0, 0.0, 0.0, 10.0), 10.0);
        assert!((map_range(0.25, 1.0, 0.0, 0.0, 10.0) - 7.5).abs() < 1e-5);
    }

    #[test]
    fn note_names() {
        assert_eq!(note_name(60), "C4");
        assert_eq!(note_name(61), "C#4");
        assert_eq!(note_name(69), "A4");
        assert_eq!(note_name(0), "C-1");
        assert_eq!(note_name(127), "G9");
    }

    #[test]
    fn map_range_inverted_output() {
        assert!((map_range(0.25, 0.0, 1.0, 1.0, 0.0) - 0.75).abs() < 1e-6);
    }
}
