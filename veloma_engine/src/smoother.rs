//! Single-pole low-pass smoothing of pitch and volume.
//!
//! One step per control tick:
//!
//! ```text
//! current += (target − current) · factor
//! ```
//!
//! The recurrence is per tick, not per second, so after `n` ticks the
//! remaining error is exactly `(1 − factor)^n` of the initial error.

#[derive(Clone, Debug, PartialEq)]
pub struct ParameterSmoother {
    factor: f32,
    pitch:  f32,
    volume: f32,
}

impl ParameterSmoother {
    pub fn new(factor: f32, pitch: f32, volume: f32) -> Self {
        ParameterSmoother { factor, pitch, volume }
    }

    pub fn factor(&self) -> f32 { self.factor }
    pub fn set_factor(&mut self, factor: f32) { self.factor = factor; }

    pub fn pitch(&self) -> f32 { self.pitch }
    pub fn volume(&self) -> f32 { self.volume }

    /// Advance both values one tick toward their targets.
    pub fn step(&mut self, target_pitch: f32, target_volume: f32) -> (f32, f32) {
        self.pitch  += (target_pitch  - self.pitch)  * self.factor;
        self.volume += (target_volume - self.volume) * self.factor;
        (self.pitch, self.volume)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factor_one_snaps_in_one_tick() {
        let mut s = ParameterSmoother::new(1.0, 60.0, 0.0);
        assert_eq!(s.step(71.5, 0.8), (71.5, 0.8));
    }

    #[test]
    fn geometric_decay() {
        let f = 0.25_f32;
        let (p0, v0) = (60.0_f32, 0.0_f32);
        let (pt, vt) = (72.0_f32, 1.0_f32);
        let mut s = ParameterSmoother::new(f, p0, v0);
        for n in 1..=20 {
            let (p, v) = s.step(pt, vt);
            let k = (1.0 - f).powi(n);
            assert!(((p - pt).abs() - (p0 - pt).abs() * k).abs() < 1e-3, "pitch tick {}", n);
            assert!(((v - vt).abs() - (v0 - vt).abs() * k).abs() < 1e-5, "volume tick {}", n);
        }
    }

    #[test]
    fn never_overshoots() {
        let mut s = ParameterSmoother::new(0.6, 0.0, 1.0);
        for _ in 0..50 {
            let (p, v) = s.step(10.0, 0.0);
            assert!(p <= 10.0);
            assert!(v >= 0.0);
        }
    }
}
