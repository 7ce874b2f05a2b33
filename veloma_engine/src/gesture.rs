//! Gesture mapping — hands in, pitch/volume targets out.
//!
//! Roles are decided from scratch on every frame: with two hands the one
//! further right plays pitch and the other plays volume.  Nothing about
//! "which physical hand" survives between frames.

use veloma_music::{map_range, quantize};

use crate::config::{Mode, Tuning};
use crate::hand::HandFrame;

/// `1 − y` values at or above this give full volume.
const VOLUME_INPUT_MAX: f32 = 0.5;

// ════════════════════════════════════════════════════════════════════════════
// HandRoles
// ════════════════════════════════════════════════════════════════════════════

/// Raw per-frame control sources after role assignment.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HandRoles {
    /// Index of the pitch hand within [`HandFrame::used`].
    pub pitch_hand:    usize,
    /// Normalised x of the pitch hand.
    pub pitch_source:  f32,
    /// `1 − y` of the volume hand.
    pub volume_source: f32,
    /// Trigger flag of the pitch hand.
    pub trigger:       bool,
}

/// Assign pitch and volume roles.  `None` when no hand is present.
///
/// On equal palm x the first hand in the frame plays pitch.
pub fn assign_roles(frame: &HandFrame) -> Option<HandRoles> {
    let hands = frame.used();
    let (pitch, volume) = match hands {
        [] => return None,
        [_] => (0, 0),
        [a, b, ..] => if b.palm_center.0 > a.palm_center.0 { (1, 0) } else { (0, 1) },
    };
    let (pitch_hand, volume_hand) = (&hands[pitch], &hands[volume]);
    Some(HandRoles {
        pitch_hand:    pitch,
        pitch_source:  pitch_hand.pitch_x(),
        volume_source: 1.0 - volume_hand.palm_center.1,
        trigger:       pitch_hand.trigger,
    })
}

// ════════════════════════════════════════════════════════════════════════════
// Targets — the update-path half of the control state
// ════════════════════════════════════════════════════════════════════════════

/// Target-side control state, written by the hand-tracking path.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Targets {
    pub pitch:          f32,
    pub volume:         f32,
    pub hands_detected: bool,
    pub trigger:        bool,
    /// Normalised x of the pitch hand, for Discrete-mode block lookup.
    pub pitch_source:   Option<f32>,
}

impl Targets {
    /// Resting targets: silent, pitched at the root.
    pub fn at_rest(tuning: &Tuning) -> Self {
        Targets {
            pitch:          tuning.config.root_key as f32,
            volume:         0.0,
            hands_detected: false,
            trigger:        false,
            pitch_source:   None,
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// GestureMapper
// ════════════════════════════════════════════════════════════════════════════

/// Stateless mapper from a [`HandFrame`] to [`Targets`].
#[derive(Clone, Copy, Debug, Default)]
pub struct GestureMapper;

impl GestureMapper {
    /// Fold `frame` into `targets` under `tuning`.
    ///
    /// With no hands only the detection and trigger flags change; pitch and
    /// volume targets keep their last values.
    pub fn apply(&self, frame: &HandFrame, tuning: &Tuning, targets: &mut Targets) {
        let roles = match assign_roles(frame) {
            Some(r) => r,
            None => {
                targets.hands_detected = false;
                targets.trigger = false;
                return;
            }
        };

        targets.hands_detected = true;
        targets.trigger        = roles.trigger;
        targets.pitch_source   = Some(roles.pitch_source);
        targets.volume         = map_range(roles.volume_source, 0.0, VOLUME_INPUT_MAX, 0.0, 1.0);

        let (start, end) = tuning.pitch_region();
        match tuning.config.mode {
            Mode::Glide => {
                let (lo, hi) = tuning.pitch_span();
                targets.pitch = map_range(roles.pitch_source, start, end, lo, hi);
            }
            Mode::Discrete => {
                let pool = &tuning.pool;
                if let Some(p) = quantize(roles.pitch_source, start, end, pool.len())
                    .and_then(|i| pool.get(i))
                {
                    targets.pitch = p as f32;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InstrumentConfig;
    use crate::hand::Hand;
    use veloma_music::Scale;

    fn tuning(mode: Mode) -> Tuning {
        Tuning::new(InstrumentConfig {
            mode,
            root_key: 60,
            octave_range: 1,
            scale: Scale::Chromatic,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn no_hands_no_roles() {
        assert_eq!(assign_roles(&HandFrame::empty()), None);
    }

    #[test]
    fn single_hand_drives_both() {
        let r = assign_roles(&HandFrame::one(Hand::new(0.7, 0.3).with_rightmost_x(0.75))).unwrap();
        assert_eq!(r.pitch_source, 0.75);
        assert!((r.volume_source - 0.7).abs() < 1e-6);
    }

    #[test]
    fn two_hand_roles_are_order_independent() {
        let a = Hand::new(0.7, 0.3);
        let b = Hand::new(0.3, 0.6);
        let forward  = assign_roles(&HandFrame::two(a, b)).unwrap();
        let backward = assign_roles(&HandFrame::two(b, a)).unwrap();
        assert_eq!((forward.pitch_hand, backward.pitch_hand), (0, 1));
        assert_eq!(forward.pitch_source, backward.pitch_source);
        assert_eq!(forward.volume_source, backward.volume_source);
        assert_eq!(forward.pitch_source, 0.7);
        assert!((forward.volume_source - 0.4).abs() < 1e-6);
    }

    #[test]
    fn tie_goes_to_first_hand() {
        let first  = Hand::new(0.6, 0.1).with_trigger(true);
        let second = Hand::new(0.6, 0.9);
        let r = assign_roles(&HandFrame::two(first, second)).unwrap();
        assert_eq!(r.pitch_hand, 0);
        assert!(r.trigger);
        assert!((r.volume_source - 0.1).abs() < 1e-6);
    }

    #[test]
    fn trigger_comes_from_pitch_hand() {
        let pitch  = Hand::new(0.8, 0.5);
        let volume = Hand::new(0.2, 0.2).with_trigger(true);
        assert!(!assign_roles(&HandFrame::two(volume, pitch)).unwrap().trigger);
    }

    #[test]
    fn volume_uses_upper_half_mapping() {
        let t = tuning(Mode::Glide);
        let mut tg = Targets::at_rest(&t);
        GestureMapper.apply(&HandFrame::one(Hand::new(0.7, 0.75)), &t, &mut tg);
        assert!((tg.volume - 0.5).abs() < 1e-6);
        GestureMapper.apply(&HandFrame::one(Hand::new(0.7, 0.2)), &t, &mut tg);
        assert_eq!(tg.volume, 1.0);
        GestureMapper.apply(&HandFrame::one(Hand::new(0.7, 1.0)), &t, &mut tg);
        assert_eq!(tg.volume, 0.0);
    }

    #[test]
    fn glide_pitch_is_continuous() {
        let t = tuning(Mode::Glide);
        let mut tg = Targets::at_rest(&t);
        GestureMapper.apply(&HandFrame::one(Hand::new(0.5, 0.2)), &t, &mut tg);
        assert_eq!(tg.pitch, 60.0);
        GestureMapper.apply(&HandFrame::one(Hand::new(0.99, 0.2)), &t, &mut tg);
        assert_eq!(tg.pitch, 72.0);
        GestureMapper.apply(&HandFrame::one(Hand::new(0.745, 0.2)), &t, &mut tg);
        assert!((tg.pitch - 66.0).abs() < 1e-3);
        // Left of the region clamps to the root.
        GestureMapper.apply(&HandFrame::one(Hand::new(0.2, 0.2)), &t, &mut tg);
        assert_eq!(tg.pitch, 60.0);
    }

    #[test]
    fn discrete_pitch_snaps_to_pool() {
        let t = tuning(Mode::Discrete);
        let mut tg = Targets::at_rest(&t);
        GestureMapper.apply(&HandFrame::one(Hand::new(0.5, 0.2)), &t, &mut tg);
        assert_eq!(tg.pitch, 60.0);
        GestureMapper.apply(&HandFrame::one(Hand::new(0.98, 0.2)), &t, &mut tg);
        assert_eq!(tg.pitch, 72.0);
        assert_eq!(tg.pitch.fract(), 0.0);
    }

    #[test]
    fn discrete_pitch_unchanged_left_of_region() {
        let t = tuning(Mode::Discrete);
        let mut tg = Targets::at_rest(&t);
        GestureMapper.apply(&HandFrame::one(Hand::new(0.98, 0.2)), &t, &mut tg);
        GestureMapper.apply(&HandFrame::one(Hand::new(0.3, 0.2)), &t, &mut tg);
        assert_eq!(tg.pitch, 72.0);
        assert_eq!(tg.pitch_source, Some(0.3));
    }

    #[test]
    fn no_hands_freezes_targets() {
        let t = tuning(Mode::Glide);
        let mut tg = Targets::at_rest(&t);
        GestureMapper.apply(&HandFrame::one(Hand::new(0.8, 0.2).with_trigger(true)), &t, &mut tg);
        let before = tg;
        GestureMapper.apply(&HandFrame::empty(), &t, &mut tg);
        assert!(!tg.hands_detected);
        assert!(!tg.trigger);
        assert_eq!(tg.pitch, before.pitch);
        assert_eq!(tg.volume, before.volume);
    }
}
