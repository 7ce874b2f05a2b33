//! Hand data as delivered by a hand-tracking source.
//!
//! Coordinates are normalised to the camera frame: `x` grows to the right,
//! `y` grows downward, both in `[0, 1]`.

/// Landmark index of the wrist in a 21-point hand skeleton.
pub const WRIST: usize = 0;
/// Landmark index of the middle-finger knuckle (MCP joint).
pub const MIDDLE_MCP: usize = 9;

// ════════════════════════════════════════════════════════════════════════════
// Hand
// ════════════════════════════════════════════════════════════════════════════

/// One tracked hand.  No identity is carried across frames.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Hand {
    pub palm_center: (f32, f32),
    /// Rightmost x of any landmark; `None` when the tracker only reports
    /// the palm.
    pub rightmost_x: Option<f32>,
    /// The tracker recognised the trigger pose on this hand.
    pub trigger:     bool,
}

impl Hand {
    pub fn new(x: f32, y: f32) -> Self {
        Hand { palm_center: (x, y), rightmost_x: None, trigger: false }
    }

    pub fn with_rightmost_x(mut self, x: f32) -> Self {
        self.rightmost_x = Some(x);
        self
    }

    pub fn with_trigger(mut self, trigger: bool) -> Self {
        self.trigger = trigger;
        self
    }

    /// The x used to drive pitch: rightmost landmark, else the palm.
    pub fn pitch_x(&self) -> f32 {
        self.rightmost_x.unwrap_or(self.palm_center.0)
    }

    /// Reduce a landmark skeleton (wrist first, middle MCP at index 9) to
    /// a [`Hand`].  The palm centre is the midpoint of wrist and middle MCP.
    ///
    /// Returns `None` for skeletons too short to contain the MCP joint.
    pub fn from_landmarks(landmarks: &[(f32, f32)], trigger: bool) -> Option<Hand> {
        let wrist = *landmarks.get(WRIST)?;
        let mcp   = *landmarks.get(MIDDLE_MCP)?;
        let palm  = ((wrist.0 + mcp.0) / 2.0, (wrist.1 + mcp.1) / 2.0);
        let rightmost = landmarks.iter().map(|p| p.0).fold(f32::NEG_INFINITY, f32::max);
        Some(Hand { palm_center: palm, rightmost_x: Some(rightmost), trigger })
    }
}

// ════════════════════════════════════════════════════════════════════════════
// HandFrame
// ════════════════════════════════════════════════════════════════════════════

/// The hands seen in one tracking frame.  Only the first two are used.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HandFrame {
    pub hands: Vec<Hand>,
}

impl HandFrame {
    pub fn empty() -> Self { HandFrame { hands: Vec::new() } }
    pub fn one(hand: Hand) -> Self { HandFrame { hands: vec![hand] } }
    pub fn two(a: Hand, b: Hand) -> Self { HandFrame { hands: vec![a, b] } }

    pub fn is_empty(&self) -> bool { self.hands.is_empty() }

    /// At most the first two hands.
    pub fn used(&self) -> &[Hand] {
        &self.hands[..self.hands.len().min(2)]
    }
}

// ════════════════════════════════════════════════════════════════════════════
// HandHold — bridge short tracking dropouts
// ════════════════════════════════════════════════════════════════════════════

/// Repeats the last non-empty frame for up to `hold_seconds` after the
/// tracker loses the hands, so a single dropped detection does not cut a
/// sustained note.
#[derive(Clone, Debug)]
pub struct HandHold {
    hold_seconds: f64,
    last:         Option<(HandFrame, f64)>,
}

impl HandHold {
    pub const DEFAULT_SECONDS: f64 = 0.5;

    pub fn new(hold_seconds: f64) -> Self {
        HandHold { hold_seconds: hold_seconds.max(0.0), last: None }
    }

    /// Pass `frame` through, or substitute the held frame if `frame` is
    /// empty and the last sighting is younger than the hold time.
    pub fn filter(&mut self, frame: HandFrame, now: f64) -> HandFrame {
        if !frame.is_empty() {
            self.last = Some((frame.clone(), now));
            return frame;
        }
        match &self.last {
            Some((held, seen)) if now - seen < self.hold_seconds => held.clone(),
            _ => {
                self.last = None;
                frame
            }
        }
    }
}

impl Default for HandHold {
    fn default() -> Self { HandHold::new(HandHold::DEFAULT_SECONDS) }
}
