//! Hand sources — LeapMotion hardware and mouse/keyboard simulation.
//!
//! The public interface is a [`HandFrame`] per tracking frame, delivered
//! over an `mpsc` channel.  Consumers don't need to know whether frames came
//! from real hardware or the simulator.

use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;

use veloma_engine::{Hand, HandFrame};

// ════════════════════════════════════════════════════════════════════════════
// HandSource trait — unified interface for hw and sim
// ════════════════════════════════════════════════════════════════════════════

/// Anything that can deliver [`HandFrame`]s over a channel.
///
/// `run` returns when the receiver hangs up or the source is exhausted.
pub trait HandSource: Send + 'static {
    fn run(self: Box<Self>, tx: Sender<HandFrame>);
}

/// Spawn a hand source on its own thread and return the receiving end.
pub fn spawn_hand_source<H: HandSource>(source: H) -> Receiver<HandFrame> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || Box::new(source).run(tx));
    rx
}

// ════════════════════════════════════════════════════════════════════════════
// SimHandSource — mouse/keyboard simulation (always available)
// ════════════════════════════════════════════════════════════════════════════

/// Raw pointer/key state sampled from the simulation window each frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SimInput {
    /// Normalised mouse position; `None` when the pointer is outside.
    pub mouse:       Option<(f32, f32)>,
    /// Palm position of the keyboard-driven volume hand.
    pub volume_hand: (f32, f32),
    /// Show the keyboard hand as a second tracked hand.
    pub two_hands:   bool,
    /// Trigger key held.
    pub trigger:     bool,
}

impl SimInput {
    /// The frame a tracker would report for this input.
    ///
    /// The mouse is the pitch hand.  In two-hand mode the keyboard hand is
    /// added as a second hand; it only takes the pitch role if the mouse is
    /// left of it, exactly like a real left/right pair would.
    pub fn to_frame(&self) -> HandFrame {
        let (mx, my) = match self.mouse {
            Some(p) => p,
            None => return HandFrame::empty(),
        };
        let pointer = Hand::new(mx, my).with_trigger(self.trigger);
        if self.two_hands {
            let (vx, vy) = self.volume_hand;
            HandFrame::two(pointer, Hand::new(vx, vy))
        } else {
            HandFrame::one(pointer)
        }
    }
}

/// Hand source driven by [`SimInput`] samples from the visualizer window.
pub struct SimHandSource {
    pub rx: Receiver<SimInput>,
}

impl HandSource for SimHandSource {
    fn run(self: Box<Self>, tx: Sender<HandFrame>) {
        for input in self.rx {
            if tx.send(input.to_frame()).is_err() { return; }
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// LeapHandSource — real hardware (feature = "leap")
// ════════════════════════════════════════════════════════════════════════════

/// Hand source backed by a real LeapMotion controller.
///
/// Requires the `leap` feature flag and the LeapC shared library installed.
///
/// Leap coordinates are millimetres above the device: `x` left/right,
/// `y` height.  They are normalised to the camera-frame convention the
/// engine expects (`x` grows right, `y` grows downward) over the
/// interaction box below.
#[cfg(feature = "leap")]
pub struct LeapHandSource;

#[cfg(feature = "leap")]
mod leap {
    /// Horizontal extent of the interaction box (mm).
    pub const X_MIN: f32 = -200.0;
    pub const X_MAX: f32 =  200.0;
    /// Vertical extent (mm above the device).
    pub const Y_MIN: f32 = 100.0;
    pub const Y_MAX: f32 = 500.0;
    /// Pinch strength above which the trigger pose is recognised.
    pub const PINCH_TRIGGER: f32 = 0.8;

    pub fn norm_x(x: f32) -> f32 { ((x - X_MIN) / (X_MAX - X_MIN)).clamp(0.0, 1.0) }
    pub fn norm_y(y: f32) -> f32 { (1.0 - (y - Y_MIN) / (Y_MAX - Y_MIN)).clamp(0.0, 1.0) }
}

#[cfg(feature = "leap")]
impl HandSource for LeapHandSource {
    fn run(self: Box<Self>, tx: Sender<HandFrame>) {
        use leaprs::*;
        use tracing::{error, info};

        let mut connection = match Connection::create(ConnectionConfig::default()) {
            Ok(c)  => c,
            Err(e) => { error!("failed to create LeapC connection: {:?}", e); return; }
        };
        if let Err(e) = connection.open() {
            error!("failed to open LeapMotion device: {:?}", e);
            return;
        }
        info!("LeapMotion connection open");

        loop {
            let msg = match connection.poll(100) {
                Ok(m)  => m,
                Err(_) => continue,
            };

            if let Event::Tracking(frame) = msg.event() {
                // `leaprs::*` shadows our `Hand`; spell it out.
                let hands: Vec<veloma_engine::Hand> = frame.hands().map(|h| {
                    let palm = h.palm().position();
                    let rightmost = h.digits()
                        .map(|d| d.distal().next_joint().x)
                        .fold(palm.x, f32::max);
                    veloma_engine::Hand::new(leap::norm_x(palm.x), leap::norm_y(palm.y))
                        .with_rightmost_x(leap::norm_x(rightmost))
                        .with_trigger(h.pinch_strength() > leap::PINCH_TRIGGER)
                }).collect();

                if tx.send(HandFrame { hands }).is_err() { return; }
            }
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Tests
// ════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    fn input(mouse: Option<(f32, f32)>, two_hands: bool) -> SimInput {
        SimInput { mouse, volume_hand: (0.2, 0.4), two_hands, trigger: false }
    }

    #[test]
    fn pointer_outside_window_is_no_hands() {
        assert!(input(None, true).to_frame().is_empty());
    }

    #[test]
    fn single_hand_follows_mouse() {
        let f = input(Some((0.7, 0.3)), false).to_frame();
        assert_eq!(f.hands, vec![Hand::new(0.7, 0.3)]);
    }

    #[test]
    fn two_hand_mode_adds_keyboard_hand() {
        let mut i = input(Some((0.7, 0.3)), true);
        i.trigger = true;
        let f = i.to_frame();
        assert_eq!(f.hands.len(), 2);
        assert!(f.hands[0].trigger);
        assert_eq!(f.hands[1].palm_center, (0.2, 0.4));
    }

    #[test]
    fn sim_source_forwards_frames_until_hangup() {
        let (tx, rx) = mpsc::channel();
        let frames = spawn_hand_source(SimHandSource { rx });
        tx.send(input(Some((0.6, 0.5)), false)).unwrap();
        tx.send(input(None, false)).unwrap();
        drop(tx);
        let got: Vec<HandFrame> = frames.iter().collect();
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].hands.len(), 1);
        assert!(got[1].is_empty());
    }
}
