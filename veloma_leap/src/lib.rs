//! # veloma_leap
//!
//! Play the Veloma gesture instrument with your hands: a LeapMotion (or the
//! mouse and keyboard) provides hand positions, the engine turns them into
//! notes, and a General MIDI synthesiser plays them.
//!
//! ## Gesture → sound mapping
//!
//! | Gesture | Hand | Effect |
//! |---|---|---|
//! | Move left/right in the right half | Pitch hand (rightmost) | Pitch |
//! | Raise / lower | Volume hand (the other, or the same with one hand) | Volume |
//! | Pinch | Pitch hand | Re-strike the current note (Discrete) |
//! | Drop below the threshold or leave | Either | Silence |
//!
//! ## Feature flags
//!
//! * (default) — **Simulation mode**: the mouse is the pitch hand, the
//!   arrow keys move a second hand.
//! * `leap` — **Hardware mode**: polls a real LeapMotion controller via LeapC.
//!
//! ### Keyboard
//!
//! | Key | Action |
//! |---|---|
//! | `M` | Toggle Glide / Discrete |
//! | `S` | Next scale |
//! | `V` | Next voice |
//! | `-` / `+` | Fewer / more octaves |
//! | `[` / `]` | Root key down / up |
//! | `,` / `.` | Smoothing down / up |
//! | `B` | Show / hide note boundaries |
//! | `H` | Simulation: toggle the second hand |
//! | `Space` | Simulation: trigger |
//! | `Q` / `Esc` | Quit |

pub mod hand_source;
pub mod midi;
pub mod visualizer;
pub mod app;
