//! # veloma_engine
//!
//! Turns live hand positions into note commands for an audio backend.
//!
//! ```text
//! HandFrame ─► GestureMapper ─► Targets ─► ParameterSmoother ─► NoteLifecycleController ─► AudioBackend
//!   (any thread, last write wins)           └──────────── control loop, fixed tick rate ────────────┘
//! ```
//!
//! ## Hand roles
//!
//! | Hands | Pitch from | Volume from |
//! |---|---|---|
//! | 0 | — (targets frozen, gate closed) | — |
//! | 1 | that hand's rightmost x | that hand's height |
//! | 2 | the hand further right | the other hand's height |
//!
//! Only the right half of the frame is playable; pitch spans
//! `root_key ..= root_key + 12 · octave_range`.
//!
//! ## Modes
//!
//! * [`Mode::Glide`] — a sustained note (several unison voices) follows the
//!   smoothed pitch continuously while volume is above the threshold.
//! * [`Mode::Discrete`] — the playable region is split into one block per
//!   pool pitch; entering a block (or a trigger gesture) fires a short note,
//!   rate-limited by a cooldown.
//!
//! ## Example
//!
//! ```rust,no_run
//! use veloma_engine::{Engine, Hand, HandFrame, InstrumentConfig, NullBackend};
//!
//! let engine = Engine::new(InstrumentConfig::default(), Box::new(NullBackend::default())).unwrap();
//! engine.start();
//! engine.submit_frame(&HandFrame::one(Hand::new(0.8, 0.2)));
//! std::thread::sleep(std::time::Duration::from_millis(50));
//! println!("{:?}", engine.readout());
//! engine.stop();
//! ```

pub mod error;
pub mod config;
pub mod hand;
pub mod gesture;
pub mod smoother;
pub mod backend;
pub mod lifecycle;
pub mod engine;

pub use backend::{AudioBackend, BackendError, NullBackend, VoiceHandle};
pub use config::{InstrumentConfig, Mode, Tuning, PITCH_REGION_START};
pub use engine::{Engine, Readout};
pub use error::EngineError;
pub use gesture::{assign_roles, GestureMapper, HandRoles, Targets};
pub use hand::{Hand, HandFrame, HandHold};
pub use lifecycle::{NoteLifecycleController, TickInput};
pub use smoother::ParameterSmoother;

pub use veloma_music::{PitchPool, Scale, Voice};
