//! Top-level application state.
//!
//! `AppState` owns the [`Engine`] and the dropout [`HandHold`].  It feeds
//! hand frames to the engine, turns key commands into configuration
//! changes, and builds the status line the visualizer shows.

use std::path::Path;
use std::sync::mpsc::TryRecvError;
use std::time::Instant;

use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use veloma_engine::{Engine, EngineError, HandFrame, HandHold, InstrumentConfig, Mode, Voice};
use veloma_music::note_name;

use crate::hand_source::spawn_hand_source;
use crate::midi::open_midi_output;
use crate::visualizer::{Scene, Visualizer};

/// Root key and octave bounds offered by the keyboard controls.
const ROOT_MIN:    i32 = 20;
const ROOT_MAX:    i32 = 80;
const OCTAVES_MAX: u32 = 5;
const SMOOTHING_STEP: f32 = 0.05;

// ════════════════════════════════════════════════════════════════════════════
// AppConfig
// ════════════════════════════════════════════════════════════════════════════

/// Configuration for the full application, loadable from TOML.
///
/// ```toml
/// midi_port = "FLUID"
///
/// [instrument]
/// scale = "dorian"
/// mode  = "glide"
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub instrument:           InstrumentConfig,
    /// Substring of the MIDI output port to open; a soft synth is preferred
    /// when unset.
    pub midi_port:            Option<String>,
    /// How long to keep the last hands after the tracker loses them.
    pub hold_seconds:         f64,
    /// Draw Discrete-mode block boundaries.
    pub show_note_boundaries: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            instrument:           InstrumentConfig::default(),
            midi_port:            None,
            hold_seconds:         HandHold::DEFAULT_SECONDS,
            show_note_boundaries: true,
        }
    }
}

impl AppConfig {
    /// Read a TOML config file.  Missing keys take their defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let cfg: AppConfig = toml::from_str(&text)
            .with_context(|| format!("parsing {}", path.display()))?;
        cfg.instrument.validate()
            .with_context(|| format!("invalid instrument in {}", path.display()))?;
        Ok(cfg)
    }
}

// ════════════════════════════════════════════════════════════════════════════
// AppCommand
// ════════════════════════════════════════════════════════════════════════════

/// A user request from the keyboard.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AppCommand {
    ToggleMode,
    NextScale,
    NextVoice,
    OctaveUp,
    OctaveDown,
    RootUp,
    RootDown,
    SmoothingUp,
    SmoothingDown,
    ToggleBoundaries,
    Quit,
}

// ════════════════════════════════════════════════════════════════════════════
// AppState
// ════════════════════════════════════════════════════════════════════════════

pub struct AppState {
    engine: Engine,
    hold:   HandHold,

    /// What the engine was last given, for drawing.
    last_frame: HandFrame,

    /// The voice the player picked.  Glide mode plays [`Voice::GLIDE`]
    /// instead and restores this on the way out.
    chosen_voice: Voice,

    show_boundaries: bool,

    pub status: String,
}

impl AppState {
    pub fn new(engine: Engine, cfg: &AppConfig) -> Self {
        let chosen_voice = cfg.instrument.voice;
        let mut app = AppState {
            engine,
            hold:            HandHold::new(cfg.hold_seconds),
            last_frame:      HandFrame::empty(),
            chosen_voice,
            show_boundaries: cfg.show_note_boundaries,
            status:          String::new(),
        };
        if cfg.instrument.mode == Mode::Glide {
            app.apply("voice", |e| e.set_instrument_voice(Voice::GLIDE));
        }
        app.status = app.describe();
        app
    }

    // ── Input ─────────────────────────────────────────────────────────────

    /// Pass a tracker frame through the dropout hold and on to the engine.
    pub fn handle_frame(&mut self, frame: HandFrame, now: f64) {
        let frame = self.hold.filter(frame, now);
        self.engine.submit_frame(&frame);
        self.last_frame = frame;
    }

    /// Apply a key command.  Returns false on quit.
    pub fn handle_command(&mut self, cmd: AppCommand) -> bool {
        let tuning = self.engine.tuning();
        let cfg = &tuning.config;

        match cmd {
            AppCommand::Quit => return false,

            AppCommand::ToggleMode => {
                let mode = cfg.mode.toggled();
                self.apply("mode", |e| e.set_mode(mode));
                // Glide gets its own voice; Discrete gets the player's back.
                let voice = if mode == Mode::Glide { Voice::GLIDE } else { self.chosen_voice };
                self.apply("voice", |e| e.set_instrument_voice(voice));
            }

            AppCommand::NextScale => {
                let scale = cfg.scale.next();
                self.apply("scale", |e| e.set_scale(scale));
            }

            AppCommand::NextVoice => {
                self.chosen_voice = self.chosen_voice.next();
                if cfg.mode == Mode::Discrete {
                    let voice = self.chosen_voice;
                    self.apply("voice", |e| e.set_instrument_voice(voice));
                }
            }

            AppCommand::OctaveUp if cfg.octave_range < OCTAVES_MAX => {
                let (root, oct) = (cfg.root_key, cfg.octave_range + 1);
                self.apply("octaves", |e| e.set_pitch_range(root, oct));
            }
            AppCommand::OctaveDown if cfg.octave_range > 1 => {
                let (root, oct) = (cfg.root_key, cfg.octave_range - 1);
                self.apply("octaves", |e| e.set_pitch_range(root, oct));
            }
            AppCommand::RootUp if cfg.root_key < ROOT_MAX => {
                let (root, oct) = (cfg.root_key + 1, cfg.octave_range);
                self.apply("root", |e| e.set_pitch_range(root, oct));
            }
            AppCommand::RootDown if cfg.root_key > ROOT_MIN => {
                let (root, oct) = (cfg.root_key - 1, cfg.octave_range);
                self.apply("root", |e| e.set_pitch_range(root, oct));
            }
            AppCommand::OctaveUp | AppCommand::OctaveDown
            | AppCommand::RootUp | AppCommand::RootDown => {
                self.status = "at the end of the range".to_string();
                return true;
            }

            AppCommand::SmoothingUp | AppCommand::SmoothingDown => {
                let step = if cmd == AppCommand::SmoothingUp { SMOOTHING_STEP } else { -SMOOTHING_STEP };
                let factor = (cfg.smoothing_factor + step).clamp(SMOOTHING_STEP, 1.0);
                self.apply("smoothing", |e| e.set_smoothing(factor));
            }

            AppCommand::ToggleBoundaries => {
                self.show_boundaries = !self.show_boundaries;
            }
        }

        self.status = self.describe();
        true
    }

    /// Run one engine call; failures are reported on the status line.
    fn apply(&mut self, what: &str, f: impl FnOnce(&Engine) -> Result<(), EngineError>) {
        if let Err(e) = f(&self.engine) {
            warn!("{} change rejected: {}", what, e);
            self.status = format!("{} rejected: {}", what, e);
        }
    }

    fn describe(&self) -> String {
        let t = self.engine.tuning();
        let c = &t.config;
        let voice = if c.mode == Mode::Glide {
            format!("{} (then {})", c.voice, self.chosen_voice)
        } else {
            c.voice.to_string()
        };
        format!(
            "{}  {} from {} over {} oct  voice {}  smoothing {:.2}",
            c.mode.name(), c.scale, note_name(c.root_key), c.octave_range, voice, c.smoothing_factor,
        )
    }

    // ── Accessors for the render loop ─────────────────────────────────────

    pub fn engine(&self)          -> &Engine    { &self.engine }
    pub fn last_frame(&self)      -> &HandFrame { &self.last_frame }
    pub fn chosen_voice(&self)    -> Voice      { self.chosen_voice }
    pub fn show_boundaries(&self) -> bool       { self.show_boundaries }

    /// Status line plus the live readout.
    pub fn status_line(&self) -> String {
        let r = self.engine.readout();
        let note = match r.last_note {
            Some(p) => note_name(p),
            None    => "-".to_string(),
        };
        format!(
            "{}  |  pitch {:.2}  vol {:.2}  hands {}  note {}",
            self.status, r.current_pitch, r.current_volume,
            if r.hands_detected { "yes" } else { "no" }, note,
        )
    }
}

// ════════════════════════════════════════════════════════════════════════════
// run() — the main application loop
// ════════════════════════════════════════════════════════════════════════════

/// Run the full application.
///
/// Opens the MIDI output, starts the engine, creates the visualizer and the
/// hand source (simulation by default, hardware with `--features leap`),
/// and drives the input/render loop at ~60 fps until the window closes.
pub fn run(cfg: AppConfig) -> anyhow::Result<()> {
    let backend = open_midi_output(cfg.midi_port.as_deref());
    let engine = Engine::new(cfg.instrument.clone(), backend)?;
    engine.start();

    // ── Hand source + visualizer ──────────────────────────────────────────
    #[cfg(not(feature = "leap"))]
    let (frames, mut vis) = {
        use crate::hand_source::SimHandSource;
        let (sim_tx, sim_rx) = std::sync::mpsc::channel();
        let frames = spawn_hand_source(SimHandSource { rx: sim_rx });
        (frames, Visualizer::new(Some(sim_tx)).map_err(|e| anyhow!(e))?)
    };
    #[cfg(feature = "leap")]
    let (frames, mut vis) = {
        use crate::hand_source::LeapHandSource;
        (spawn_hand_source(LeapHandSource), Visualizer::new(None).map_err(|e| anyhow!(e))?)
    };

    let mut app = AppState::new(engine, &cfg);
    info!("{}", app.status);
    let epoch = Instant::now();

    // ── Main loop ─────────────────────────────────────────────────────────
    'outer: while vis.is_open() {
        // 1. Keyboard commands
        for cmd in vis.poll_input() {
            if !app.handle_command(cmd) { break 'outer; }
        }

        // 2. Newest hand frame wins
        let mut latest = None;
        loop {
            match frames.try_recv() {
                Ok(f) => latest = Some(f),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    warn!("hand source stopped");
                    break 'outer;
                }
            }
        }
        if let Some(frame) = latest {
            app.handle_frame(frame, epoch.elapsed().as_secs_f64());
        }

        // 3. Render
        let tuning = app.engine().tuning();
        let status = app.status_line();
        vis.render(&Scene {
            tuning:          &tuning,
            readout:         app.engine().readout(),
            frame:           app.last_frame(),
            status:          &status,
            show_boundaries: app.show_boundaries(),
        });
    }

    app.engine().stop();
    Ok(())
}

// ════════════════════════════════════════════════════════════════════════════
// Tests
// ════════════════════════════════════════════════════════════════════════════
