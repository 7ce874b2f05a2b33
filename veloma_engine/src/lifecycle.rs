//! Note lifecycle — decides when to start, update, end, or fire notes.
//!
//! # Glide
//!
//! Level-triggered with two states.  The gate is
//! `hands_detected && volume > volume_threshold`.
//!
//! ```text
//!            gate opens: sustain on, start_note × unison
//!   Silent ────────────────────────────────────────────► Sounding ──┐
//!     ▲                                                      │      │ gate holds:
//!     └──────────────────────────────────────────────────────┘ ◄────┘ update_note × unison
//!       gate closes / update fails / shutdown: end_note × unison, sustain off
//! ```
//!
//! # Discrete
//!
//! Edge-triggered.  While the gate is open and the pitch hand is inside the
//! playable region, a momentary note fires when the block index changes, on
//! the first block after silence, or on a rising trigger edge — and only if
//! the cooldown since the previous note has elapsed.  The cooldown applies
//! to trigger edges too.

use std::time::Duration;

use tracing::{debug, warn};
use veloma_music::quantize;

use crate::backend::{AudioBackend, VoiceHandle};
use crate::config::{Mode, Tuning};

// ════════════════════════════════════════════════════════════════════════════
// TickInput
// ════════════════════════════════════════════════════════════════════════════

/// Smoothed values and target-side flags for one tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TickInput {
    pub pitch:          f32,
    pub volume:         f32,
    pub hands_detected: bool,
    pub trigger:        bool,
    pub pitch_source:   Option<f32>,
}

// ════════════════════════════════════════════════════════════════════════════
// Internal state
// ════════════════════════════════════════════════════════════════════════════

#[derive(Clone, Debug, PartialEq)]
enum GlideState {
    Silent,
    Sounding { voices: Vec<VoiceHandle> },
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct DiscreteBook {
    last_note_index: Option<usize>,
    last_fire_time:  Option<f64>,
    last_trigger:    bool,
}

// ════════════════════════════════════════════════════════════════════════════
// NoteLifecycleController
// ════════════════════════════════════════════════════════════════════════════

#[derive(Clone, Debug)]
pub struct NoteLifecycleController {
    mode:  Mode,
    glide: GlideState,
    book:  DiscreteBook,
}

impl NoteLifecycleController {
    pub fn new(mode: Mode) -> Self {
        NoteLifecycleController { mode, glide: GlideState::Silent, book: DiscreteBook::default() }
    }

    pub fn mode(&self) -> Mode { self.mode }

    /// True while a Glide note is held.
    pub fn is_sounding(&self) -> bool {
        matches!(self.glide, GlideState::Sounding { .. })
    }

    /// Voices currently held by the Glide note.
    pub fn voices(&self) -> &[VoiceHandle] {
        match &self.glide {
            GlideState::Sounding { voices } => voices,
            GlideState::Silent => &[],
        }
    }

    /// Pool index of the last Discrete note, if the hand is still on it.
    pub fn last_note_index(&self) -> Option<usize> { self.book.last_note_index }

    /// Run one control tick.  `now` is in seconds on any monotonic clock.
    pub fn tick(&mut self, input: &TickInput, tuning: &Tuning, backend: &mut dyn AudioBackend, now: f64) {
        let gate = input.hands_detected && input.volume > tuning.config.volume_threshold;
        match self.mode {
            Mode::Glide    => self.tick_glide(gate, input, tuning, backend),
            Mode::Discrete => self.tick_discrete(gate, input, tuning, backend, now),
        }
    }

    /// Silence Glide voices and forget Discrete history, then enter `mode`.
    pub fn switch_mode(&mut self, mode: Mode, backend: &mut dyn AudioBackend) {
        self.force_silence(backend);
        self.book = DiscreteBook::default();
        self.mode = mode;
    }

    /// Forget Discrete history; used when the pitch pool is replaced.
    pub fn reset_discrete(&mut self) {
        self.book = DiscreteBook::default();
    }

    /// Drive Glide to Silent whatever the gate says.
    ///
    /// Every held voice gets an `end_note`; if any of them fail the backend
    /// is additionally asked to end everything.  Local state is cleared
    /// either way.
    pub fn force_silence(&mut self, backend: &mut dyn AudioBackend) {
        let voices = match std::mem::replace(&mut self.glide, GlideState::Silent) {
            GlideState::Sounding { voices } => voices,
            GlideState::Silent => return,
        };

        let mut failed = false;
        for v in voices {
            if let Err(e) = backend.end_note(v) {
                warn!("end_note({}) failed: {}", v.0, e);
                failed = true;
            }
        }
        if failed {
            backend.end_all_notes();
        }
        if let Err(e) = backend.set_sustain(false) {
            warn!("sustain off failed: {}", e);
        }
        debug!("glide note stopped");
    }

    // ── Glide ─────────────────────────────────────────────────────────────

    fn tick_glide(&mut self, gate: bool, input: &TickInput, tuning: &Tuning, backend: &mut dyn AudioBackend) {
        match (self.is_sounding(), gate) {
            (false, true)  => self.start_glide(input, tuning, backend),
            (true,  true)  => self.update_glide(input, backend),
            (true,  false) => self.force_silence(backend),
            (false, false) => {}
        }
    }

    fn start_glide(&mut self, input: &TickInput, tuning: &Tuning, backend: &mut dyn AudioBackend) {
        if let Err(e) = backend.set_sustain(true) {
            warn!("sustain on failed: {}", e);
        }

        let count = tuning.config.unison_voice_count;
        let mut voices = Vec::with_capacity(count);
        for _ in 0..count {
            match backend.start_note(input.pitch, input.volume) {
                Ok(v) => voices.push(v),
                Err(e) => {
                    warn!("start_note failed after {} of {} voices: {}", voices.len(), count, e);
                    // Hand what did start to force_silence so nothing is orphaned.
                    self.glide = GlideState::Sounding { voices };
                    self.force_silence(backend);
                    return;
                }
            }
        }

        debug!("glide note started: pitch={:.2} volume={:.2} voices={}", input.pitch, input.volume, count);
        self.glide = GlideState::Sounding { voices };
    }

    fn update_glide(&mut self, input: &TickInput, backend: &mut dyn AudioBackend) {
        let failure = self.voices().iter().find_map(|&v| {
            backend.update_note(v, input.pitch, input.volume).err().map(|e| (v, e))
        });
        if let Some((v, e)) = failure {
            warn!("update_note({}) failed, stopping: {}", v.0, e);
            self.force_silence(backend);
        }
    }

    // ── Discrete ──────────────────────────────────────────────────────────

    fn tick_discrete(
        &mut self,
        gate:    bool,
        input:   &TickInput,
        tuning:  &Tuning,
        backend: &mut dyn AudioBackend,
        now:     f64,
    ) {
        let (start, end) = tuning.pitch_region();
        let index = if gate {
            input.pitch_source.and_then(|x| quantize(x, start, end, tuning.pool.len()))
        } else {
            None
        };

        let index = match index {
            Some(i) => i,
            None => {
                self.book.last_note_index = None;
                self.book.last_trigger = false;
                return;
            }
        };

        let rising  = input.trigger && !self.book.last_trigger;
        let changed = self.book.last_note_index != Some(index);
        let cooled  = self.book.last_fire_time
            .map_or(true, |t| now - t > tuning.config.note_cooldown_seconds);

        if (changed || rising) && cooled {
            if let Some(pitch) = tuning.pool.get(index) {
                let duration = Duration::from_secs_f32(tuning.config.momentary_note_seconds);
                match backend.play_momentary_note(pitch as f32, input.volume, duration) {
                    Ok(()) => debug!("note {} (block {}) vol={:.2}", pitch, index, input.volume),
                    Err(e) => warn!("play_momentary_note({}) failed: {}", pitch, e),
                }
                self.book.last_note_index = Some(index);
                self.book.last_fire_time  = Some(now);
            }
        }
        self.book.last_trigger = input.trigger;
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Tests
// ════════════════════════════════════════════════════════════════════════════
