//! The audio backend seam.
//!
//! The engine only ever talks to an [`AudioBackend`]; the application
//! decides whether that is a MIDI port, a synth, or [`NullBackend`].
//! Every call is fire-and-forget: implementations must not block the
//! control loop.

use std::fmt;
use std::time::Duration;

use veloma_music::Voice;

// ════════════════════════════════════════════════════════════════════════════
// VoiceHandle / BackendError
// ════════════════════════════════════════════════════════════════════════════

/// Identifies one sounding note started with [`AudioBackend::start_note`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VoiceHandle(pub u32);

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BackendError {
    /// No voice slot is free for another sustained note.
    NoFreeVoice,
    /// The handle was never issued or has already ended.
    UnknownVoice(VoiceHandle),
    /// The underlying output rejected the message.
    Send(String),
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::NoFreeVoice      => write!(f, "no free voice"),
            BackendError::UnknownVoice(h)  => write!(f, "unknown voice {}", h.0),
            BackendError::Send(msg)        => write!(f, "send failed: {}", msg),
        }
    }
}

impl std::error::Error for BackendError {}

// ════════════════════════════════════════════════════════════════════════════
// AudioBackend
// ════════════════════════════════════════════════════════════════════════════

/// Note commands consumed by a synthesiser.
///
/// Pitch is in MIDI note units and may be fractional; volume is `0.0–1.0`.
pub trait AudioBackend: Send {
    /// Begin a sustained note and return its handle.
    fn start_note(&mut self, pitch: f32, volume: f32) -> Result<VoiceHandle, BackendError>;

    /// Retune / re-level a sustained note.
    fn update_note(&mut self, voice: VoiceHandle, pitch: f32, volume: f32) -> Result<(), BackendError>;

    /// Release a sustained note.
    fn end_note(&mut self, voice: VoiceHandle) -> Result<(), BackendError>;

    /// Fire a note that ends by itself after `duration`.  Must not block.
    fn play_momentary_note(&mut self, pitch: f32, volume: f32, duration: Duration) -> Result<(), BackendError>;

    /// Sustain pedal on/off.
    fn set_sustain(&mut self, on: bool) -> Result<(), BackendError>;

    /// Change instrument.
    fn set_voice(&mut self, voice: Voice) -> Result<(), BackendError>;

    /// Silence everything, whatever the engine believes is sounding.
    fn end_all_notes(&mut self);
}

// ════════════════════════════════════════════════════════════════════════════
// NullBackend — used when no output is available
// ════════════════════════════════════════════════════════════════════════════

/// Accepts every command and produces no sound.
#[derive(Debug, Default)]
pub struct NullBackend {
    next: u32,
}

impl AudioBackend for NullBackend {
    fn start_note(&mut self, _pitch: f32, _volume: f32) -> Result<VoiceHandle, BackendError> {
        self.next = self.next.wrapping_add(1);
        Ok(VoiceHandle(self.next))
    }
    fn update_note(&mut self, _v: VoiceHandle, _p: f32, _vol: f32) -> Result<(), BackendError> { Ok(()) }
    fn end_note(&mut self, _v: VoiceHandle) -> Result<(), BackendError> { Ok(()) }
    fn play_momentary_note(&mut self, _p: f32, _v: f32, _d: Duration) -> Result<(), BackendError> { Ok(()) }
    fn set_sustain(&mut self, _on: bool) -> Result<(), BackendError> { Ok(()) }
    fn set_voice(&mut self, _voice: Voice) -> Result<(), BackendError> { Ok(()) }
    fn end_all_notes(&mut self) {}
}

// ════════════════════════════════════════════════════════════════════════════
// Recording backend (tests)
// ════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
pub(crate) mod recording {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Debug, PartialEq)]
    pub enum Command {
        Start { pitch: f32, volume: f32 },
        Update { voice: VoiceHandle, pitch: f32, volume: f32 },
        End(VoiceHandle),
        Momentary { pitch: f32, volume: f32, duration: Duration },
        Sustain(bool),
        Voice(Voice),
        EndAll,
    }

    #[derive(Debug, Default)]
    pub struct Script {
        pub fail_updates: bool,
        pub fail_ends:    bool,
        /// Start calls after this many succeed fail.
        pub start_limit:  Option<usize>,
    }

    /// Logs every command into a shared list the test keeps a handle to.
    #[derive(Clone, Default)]
    pub struct RecordingBackend {
        pub log:    Arc<Mutex<Vec<Command>>>,
        pub script: Arc<Mutex<Script>>,
        next:       u32,
        started:    usize,
    }

    impl RecordingBackend {
        pub fn commands(&self) -> Vec<Command> {
            self.log.lock().unwrap().clone()
        }

        pub fn clear(&self) {
            self.log.lock().unwrap().clear();
        }

        pub fn count(&self, pred: impl Fn(&Command) -> bool) -> usize {
            self.log.lock().unwrap().iter().filter(|c| pred(c)).count()
        }

        fn push(&self, c: Command) {
            self.log.lock().unwrap().push(c);
        }
    }

    impl AudioBackend for RecordingBackend {
        fn start_note(&mut self, pitch: f32, volume: f32) -> Result<VoiceHandle, BackendError> {
            if let Some(limit) = self.script.lock().unwrap().start_limit {
                if self.started >= limit {
                    return Err(BackendError::NoFreeVoice);
                }
            }
            self.started += 1;
            self.next += 1;
            self.push(Command::Start { pitch, volume });
            Ok(VoiceHandle(self.next))
        }

        fn update_note(&mut self, voice: VoiceHandle, pitch: f32, volume: f32) -> Result<(), BackendError> {
            self.push(Command::Update { voice, pitch, volume });
            if self.script.lock().unwrap().fail_updates {
                return Err(BackendError::Send("update rejected".into()));
            }
            Ok(())
        }

        fn end_note(&mut self, voice: VoiceHandle) -> Result<(), BackendError> {
            self.push(Command::End(voice));
            self.started = self.started.saturating_sub(1);
            if self.script.lock().unwrap().fail_ends {
                return Err(BackendError::Send("end rejected".into()));
            }
            Ok(())
        }

        fn play_momentary_note(&mut self, pitch: f32, volume: f32, duration: Duration) -> Result<(), BackendError> {
            self.push(Command::Momentary { pitch, volume, duration });
            Ok(())
        }

        fn set_sustain(&mut self, on: bool) -> Result<(), BackendError> {
            self.push(Command::Sustain(on));
            Ok(())
        }

        fn set_voice(&mut self, voice: Voice) -> Result<(), BackendError> {
            self.push(Command::Voice(voice));
            Ok(())
        }

        fn end_all_notes(&mut self) {
            self.started = 0;
            self.push(Command::EndAll);
        }
    }
}
