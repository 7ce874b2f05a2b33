//! Real-time MIDI output implementing [`AudioBackend`].
//!
//! Sustained notes need fractional pitch, which plain MIDI notes cannot
//! express.  Each sustained voice therefore gets a channel of its own and
//! rides its note with pitch bend:
//!
//! ```text
//! pitch 66.3 ─► note 66 on ch N ─► bend +0.3 semitone on ch N
//! ```
//!
//! When a glide drifts further than the bend range from the sounding note,
//! the note is retriggered on the same channel.  Momentary notes all share
//! channel 15 and are released by a short-lived timer thread.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use tracing::{info, warn};
use veloma_engine::{AudioBackend, BackendError, NullBackend, Voice, VoiceHandle};

// ════════════════════════════════════════════════════════════════════════════
// Constants
// ════════════════════════════════════════════════════════════════════════════

/// Semitones covered by a full pitch-bend swing in either direction.
pub const BEND_RANGE: f32 = 2.0;
const BEND_CENTER: u16 = 8192;
const BEND_MAX:    u16 = 16383;

const DRUM_CHANNEL:      u8 = 9;
const MOMENTARY_CHANNEL: u8 = 15;
/// Channels available to sustained voices: everything but drums and the
/// momentary channel.
const VOICE_CHANNELS: [u8; 14] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 10, 11, 12, 13, 14];

const CC_DATA_ENTRY:    u8 = 6;
const CC_EXPRESSION:    u8 = 11;
const CC_SUSTAIN:       u8 = 64;
const CC_RPN_LSB:       u8 = 100;
const CC_RPN_MSB:       u8 = 101;
const CC_ALL_NOTES_OFF: u8 = 123;

// ════════════════════════════════════════════════════════════════════════════
// Message encoding
// ════════════════════════════════════════════════════════════════════════════

fn note_on(channel: u8, note: u8, velocity: u8) -> [u8; 3] {
    [0x90 | (channel & 0x0F), note & 0x7F, velocity & 0x7F]
}

fn note_off(channel: u8, note: u8) -> [u8; 3] {
    [0x80 | (channel & 0x0F), note & 0x7F, 0]
}

fn control_change(channel: u8, controller: u8, value: u8) -> [u8; 3] {
    [0xB0 | (channel & 0x0F), controller & 0x7F, value & 0x7F]
}

fn program_change(channel: u8, program: u8) -> [u8; 2] {
    [0xC0 | (channel & 0x0F), program & 0x7F]
}

fn pitch_bend(channel: u8, value: u16) -> [u8; 3] {
    let v = value.min(BEND_MAX);
    [0xE0 | (channel & 0x0F), (v & 0x7F) as u8, (v >> 7) as u8]
}

/// Volume `0.0–1.0` as a 7-bit MIDI value.
fn level(volume: f32) -> u8 {
    (volume.clamp(0.0, 1.0) * 127.0).round() as u8
}

/// Note-on velocity; never 0, which would read as note-off.
fn velocity(volume: f32) -> u8 {
    level(volume).max(1)
}

/// Split a fractional pitch into the nearest MIDI note and the remainder.
fn split_pitch(pitch: f32) -> (u8, f32) {
    let note = pitch.round().clamp(0.0, 127.0);
    (note as u8, pitch - note)
}

/// 14-bit bend value for an offset in semitones, saturating at the range.
fn bend_value(offset: f32) -> u16 {
    let frac = (offset / BEND_RANGE).clamp(-1.0, 1.0);
    (BEND_CENTER as f32 + frac * BEND_CENTER as f32).round().clamp(0.0, BEND_MAX as f32) as u16
}

// ════════════════════════════════════════════════════════════════════════════
// MidiOut — raw byte sink
// ════════════════════════════════════════════════════════════════════════════

/// Anything that accepts raw MIDI messages.
pub trait MidiOut: Send {
    fn send(&mut self, msg: &[u8]) -> Result<(), BackendError>;
}

struct MidirOut {
    conn: midir::MidiOutputConnection,
}

impl MidiOut for MidirOut {
    fn send(&mut self, msg: &[u8]) -> Result<(), BackendError> {
        self.conn.send(msg).map_err(|e| BackendError::Send(e.to_string()))
    }
}

type SharedOut = Arc<Mutex<Box<dyn MidiOut>>>;

fn lock(out: &SharedOut) -> MutexGuard<'_, Box<dyn MidiOut>> {
    out.lock().unwrap_or_else(|e| e.into_inner())
}

// ════════════════════════════════════════════════════════════════════════════
// MidiBackend
// ════════════════════════════════════════════════════════════════════════════

#[derive(Clone, Copy, Debug)]
struct HeldNote {
    channel: u8,
    note:    u8,
}

/// [`AudioBackend`] speaking General MIDI to a [`MidiOut`].
pub struct MidiBackend {
    out:  SharedOut,
    free: VecDeque<u8>,
    held: HashMap<VoiceHandle, HeldNote>,
    next: u32,
}

impl MidiBackend {
    /// Wrap `out` and set the bend range on every voice channel.
    pub fn new(out: Box<dyn MidiOut>) -> Self {
        let backend = MidiBackend {
            out:  Arc::new(Mutex::new(out)),
            free: VOICE_CHANNELS.iter().copied().collect(),
            held: HashMap::new(),
            next: 0,
        };
        for &ch in &VOICE_CHANNELS {
            // RPN 0 (pitch-bend sensitivity) = BEND_RANGE semitones.
            let msgs = [
                control_change(ch, CC_RPN_MSB, 0),
                control_change(ch, CC_RPN_LSB, 0),
                control_change(ch, CC_DATA_ENTRY, BEND_RANGE as u8),
            ];
            if let Err(e) = backend.send_all(&msgs) {
                warn!("could not set bend range on channel {}: {}", ch, e);
            }
        }
        backend
    }

    fn send(&self, msg: &[u8]) -> Result<(), BackendError> {
        lock(&self.out).send(msg)
    }

    fn send_all(&self, msgs: &[[u8; 3]]) -> Result<(), BackendError> {
        let mut out = lock(&self.out);
        for m in msgs {
            out.send(m)?;
        }
        Ok(())
    }

    /// Voices currently holding a channel.
    pub fn held_voices(&self) -> usize { self.held.len() }
}

impl AudioBackend for MidiBackend {
    fn start_note(&mut self, pitch: f32, volume: f32) -> Result<VoiceHandle, BackendError> {
        let channel = self.free.pop_front().ok_or(BackendError::NoFreeVoice)?;
        let (note, offset) = split_pitch(pitch);

        let sent = self.send_all(&[
            pitch_bend(channel, bend_value(offset)),
            control_change(channel, CC_EXPRESSION, level(volume)),
            note_on(channel, note, velocity(volume)),
        ]);
        if let Err(e) = sent {
            self.free.push_back(channel);
            return Err(e);
        }

        self.next = self.next.wrapping_add(1);
        let handle = VoiceHandle(self.next);
        self.held.insert(handle, HeldNote { channel, note });
        Ok(handle)
    }

    fn update_note(&mut self, voice: VoiceHandle, pitch: f32, volume: f32) -> Result<(), BackendError> {
        let held = *self.held.get(&voice).ok_or(BackendError::UnknownVoice(voice))?;
        let ch = held.channel;

        let mut note = held.note;
        if (pitch - note as f32).abs() > BEND_RANGE {
            // Out of bend reach: move the sounding note.
            let (target, _) = split_pitch(pitch);
            self.send_all(&[note_off(ch, note), note_on(ch, target, velocity(volume))])?;
            note = target;
            self.held.insert(voice, HeldNote { channel: ch, note });
        }

        self.send_all(&[
            pitch_bend(ch, bend_value(pitch - note as f32)),
            control_change(ch, CC_EXPRESSION, level(volume)),
        ])
    }

    fn end_note(&mut self, voice: VoiceHandle) -> Result<(), BackendError> {
        let held = self.held.remove(&voice).ok_or(BackendError::UnknownVoice(voice))?;
        self.free.push_back(held.channel);
        self.send_all(&[note_off(held.channel, held.note), pitch_bend(held.channel, BEND_CENTER)])
    }

    fn play_momentary_note(&mut self, pitch: f32, volume: f32, duration: Duration) -> Result<(), BackendError> {
        let (note, _) = split_pitch(pitch);
        self.send(&note_on(MOMENTARY_CHANNEL, note, velocity(volume)))?;

        let out = Arc::clone(&self.out);
        thread::spawn(move || {
            thread::sleep(duration);
            if let Err(e) = lock(&out).send(&note_off(MOMENTARY_CHANNEL, note)) {
                warn!("momentary note-off {} failed: {}", note, e);
            }
        });
        Ok(())
    }

    fn set_sustain(&mut self, on: bool) -> Result<(), BackendError> {
        let value = if on { 127 } else { 0 };
        let msgs: Vec<[u8; 3]> = VOICE_CHANNELS.iter()
            .map(|&ch| control_change(ch, CC_SUSTAIN, value))
            .collect();
        self.send_all(&msgs)
    }

    fn set_voice(&mut self, voice: Voice) -> Result<(), BackendError> {
        let mut out = lock(&self.out);
        for ch in (0..16u8).filter(|&c| c != DRUM_CHANNEL) {
            out.send(&program_change(ch, voice.program()))?;
        }
        Ok(())
    }

    fn end_all_notes(&mut self) {
        {
            let mut out = lock(&self.out);
            for ch in 0..16u8 {
                let _ = out.send(&control_change(ch, CC_SUSTAIN, 0));
                let _ = out.send(&control_change(ch, CC_ALL_NOTES_OFF, 0));
                let _ = out.send(&pitch_bend(ch, BEND_CENTER));
            }
        }
        self.held.clear();
        self.free = VOICE_CHANNELS.iter().copied().collect();
    }
}

// ════════════════════════════════════════════════════════════════════════════
// open_midi_output — enumerate ports and pick one
// ════════════════════════════════════════════════════════════════════════════

/// True for port names that look like a General MIDI synthesiser.
fn looks_like_synth(name: &str) -> bool {
    let n = name.to_lowercase();
    n.contains("fluid") || n.contains("timidity") || n.contains("microsoft")
        || n.contains("gm") || n.contains("synth")
}

/// Open a MIDI output port and wrap it in a [`MidiBackend`].
///
/// With `port_hint` the first port whose name contains it is used;
/// otherwise a soft synth is preferred, then the first port.  Falls back to
/// [`NullBackend`] with a warning when nothing can be opened.
pub fn open_midi_output(port_hint: Option<&str>) -> Box<dyn AudioBackend> {
    let midi_out = match midir::MidiOutput::new("veloma") {
        Ok(m)  => m,
        Err(e) => {
            warn!("MIDI init error: {} — using null output", e);
            return Box::new(NullBackend::default());
        }
    };

    let ports = midi_out.ports();
    if ports.is_empty() {
        warn!("no MIDI output ports found — using null output");
        warn!("install a synthesiser such as `fluidsynth` or `timidity -iA` (Linux); \
               macOS and Windows ship one");
        return Box::new(NullBackend::default());
    }

    let names: Vec<String> = ports.iter()
        .map(|p| midi_out.port_name(p).unwrap_or_else(|_| "Unknown".to_string()))
        .collect();

    let port_idx = match port_hint {
        Some(hint) => match names.iter().position(|n| n.contains(hint)) {
            Some(i) => i,
            None => {
                warn!("no MIDI port matches {:?}; available: {:?}", hint, names);
                return Box::new(NullBackend::default());
            }
        },
        None => names.iter().position(|n| looks_like_synth(n)).unwrap_or(0),
    };

    info!("opening MIDI port: {}", names[port_idx]);
    match midi_out.connect(&ports[port_idx], "veloma-out") {
        Ok(conn) => Box::new(MidiBackend::new(Box::new(MidirOut { conn }))),
        Err(e) => {
            warn!("failed to connect: {} — using null output", e);
            Box::new(NullBackend::default())
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Tests
// ════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Default)]
    struct Wire {
        sent: Arc<Mutex<Vec<Vec<u8>>>>,
        fail: Arc<Mutex<bool>>,
    }

    impl MidiOut for Wire {
        fn send(&mut self, msg: &[u8]) -> Result<(), BackendError> {
            if *self.fail.lock().unwrap() {
                return Err(BackendError::Send("unplugged".into()));
            }
            self.sent.lock().unwrap().push(msg.to_vec());
            Ok(())
        }
    }

    impl Wire {
        fn take(&self) -> Vec<Vec<u8>> {
            std::mem::take(&mut *self.sent.lock().unwrap())
        }
    }

    fn backend() -> (MidiBackend, Wire) {
        let wire = Wire::default();
        let b = MidiBackend::new(Box::new(wire.clone()));
        wire.take();
        (b, wire)
    }

    #[test]
    fn encodes_bend() {
        assert_eq!(bend_value(0.0), 8192);
        assert_eq!(bend_value(BEND_RANGE), BEND_MAX);
        assert_eq!(bend_value(-BEND_RANGE), 0);
        assert_eq!(bend_value(1.0), 12288);
        assert_eq!(pitch_bend(3, 8192), [0xE3, 0x00, 0x40]);
    }

    #[test]
    fn splits_fractional_pitch() {
        assert_eq!(split_pitch(66.0), (66, 0.0));
        let (n, off) = split_pitch(66.3);
        assert_eq!(n, 66);
        assert!((off - 0.3).abs() < 1e-4);
        assert_eq!(split_pitch(66.7).0, 67);
    }

    #[test]
    fn new_sets_bend_range() {
        let wire = Wire::default();
        let _b = MidiBackend::new(Box::new(wire.clone()));
        let sent = wire.take();
        assert_eq!(sent.len(), VOICE_CHANNELS.len() * 3);
        assert!(sent.contains(&vec![0xB0, CC_DATA_ENTRY, 2]));
    }

    #[test]
    fn start_uses_own_channel_with_bend() {
        let (mut b, wire) = backend();
        let v1 = b.start_note(66.5, 1.0).unwrap();
        let v2 = b.start_note(66.5, 1.0).unwrap();
        assert_ne!(v1, v2);
        let sent = wire.take();
        // bend, expression, note-on per voice
        assert_eq!(sent.len(), 6);
        assert_eq!(sent[2], vec![0x90, 67, 127]);
        assert_eq!(sent[5], vec![0x91, 67, 127]);
        assert_eq!(sent[0], pitch_bend(0, bend_value(-0.5)).to_vec());
    }

    #[test]
    fn small_update_only_bends() {
        let (mut b, wire) = backend();
        let v = b.start_note(60.0, 0.5).unwrap();
        wire.take();
        b.update_note(v, 61.5, 0.5).unwrap();
        let sent = wire.take();
        assert_eq!(sent, vec![pitch_bend(0, bend_value(1.5)).to_vec(), vec![0xB0, CC_EXPRESSION, 64]]);
    }

    #[test]
    fn large_update_retriggers() {
        let (mut b, wire) = backend();
        let v = b.start_note(60.0, 1.0).unwrap();
        wire.take();
        b.update_note(v, 65.2, 1.0).unwrap();
        let sent = wire.take();
        assert_eq!(sent[0], vec![0x80, 60, 0]);
        assert_eq!(sent[1], vec![0x90, 65, 127]);
        // Ending releases the retriggered note, not the original.
        b.end_note(v).unwrap();
        assert_eq!(wire.take()[0], vec![0x80, 65, 0]);
    }

    #[test]
    fn channels_run_out_and_come_back() {
        let (mut b, _wire) = backend();
        let voices: Vec<_> = (0..VOICE_CHANNELS.len()).map(|_| b.start_note(60.0, 1.0).unwrap()).collect();
        assert_eq!(b.start_note(60.0, 1.0), Err(BackendError::NoFreeVoice));
        b.end_note(voices[0]).unwrap();
        assert!(b.start_note(60.0, 1.0).is_ok());
    }

    #[test]
    fn unknown_voice_is_an_error() {
        let (mut b, _wire) = backend();
        let v = b.start_note(60.0, 1.0).unwrap();
        b.end_note(v).unwrap();
        assert_eq!(b.end_note(v), Err(BackendError::UnknownVoice(v)));
        assert_eq!(b.update_note(v, 60.0, 1.0), Err(BackendError::UnknownVoice(v)));
    }

    #[test]
    fn failed_start_returns_channel() {
        let (mut b, wire) = backend();
        *wire.fail.lock().unwrap() = true;
        assert!(b.start_note(60.0, 1.0).is_err());
        *wire.fail.lock().unwrap() = false;
        for _ in 0..VOICE_CHANNELS.len() {
            b.start_note(60.0, 1.0).unwrap();
        }
    }

    #[test]
    fn program_change_skips_drums() {
        let (mut b, wire) = backend();
        b.set_voice(Voice::Flute).unwrap();
        let sent = wire.take();
        assert_eq!(sent.len(), 15);
        assert!(sent.iter().all(|m| m[1] == 73));
        assert!(!sent.contains(&vec![0xC0 | DRUM_CHANNEL, 73]));
    }

    #[test]
    fn sustain_is_cc64() {
        let (mut b, wire) = backend();
        b.set_sustain(true).unwrap();
        assert!(wire.take().iter().all(|m| m[0] & 0xF0 == 0xB0 && m[1] == 64 && m[2] == 127));
    }

    #[test]
    fn momentary_note_releases_itself() {
        let (mut b, wire) = backend();
        b.play_momentary_note(72.0, 0.5, Duration::from_millis(10)).unwrap();
        assert_eq!(wire.sent.lock().unwrap()[0], vec![0x9F, 72, 64]);
        thread::sleep(Duration::from_millis(200));
        assert_eq!(wire.take().last(), Some(&vec![0x8F, 72, 0]));
    }

    #[test]
    fn end_all_resets_everything() {
        let (mut b, wire) = backend();
        b.start_note(60.0, 1.0).unwrap();
        b.end_all_notes();
        assert_eq!(b.held_voices(), 0);
        assert!(wire.take().contains(&vec![0xB0, CC_ALL_NOTES_OFF, 0]));
        for _ in 0..VOICE_CHANNELS.len() {
            b.start_note(60.0, 1.0).unwrap();
        }
    }

    #[test]
    fn synth_port_names() {
        assert!(looks_like_synth("FLUID Synth (1234)"));
        assert!(looks_like_synth("TiMidity port 0"));
        assert!(!looks_like_synth("Midi Through Port-0"));
    }
}
