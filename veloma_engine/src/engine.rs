//! The engine: shared control state, the control-loop thread, and the
//! public configuration API.
//!
//! Three kinds of caller touch an [`Engine`] concurrently:
//!
//! * the hand-tracking thread calls [`Engine::submit_frame`], which folds
//!   the frame into the target mailbox (last write wins);
//! * the control loop ticks at `tick_hz`, smoothing targets and driving the
//!   backend;
//! * the UI calls the `set_*` methods, each of which builds a new
//!   [`Tuning`] and publishes it with one pointer swap.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use tracing::{debug, info, warn};
use veloma_music::{Scale, Voice};

use crate::backend::AudioBackend;
use crate::config::{InstrumentConfig, Mode, Tuning};
use crate::error::EngineError;
use crate::gesture::{GestureMapper, Targets};
use crate::hand::HandFrame;
use crate::lifecycle::{NoteLifecycleController, TickInput};
use crate::smoother::ParameterSmoother;

/// How long `stop()` waits for the control loop before silencing anyway.
const STOP_TIMEOUT: Duration = Duration::from_secs(1);

// ════════════════════════════════════════════════════════════════════════════
// Readout
// ════════════════════════════════════════════════════════════════════════════

/// What the UI shows: the smoothed values of the most recent tick.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Readout {
    pub current_pitch:  f32,
    pub current_volume: f32,
    pub hands_detected: bool,
    /// A Glide note is held.
    pub sounding:       bool,
    /// Pitch of the Discrete block the hand is resting on.
    pub last_note:      Option<i32>,
}

// ════════════════════════════════════════════════════════════════════════════
// Shared state
// ════════════════════════════════════════════════════════════════════════════

/// Tick-side state; only the control loop and `stop()` touch it.
struct Core {
    smoother:  ParameterSmoother,
    lifecycle: NoteLifecycleController,
    backend:   Box<dyn AudioBackend>,
    /// The tuning the lifecycle was last reconciled against.
    tuning:    Arc<Tuning>,
}

struct Shared {
    running:     AtomicBool,
    tuning:      ArcSwap<Tuning>,
    /// Serialises configuration writers.
    config_lock: Mutex<()>,
    targets:     Mutex<Targets>,
    readout:     Mutex<Readout>,
    core:        Mutex<Core>,
    epoch:       Instant,
}

/// Poisoning only means another thread panicked mid-tick; the state itself
/// is still usable.
fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl Shared {
    fn now(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    fn tick(&self, now: f64) {
        let mut guard = lock(&self.core);
        let core = &mut *guard;
        // Read under the core lock so a tick never reconciles a tuning
        // older than the last one reconciled.
        let tuning  = self.tuning.load_full();
        let targets = *lock(&self.targets);
        core.reconcile(&tuning);

        let (pitch, volume) = core.smoother.step(targets.pitch, targets.volume);
        let input = TickInput {
            pitch,
            volume,
            hands_detected: targets.hands_detected,
            trigger:        targets.trigger,
            pitch_source:   targets.pitch_source,
        };
        core.lifecycle.tick(&input, &tuning, core.backend.as_mut(), now);

        let readout = Readout {
            current_pitch:  pitch,
            current_volume: volume,
            hands_detected: targets.hands_detected,
            sounding:       core.lifecycle.is_sounding(),
            last_note:      core.lifecycle.last_note_index().and_then(|i| tuning.pool.get(i)),
        };
        drop(guard);
        *lock(&self.readout) = readout;
    }

    fn silence(&self) {
        Self::silence_core(&mut lock(&self.core));
        lock(&self.readout).sounding = false;
    }

    /// Silence without waiting.  False when a tick holds the core.
    fn try_silence(&self) -> bool {
        let mut guard = match self.core.try_lock() {
            Ok(g) => g,
            Err(TryLockError::Poisoned(e)) => e.into_inner(),
            Err(TryLockError::WouldBlock) => return false,
        };
        Self::silence_core(&mut guard);
        drop(guard);
        lock(&self.readout).sounding = false;
        true
    }

    fn silence_core(core: &mut Core) {
        core.lifecycle.force_silence(core.backend.as_mut());
        core.backend.end_all_notes();
    }
}

impl Core {
    /// Bring lifecycle, smoother, and backend in line with `tuning`.
    fn reconcile(&mut self, tuning: &Arc<Tuning>) {
        if Arc::ptr_eq(&self.tuning, tuning) {
            return;
        }
        let old = std::mem::replace(&mut self.tuning, Arc::clone(tuning));
        let (was, now) = (&old.config, &tuning.config);

        if now.mode != self.lifecycle.mode() {
            self.lifecycle.switch_mode(now.mode, self.backend.as_mut());
        } else if old.pool_differs(tuning) {
            self.lifecycle.reset_discrete();
        }
        if now.unison_voice_count != was.unison_voice_count && self.lifecycle.is_sounding() {
            // Restarted next tick with the new voice count.
            self.lifecycle.force_silence(self.backend.as_mut());
        }
        if now.voice != was.voice {
            if let Err(e) = self.backend.set_voice(now.voice) {
                warn!("set_voice({}) failed: {}", now.voice, e);
            }
        }
        if now.smoothing_factor != was.smoothing_factor {
            self.smoother.set_factor(now.smoothing_factor);
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Engine
// ════════════════════════════════════════════════════════════════════════════

struct Worker {
    handle:  JoinHandle<()>,
    done_rx: Receiver<()>,
    /// Per-loop run flag, so a stalled loop from an earlier `start` exits
    /// even after the engine is started again.
    alive:   Arc<AtomicBool>,
}

/// Handle to a running (or stopped) instrument.  Cheap to share by
/// reference across threads.
pub struct Engine {
    shared: Arc<Shared>,
    worker: Mutex<Option<Worker>>,
    /// Waits out a loop that missed the stop timeout, then silences.
    reaper: Mutex<Option<JoinHandle<()>>>,
}

impl Engine {
    /// Validate `config`, select its voice on `backend`, and build an
    /// engine that is not yet ticking.
    pub fn new(config: InstrumentConfig, mut backend: Box<dyn AudioBackend>) -> Result<Self, EngineError> {
        let tuning = Arc::new(Tuning::new(config)?);
        let cfg = &tuning.config;

        if let Err(e) = backend.set_voice(cfg.voice) {
            warn!("set_voice({}) failed: {}", cfg.voice, e);
        }

        let core = Core {
            smoother:  ParameterSmoother::new(cfg.smoothing_factor, cfg.root_key as f32, 0.0),
            lifecycle: NoteLifecycleController::new(cfg.mode),
            backend,
            tuning:    Arc::clone(&tuning),
        };
        let readout = Readout { current_pitch: cfg.root_key as f32, ..Readout::default() };

        let shared = Shared {
            running:     AtomicBool::new(false),
            targets:     Mutex::new(Targets::at_rest(&tuning)),
            readout:     Mutex::new(readout),
            core:        Mutex::new(core),
            config_lock: Mutex::new(()),
            tuning:      ArcSwap::new(tuning),
            epoch:       Instant::now(),
        };

        Ok(Engine { shared: Arc::new(shared), worker: Mutex::new(None), reaper: Mutex::new(None) })
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────

    /// Spawn the control loop.  Calling it while running does nothing.
    ///
    /// If an earlier loop missed the stop timeout, this waits for it to
    /// finish first so two loops never tick at once.
    pub fn start(&self) {
        if self.is_running() {
            return;
        }
        if let Some(reaper) = lock(&self.reaper).take() {
            if !reaper.is_finished() {
                warn!("waiting for the previous control loop to exit");
            }
            let _ = reaper.join();
        }
        if self.shared.running.swap(true, Ordering::AcqRel) {
            return;
        }
        let (done_tx, done_rx) = mpsc::channel();
        let alive  = Arc::new(AtomicBool::new(true));
        let shared = Arc::clone(&self.shared);
        let flag   = Arc::clone(&alive);

        let handle = thread::spawn(move || {
            let mut next = Instant::now();
            while flag.load(Ordering::Acquire) {
                shared.tick(shared.now());

                let hz = shared.tuning.load().config.tick_hz.max(1);
                next += Duration::from_secs_f64(1.0 / hz as f64);
                let now = Instant::now();
                if next > now {
                    thread::sleep(next - now);
                } else {
                    // Fell behind; don't try to catch up with a burst.
                    next = now;
                }
            }
            let _ = done_tx.send(());
        });

        *lock(&self.worker) = Some(Worker { handle, done_rx, alive });
        info!("engine started at {} Hz", self.shared.tuning.load().config.tick_hz);
    }

    /// Stop the control loop and silence everything.
    ///
    /// Waits at most one second for the loop to exit.  If the loop is
    /// stuck inside a backend call, `stop` returns anyway and everything is
    /// silenced as soon as that call comes back.
    pub fn stop(&self) {
        self.shared.running.store(false, Ordering::Release);

        let worker = lock(&self.worker).take();
        let stalled = match worker {
            None => None,
            Some(worker) => {
                worker.alive.store(false, Ordering::Release);
                match worker.done_rx.recv_timeout(STOP_TIMEOUT) {
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                        let _ = worker.handle.join();
                        None
                    }
                    Err(RecvTimeoutError::Timeout) => Some(worker.handle),
                }
            }
        };

        match stalled {
            None => self.shared.silence(),
            Some(handle) => {
                warn!("control loop did not exit within {:?}", STOP_TIMEOUT);
                if !self.shared.try_silence() {
                    warn!("backend busy; notes end when the stalled call returns");
                }
                // Silence again once the loop is gone: its last tick may
                // have started notes after the attempt above.
                let shared = Arc::clone(&self.shared);
                *lock(&self.reaper) = Some(thread::spawn(move || {
                    let _ = handle.join();
                    shared.silence();
                    debug!("stalled control loop exited");
                }));
            }
        }
        info!("engine stopped");
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Run one control tick at `now` seconds on the caller's thread.
    ///
    /// For driving the engine without the background loop, e.g. from an
    /// offline renderer or a test.
    pub fn tick_at(&self, now: f64) {
        self.shared.tick(now);
    }

    // ── Input ─────────────────────────────────────────────────────────────

    /// Fold a hand frame into the targets.  Any thread; never blocks on the
    /// backend.
    pub fn submit_frame(&self, frame: &HandFrame) {
        let tuning = self.shared.tuning.load();
        GestureMapper.apply(frame, &tuning, &mut lock(&self.shared.targets));
    }

    // ── Readout ───────────────────────────────────────────────────────────

    pub fn readout(&self) -> Readout { *lock(&self.shared.readout) }

    /// The tuning currently in effect.
    pub fn tuning(&self) -> Arc<Tuning> { self.shared.tuning.load_full() }

    // ── Configuration ─────────────────────────────────────────────────────

    pub fn set_scale(&self, scale: Scale) -> Result<(), EngineError> {
        self.update("scale", |c| c.scale = scale)
    }

    /// Set the scale by name.  Unknown names are ignored and the current
    /// scale stays; returns whether the scale changed.
    pub fn set_scale_by_name(&self, name: &str) -> bool {
        match name.parse::<Scale>() {
            Ok(scale) => self.set_scale(scale).is_ok(),
            Err(e) => {
                warn!("ignoring scale change: {}", e);
                false
            }
        }
    }

    pub fn set_instrument_voice(&self, voice: Voice) -> Result<(), EngineError> {
        self.update("voice", |c| c.voice = voice)
    }

    pub fn set_pitch_range(&self, root_key: i32, octave_range: u32) -> Result<(), EngineError> {
        self.update("pitch range", |c| {
            c.root_key = root_key;
            c.octave_range = octave_range;
        })
    }

    pub fn set_mode(&self, mode: Mode) -> Result<(), EngineError> {
        self.update("mode", |c| c.mode = mode)
    }

    pub fn set_smoothing(&self, factor: f32) -> Result<(), EngineError> {
        self.update("smoothing", |c| c.smoothing_factor = factor)
    }

    /// Replace the whole configuration at once.
    pub fn reconfigure(&self, config: InstrumentConfig) -> Result<(), EngineError> {
        self.update("config", |c| *c = config)
    }

    /// Copy-modify-publish.  On error the previous tuning stays in effect.
    fn update(&self, what: &str, edit: impl FnOnce(&mut InstrumentConfig)) -> Result<(), EngineError> {
        let _writer = lock(&self.shared.config_lock);

        let mut config = self.shared.tuning.load().config.clone();
        edit(&mut config);
        let tuning = match Tuning::new(config) {
            Ok(t) => Arc::new(t),
            Err(e) => {
                warn!("rejected {} change: {}", what, e);
                return Err(e);
            }
        };

        self.shared.tuning.store(Arc::clone(&tuning));
        info!(
            "{} changed: {} {} root={} octaves={} voice={} pool={}",
            what,
            tuning.config.mode.name(),
            tuning.config.scale,
            tuning.config.root_key,
            tuning.config.octave_range,
            tuning.config.voice,
            tuning.pool.len(),
        );

        // Apply side effects now rather than on the next tick so a stopped
        // engine still switches voice and silences on mode change.
        lock(&self.shared.core).reconcile(&tuning);
        debug!("{} reconciled", what);
        Ok(())
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if self.is_running() {
            self.stop();
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Tests
// ════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::recording::{Command, RecordingBackend};
    use crate::backend::{BackendError, VoiceHandle};
    use crate::hand::Hand;

    /// Blocks inside `update_note` until released, like a wedged MIDI port.
    struct Stalling {
        inner:   RecordingBackend,
        entered: mpsc::Sender<()>,
        release: mpsc::Receiver<()>,
    }

    impl AudioBackend for Stalling {
        fn start_note(&mut self, pitch: f32, volume: f32) -> Result<VoiceHandle, BackendError> {
            self.inner.start_note(pitch, volume)
        }
        fn update_note(&mut self, voice: VoiceHandle, pitch: f32, volume: f32) -> Result<(), BackendError> {
            let _ = self.entered.send(());
            let _ = self.release.recv_timeout(Duration::from_secs(10));
            self.inner.update_note(voice, pitch, volume)
        }
        fn end_note(&mut self, voice: VoiceHandle) -> Result<(), BackendError> {
            self.inner.end_note(voice)
        }
        fn play_momentary_note(&mut self, pitch: f32, volume: f32, duration: Duration) -> Result<(), BackendError> {
            self.inner.play_momentary_note(pitch, volume, duration)
        }
        fn set_sustain(&mut self, on: bool) -> Result<(), BackendError> { self.inner.set_sustain(on) }
        fn set_voice(&mut self, voice: Voice) -> Result<(), BackendError> { self.inner.set_voice(voice) }
        fn end_all_notes(&mut self) { self.inner.end_all_notes() }
    }

    fn engine(config: InstrumentConfig) -> (Engine, RecordingBackend) {
        let rec = RecordingBackend::default();
        let engine = Engine::new(config, Box::new(rec.clone())).unwrap();
        rec.clear();
        (engine, rec)
    }

    fn glide() -> InstrumentConfig {
        InstrumentConfig { mode: Mode::Glide, octave_range: 1, ..Default::default() }
    }

    fn is_start(c: &Command) -> bool { matches!(c, Command::Start { .. }) }
    fn is_end(c: &Command) -> bool { matches!(c, Command::End(_)) }

    #[test]
    fn new_selects_voice() {
        let rec = RecordingBackend::default();
        let _e = Engine::new(InstrumentConfig::default(), Box::new(rec.clone())).unwrap();
        assert_eq!(rec.commands(), vec![Command::Voice(Voice::Violin)]);
    }

    #[test]
    fn new_rejects_invalid_config() {
        let bad = InstrumentConfig { unison_voice_count: 0, ..Default::default() };
        let err = Engine::new(bad, Box::new(RecordingBackend::default())).err();
        assert!(matches!(err, Some(EngineError::InvalidConfig { field: "unison_voice_count", .. })));
    }

    #[test]
    fn frame_then_tick_starts_glide() {
        let (e, rec) = engine(glide());
        e.submit_frame(&HandFrame::one(Hand::new(0.745, 0.2)));
        e.tick_at(0.0);

        assert_eq!(rec.count(is_start), 3);
        let r = e.readout();
        assert!(r.hands_detected);
        assert!(r.sounding);
        assert!((r.current_pitch - 66.0).abs() < 1e-3);
        assert_eq!(r.current_volume, 1.0);
    }

    #[test]
    fn last_frame_wins() {
        let (e, _rec) = engine(glide());
        e.submit_frame(&HandFrame::one(Hand::new(0.99, 0.2)));
        e.submit_frame(&HandFrame::one(Hand::new(0.5, 0.2)));
        e.tick_at(0.0);
        assert_eq!(e.readout().current_pitch, 60.0);
    }

    #[test]
    fn empty_frame_ends_glide() {
        let (e, rec) = engine(glide());
        e.submit_frame(&HandFrame::one(Hand::new(0.8, 0.2)));
        e.tick_at(0.0);
        e.submit_frame(&HandFrame::empty());
        e.tick_at(0.001);
        assert_eq!(rec.count(is_end), 3);
        assert!(!e.readout().sounding);
        assert!(!e.readout().hands_detected);
    }

    #[test]
    fn discrete_readout_reports_block_pitch() {
        let (e, _rec) = engine(InstrumentConfig { octave_range: 1, ..Default::default() });
        e.submit_frame(&HandFrame::one(Hand::new(0.98, 0.2)));
        e.tick_at(0.0);
        assert_eq!(e.readout().last_note, Some(72));
    }

    #[test]
    fn unknown_scale_name_is_ignored() {
        let (e, _rec) = engine(InstrumentConfig::default());
        assert!(e.set_scale_by_name("dorian"));
        assert_eq!(e.tuning().config.scale, Scale::Dorian);
        assert!(!e.set_scale_by_name("klingon"));
        assert_eq!(e.tuning().config.scale, Scale::Dorian);
    }

    #[test]
    fn scale_change_rebuilds_pool() {
        let (e, _rec) = engine(InstrumentConfig { octave_range: 1, ..Default::default() });
        e.set_scale(Scale::Major).unwrap();
        assert_eq!(e.tuning().pool.pitches(), &[60, 62, 64, 65, 67, 69, 71, 72]);
    }

    #[test]
    fn invalid_range_keeps_previous_tuning() {
        let (e, _rec) = engine(InstrumentConfig::default());
        let before = e.tuning();
        assert!(e.set_pitch_range(120, 2).is_err());
        assert!(Arc::ptr_eq(&before, &e.tuning()));
        e.set_pitch_range(48, 3).unwrap();
        assert_eq!(e.tuning().pitch_span(), (48.0, 84.0));
    }

    #[test]
    fn voice_change_reaches_backend() {
        let (e, rec) = engine(InstrumentConfig::default());
        e.set_instrument_voice(Voice::Flute).unwrap();
        assert_eq!(rec.commands(), vec![Command::Voice(Voice::Flute)]);
    }

    #[test]
    fn mode_change_silences_glide() {
        let (e, rec) = engine(glide());
        e.submit_frame(&HandFrame::one(Hand::new(0.8, 0.2)));
        e.tick_at(0.0);
        e.set_mode(Mode::Discrete).unwrap();
        assert_eq!(rec.count(is_end), 3);
        assert_eq!(e.tuning().config.mode, Mode::Discrete);
    }

    #[test]
    fn smoothing_change_applies() {
        let (e, _rec) = engine(glide());
        e.set_smoothing(0.5).unwrap();
        e.submit_frame(&HandFrame::one(Hand::new(0.99, 0.2)));
        e.tick_at(0.0);
        // 60 → 72 at factor 0.5 lands halfway in one tick.
        assert!((e.readout().current_pitch - 66.0).abs() < 1e-3);
        assert!(e.set_smoothing(0.0).is_err());
    }

    #[test]
    fn stop_silences_and_ends_all() {
        let (e, rec) = engine(glide());
        e.submit_frame(&HandFrame::one(Hand::new(0.8, 0.2)));
        e.tick_at(0.0);
        e.stop();
        assert_eq!(rec.count(is_end), 3);
        assert_eq!(rec.commands().last(), Some(&Command::EndAll));
    }

    #[test]
    fn control_loop_runs_and_stops() {
        let (e, rec) = engine(InstrumentConfig { tick_hz: 500, ..glide() });
        e.start();
        e.start();
        assert!(e.is_running());
        e.submit_frame(&HandFrame::one(Hand::new(0.8, 0.2)));
        thread::sleep(Duration::from_millis(50));
        assert!(e.readout().sounding);
        e.stop();
        assert!(!e.is_running());
        assert!(!e.readout().sounding);
        // One start burst despite the double start().
        assert_eq!(rec.count(is_start), 3);
        assert_eq!(rec.count(is_end), 3);
    }

    #[test]
    fn concurrent_ticks_never_roll_back_config() {
        let (e, rec) = engine(InstrumentConfig::default());
        let updates = 5_000;
        let done = AtomicBool::new(false);

        thread::scope(|s| {
            s.spawn(|| {
                let mut now = 0.0;
                while !done.load(Ordering::Acquire) {
                    e.tick_at(now);
                    now += 0.001;
                }
            });
            let mut voice = Voice::Violin;
            for _ in 0..updates {
                voice = voice.next();
                e.set_instrument_voice(voice).unwrap();
            }
            done.store(true, Ordering::Release);
        });

        let voices: Vec<Voice> = rec.commands().into_iter()
            .filter_map(|c| match c { Command::Voice(v) => Some(v), _ => None })
            .collect();
        assert_eq!(voices.len(), updates);
        let mut expected = Voice::Violin;
        for v in voices {
            expected = expected.next();
            assert_eq!(v, expected);
        }
    }

    #[test]
    fn stop_returns_while_backend_is_stalled() {
        let rec = RecordingBackend::default();
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let backend = Stalling { inner: rec.clone(), entered: entered_tx, release: release_rx };
        let e = Engine::new(glide(), Box::new(backend)).unwrap();

        e.submit_frame(&HandFrame::one(Hand::new(0.8, 0.2)));
        e.start();
        entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        let t0 = Instant::now();
        e.stop();
        assert!(t0.elapsed() < STOP_TIMEOUT + Duration::from_millis(500), "stop took {:?}", t0.elapsed());
        assert!(!e.is_running());
        assert_eq!(rec.count(|c| *c == Command::EndAll), 0);

        // Once the backend calls return, the stalled loop exits and
        // everything is silenced.
        drop(release_tx);
        let deadline = Instant::now() + Duration::from_secs(5);
        while (rec.count(|c| *c == Command::EndAll) == 0 || e.readout().sounding)
            && Instant::now() < deadline
        {
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(rec.commands().last(), Some(&Command::EndAll));
        assert_eq!(rec.count(is_end), 3);
        assert!(!e.readout().sounding);

        // Restarting runs a single fresh loop.
        rec.clear();
        e.start();
        thread::sleep(Duration::from_millis(50));
        let t1 = Instant::now();
        e.stop();
        assert!(t1.elapsed() < STOP_TIMEOUT);
        assert_eq!(rec.count(is_start), 3);
        assert_eq!(rec.count(is_end), 3);
    }
}
