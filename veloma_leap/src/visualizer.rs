//! Software-rendered visualizer using `minifb`.
//!
//! The play area stands in for the camera frame: normalised hand
//! coordinates map straight onto it.
//!
//! ```text
//! ┌──────────────────────────┬─────────────────────────────┬──┐
//! │                          │ C4 │ D4 │ E4 │ F4 │ G4 │ … │▓▓│ ← volume
//! │   silent half            │    │    │  ■ │    │    │   │▓▓│   bar
//! │                          │    │    │    │    │    │   │──│ ← threshold
//! ├──────────────────────────┴─────────────────────────────┴──┤
//! │  pitch bar ══════════════════════▌                        │
//! │  status line                                              │
//! │  key legend                                               │
//! └───────────────────────────────────────────────────────────┘
//! ```

use std::sync::mpsc::Sender;
use std::time::Duration;

use minifb::{Key, KeyRepeat, MouseMode, Window, WindowOptions};
use veloma_engine::{assign_roles, HandFrame, Mode, Readout, Tuning};
use veloma_music::{map_range, note_name};

use crate::app::AppCommand;
use crate::hand_source::SimInput;

// ════════════════════════════════════════════════════════════════════════════
// Layout constants
// ════════════════════════════════════════════════════════════════════════════

pub const WIN_W:     usize = 960;
pub const WIN_H:     usize = 540;
const STATUS_H:      usize = 64;
const PLAY_H:        usize = WIN_H - STATUS_H;
const VOLUME_BAR_W:  usize = 14;
const MARKER:        usize = 10;
const BG_COLOR:      u32   = 0xFF1A1A2E;
const SILENT_BG:     u32   = 0xFF141424;
const REGION_BG:     u32   = 0xFF16213E;
const BOUNDARY:      u32   = 0xFF2E4A7A;
const ACTIVE_BLOCK:  u32   = 0xFF3A5F9F;
const PITCH_HAND:    u32   = 0xFFFFD700;  // gold
const VOLUME_HAND:   u32   = 0xFF66CCFF;
const SOUNDING:      u32   = 0xFFFF6B6B;
const TEXT_BG:       u32   = 0xFF0F3460;

/// Sim volume-hand movement per frame while an arrow key is held.
const ARROW_STEP: f32 = 0.01;

// ════════════════════════════════════════════════════════════════════════════
// Scene — one frame's worth of state to draw
// ════════════════════════════════════════════════════════════════════════════

pub struct Scene<'a> {
    pub tuning:          &'a Tuning,
    pub readout:         Readout,
    pub frame:           &'a HandFrame,
    pub status:          &'a str,
    pub show_boundaries: bool,
}

// ════════════════════════════════════════════════════════════════════════════
// Visualizer
// ════════════════════════════════════════════════════════════════════════════

pub struct Visualizer {
    window: Window,
    buf:    Vec<u32>,
    /// Present in simulation mode: the window is the hand tracker.
    sim_tx: Option<Sender<SimInput>>,

    // ── simulated volume hand ─────────────────────────────────────────────
    volume_hand: (f32, f32),
    two_hands:   bool,
}

impl Visualizer {
    pub fn new(sim_tx: Option<Sender<SimInput>>) -> Result<Self, String> {
        let mut window = Window::new(
            "Veloma — gesture instrument",
            WIN_W, WIN_H,
            WindowOptions {
                resize: false,
                ..WindowOptions::default()
            },
        ).map_err(|e| e.to_string())?;

        window.limit_update_rate(Some(Duration::from_millis(16))); // ~60fps

        Ok(Visualizer {
            window,
            buf: vec![BG_COLOR; WIN_W * WIN_H],
            sim_tx,
            volume_hand: (0.2, 0.5),
            two_hands:   false,
        })
    }

    /// Returns false when the window should close.
    pub fn is_open(&self) -> bool { self.window.is_open() }

    /// Poll keyboard and mouse.  App commands are returned; in simulation
    /// mode the pointer state is also sent on as a [`SimInput`].
    pub fn poll_input(&mut self) -> Vec<AppCommand> {
        let mut cmds = Vec::new();
        if !self.window.is_open() {
            cmds.push(AppCommand::Quit);
            return cmds;
        }

        let one_shot = |k: Key| self.window.is_key_pressed(k, KeyRepeat::No);

        if one_shot(Key::Q) || one_shot(Key::Escape) { cmds.push(AppCommand::Quit); }
        if one_shot(Key::M)            { cmds.push(AppCommand::ToggleMode); }
        if one_shot(Key::S)            { cmds.push(AppCommand::NextScale); }
        if one_shot(Key::V)            { cmds.push(AppCommand::NextVoice); }
        if one_shot(Key::B)            { cmds.push(AppCommand::ToggleBoundaries); }
        if one_shot(Key::Equal)        { cmds.push(AppCommand::OctaveUp); }
        if one_shot(Key::Minus)        { cmds.push(AppCommand::OctaveDown); }
        if one_shot(Key::RightBracket) { cmds.push(AppCommand::RootUp); }
        if one_shot(Key::LeftBracket)  { cmds.push(AppCommand::RootDown); }
        if one_shot(Key::Period)       { cmds.push(AppCommand::SmoothingUp); }
        if one_shot(Key::Comma)        { cmds.push(AppCommand::SmoothingDown); }

        if self.sim_tx.is_some() {
            self.poll_sim();
        }
        cmds
    }

    fn poll_sim(&mut self) {
        if self.window.is_key_pressed(Key::H, KeyRepeat::No) {
            self.two_hands = !self.two_hands;
        }
        let down = |k: Key| self.window.is_key_down(k);
        let (mut vx, mut vy) = self.volume_hand;
        if down(Key::Left)  { vx -= ARROW_STEP; }
        if down(Key::Right) { vx += ARROW_STEP; }
        if down(Key::Up)    { vy -= ARROW_STEP; }
        if down(Key::Down)  { vy += ARROW_STEP; }
        self.volume_hand = (vx.clamp(0.0, 1.0), vy.clamp(0.0, 1.0));

        let mouse = self.window.get_mouse_pos(MouseMode::Discard)
            .map(|(x, y)| (x / WIN_W as f32, y / PLAY_H as f32))
            .filter(|&(_, y)| y <= 1.0);

        let input = SimInput {
            mouse,
            volume_hand: self.volume_hand,
            two_hands:   self.two_hands,
            trigger:     self.window.is_key_down(Key::Space),
        };
        if let Some(tx) = &self.sim_tx {
            let _ = tx.send(input);
        }
    }

    /// Render one frame.
    pub fn render(&mut self, scene: &Scene<'_>) {
        self.buf.fill(BG_COLOR);

        let (start, end) = scene.tuning.pitch_region();
        let x0 = px(start);
        let x1 = px(end);

        // ── Regions ───────────────────────────────────────────────────────
        self.fill_rect(0, 0, x0, PLAY_H, SILENT_BG);
        self.fill_rect(x0, 0, x1 - x0, PLAY_H, REGION_BG);

        // ── Note boundaries / glide cursor ────────────────────────────────
        match scene.tuning.config.mode {
            Mode::Discrete if scene.show_boundaries => self.draw_blocks(scene, x0, x1),
            Mode::Discrete => {}
            Mode::Glide => self.draw_glide_cursor(scene, start, end),
        }

        // ── Hands ─────────────────────────────────────────────────────────
        self.draw_hands(scene.frame);

        // ── Volume bar ────────────────────────────────────────────────────
        self.draw_volume_bar(scene.readout.current_volume, scene.tuning.config.volume_threshold);

        // ── Status area ───────────────────────────────────────────────────
        self.fill_rect(0, PLAY_H, WIN_W, STATUS_H, TEXT_BG);
        self.draw_pitch_bar(scene);
        self.draw_label(scene.status, 10, PLAY_H + 24, 0xFFEEEEEE);
        self.draw_label(
            "M=mode  S=scale  V=voice  -/+=octaves  [/]=root  ,/.=smoothing  B=boundaries  Q=quit",
            10, WIN_H - 12, 0xFF888888,
        );
        if self.sim_tx.is_some() {
            self.draw_label(
                "mouse=pitch hand  arrows=volume hand  H=two hands  space=trigger",
                10, WIN_H - 22, 0xFF888888,
            );
        }

        self.window.update_with_buffer(&self.buf, WIN_W, WIN_H).ok();
    }

    // ── Discrete blocks ───────────────────────────────────────────────────

    fn draw_blocks(&mut self, scene: &Scene<'_>, x0: usize, x1: usize) {
        let pool = scene.tuning.pool.pitches();
        let n = pool.len().max(1);
        let width = (x1 - x0) as f32 / n as f32;

        for (i, &pitch) in pool.iter().enumerate() {
            let bx = x0 + (i as f32 * width) as usize;
            let bw = width.ceil() as usize;
            if scene.readout.last_note == Some(pitch) {
                self.fill_rect(bx, 0, bw, PLAY_H, ACTIVE_BLOCK);
            }
            self.fill_rect(bx, 0, 1, PLAY_H, BOUNDARY);
            if width >= 16.0 {
                self.draw_label(&note_name(pitch), bx + 3, 6, 0xFFAADDFF);
            }
        }
    }

    // ── Glide cursor ──────────────────────────────────────────────────────

    fn draw_glide_cursor(&mut self, scene: &Scene<'_>, start: f32, end: f32) {
        let (lo, hi) = scene.tuning.pitch_span();
        let x = px(map_range(scene.readout.current_pitch, lo, hi, start, end));
        let color = if scene.readout.sounding { SOUNDING } else { BOUNDARY };
        self.fill_rect(x.saturating_sub(1), 0, 3, PLAY_H, color);
        self.draw_label(&format!("{:.1}", scene.readout.current_pitch), x + 5, 6, 0xFFAADDFF);
    }

    // ── Palm markers ──────────────────────────────────────────────────────

    fn draw_hands(&mut self, frame: &HandFrame) {
        for (hand, color) in frame.used().iter().zip(marker_colors(frame)) {
            let (hx, hy) = hand.palm_center;
            let cx = px(hx).saturating_sub(MARKER / 2);
            let cy = ((hy.clamp(0.0, 1.0) * PLAY_H as f32) as usize).saturating_sub(MARKER / 2);
            self.fill_rect(cx, cy, MARKER, MARKER, color);
            if hand.trigger {
                self.draw_border(cx.saturating_sub(3), cy.saturating_sub(3), MARKER + 6, MARKER + 6, SOUNDING);
            }
            if let Some(rx) = hand.rightmost_x {
                self.fill_rect(px(rx), cy, 1, MARKER, color);
            }
        }
    }

    // ── Bars ──────────────────────────────────────────────────────────────

    fn draw_volume_bar(&mut self, volume: f32, threshold: f32) {
        let x = WIN_W - VOLUME_BAR_W;
        let h = (volume.clamp(0.0, 1.0) * PLAY_H as f32) as usize;
        let color = if volume > threshold { SOUNDING } else { VOLUME_HAND };
        self.fill_rect(x, PLAY_H - h, VOLUME_BAR_W, h, color);
        let ty = PLAY_H - (threshold * PLAY_H as f32) as usize;
        self.fill_rect(x, ty.min(PLAY_H - 1), VOLUME_BAR_W, 1, 0xFFFFFFFF);
    }

    fn draw_pitch_bar(&mut self, scene: &Scene<'_>) {
        let (lo, hi) = scene.tuning.pitch_span();
        let w = WIN_W - 20;
        let filled = (map_range(scene.readout.current_pitch, lo, hi, 0.0, 1.0) * w as f32) as usize;
        self.fill_rect(10, PLAY_H + 8, w, 6, BG_COLOR);
        self.fill_rect(10, PLAY_H + 8, filled, 6, PITCH_HAND);
    }

    // ── Primitive drawing helpers ─────────────────────────────────────────

    fn fill_rect(&mut self, x: usize, y: usize, w: usize, h: usize, color: u32) {
        for row in y..(y+h).min(WIN_H) {
            for col in x..(x+w).min(WIN_W) {
                self.buf[row * WIN_W + col] = color;
            }
        }
    }

    fn draw_border(&mut self, x: usize, y: usize, w: usize, h: usize, color: u32) {
        if w == 0 || h == 0 { return; }
        self.fill_rect(x, y, w, 1, color);
        self.fill_rect(x, y + h - 1, w, 1, color);
        self.fill_rect(x, y, 1, h, color);
        self.fill_rect(x + w - 1, y, 1, h, color);
    }

    fn set_pixel(&mut self, x: usize, y: usize, color: u32) {
        if x < WIN_W && y < WIN_H {
            self.buf[y * WIN_W + x] = color;
        }
    }

    /// Minimal bitmap font — 3×5 characters, one bit per pixel.
    fn draw_label(&mut self, text: &str, x: usize, y: usize, color: u32) {
        let mut cx = x;
        for ch in text.chars() {
            let glyph = char_glyph(ch);
            for (row, &bits) in glyph.iter().enumerate() {
                for col in 0..3usize {
                    if bits & (1 << (2 - col)) != 0 {
                        self.set_pixel(cx + col, y + row, color);
                    }
                }
            }
            cx += 4; // 3 wide + 1 gap
            if cx + 4 > WIN_W { break; }
        }
    }
}

/// Marker colour per used hand: exactly one pitch hand, the rest volume.
fn marker_colors(frame: &HandFrame) -> Vec<u32> {
    let pitch_hand = assign_roles(frame).map(|r| r.pitch_hand);
    (0..frame.used().len())
        .map(|i| if Some(i) == pitch_hand { PITCH_HAND } else { VOLUME_HAND })
        .collect()
}

/// Normalised x to a pixel column.
fn px(x: f32) -> usize {
    ((x.clamp(0.0, 1.0) * WIN_W as f32) as usize).min(WIN_W - 1)
}

// ────────────────────────────────────────────────────────────────────────────
// 3×5 bitmap font
// ────────────────────────────────────────────────────────────────────────────

fn char_glyph(c: char) -> [u8; 5] {
    match c {
        '0' => [0b111, 0b101, 0b101, 0b101, 0b111],
        '1' => [0b010, 0b110, 0b010, 0b010, 0b111],
        '2' => [0b111, 0b001, 0b111, 0b100, 0b111],
        '3' => [0b111, 0b001, 0b111, 0b001, 0b111],
        '4' => [0b101, 0b101, 0b111, 0b001, 0b001],
        '5' => [0b111, 0b100, 0b111, 0b001, 0b111],
        '6' => [0b111, 0b100, 0b111, 0b101, 0b111],
        '7' => [0b111, 0b001, 0b001, 0b001, 0b001],
        '8' => [0b111, 0b101, 0b111, 0b101, 0b111],
        '9' => [0b111, 0b101, 0b111, 0b001, 0b111],
        'a' | 'A' => [0b111, 0b101, 0b111, 0b101, 0b101],
        'b' | 'B' => [0b110, 0b101, 0b110, 0b101, 0b110],
        'c' | 'C' => [0b111, 0b100, 0b100, 0b100, 0b111],
        'd' | 'D' => [0b110, 0b101, 0b101, 0b101, 0b110],
        'e' | 'E' => [0b111, 0b100, 0b111, 0b100, 0b111],
        'f' | 'F' => [0b111, 0b100, 0b111, 0b100, 0b100],
        'g' | 'G' => [0b111, 0b100, 0b101, 0b101, 0b111],
        'h' | 'H' => [0b101, 0b101, 0b111, 0b101, 0b101],
        'i' | 'I' => [0b111, 0b010, 0b010, 0b010, 0b111],
        'j' | 'J' => [0b001, 0b001, 0b001, 0b101, 0b111],
        'k' | 'K' => [0b101, 0b101, 0b110, 0b101, 0b101],
        'l' | 'L' => [0b100, 0b100, 0b100, 0b100, 0b111],
        'm' | 'M' => [0b101, 0b111, 0b101, 0b101, 0b101],
        'n' | 'N' => [0b111, 0b101, 0b101, 0b101, 0b101],
        'o' | 'O' => [0b111, 0b101, 0b101, 0b101, 0b111],
        'p' | 'P' => [0b111, 0b101, 0b111, 0b100, 0b100],
        'q' | 'Q' => [0b111, 0b101, 0b101, 0b111, 0b001],
        'r' | 'R' => [0b110, 0b101, 0b110, 0b101, 0b101],
        's' | 'S' => [0b111, 0b100, 0b111, 0b001, 0b111],
        't' | 'T' => [0b111, 0b010, 0b010, 0b010, 0b010],
        'u' | 'U' => [0b101, 0b101, 0b101, 0b101, 0b111],
        'v' | 'V' => [0b101, 0b101, 0b101, 0b010, 0b010],
        'w' | 'W' => [0b101, 0b101, 0b101, 0b111, 0b101],
        'x' | 'X' => [0b101, 0b101, 0b010, 0b101, 0b101],
        'y' | 'Y' => [0b101, 0b101, 0b111, 0b010, 0b010],
        'z' | 'Z' => [0b111, 0b001, 0b010, 0b100, 0b111],
        '#' => [0b101, 0b111, 0b101, 0b111, 0b101],
        '/' => [0b001, 0b001, 0b010, 0b100, 0b100],
        '-' => [0b000, 0b000, 0b111, 0b000, 0b000],
        '.' => [0b000, 0b000, 0b000, 0b000, 0b010],
        ',' => [0b000, 0b000, 0b000, 0b010, 0b100],
        ':' => [0b000, 0b010, 0b000, 0b010, 0b000],
        '=' => [0b000, 0b111, 0b000, 0b111, 0b000],
        '+' => [0b000, 0b010, 0b111, 0b010, 0b000],
        '[' => [0b110, 0b100, 0b100, 0b100, 0b110],
        ']' => [0b011, 0b001, 0b001, 0b001, 0b011],
        '(' => [0b010, 0b100, 0b100, 0b100, 0b010],
        ')' => [0b010, 0b001, 0b001, 0b001, 0b010],
        ' ' => [0b000, 0b000, 0b000, 0b000, 0b000],
        _   => [0b000, 0b000, 0b010, 0b000, 0b000], // fallback dot
    }
}
