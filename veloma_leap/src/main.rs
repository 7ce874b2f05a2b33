//! veloma_leap — interactive entry point.

use std::io::{self, Write};
use std::path::PathBuf;

use clap::Parser;
use tracing::info;

use veloma_engine::{InstrumentConfig, Mode, Scale, Voice};
use veloma_leap::app::{run, AppConfig};

#[derive(Parser, Debug)]
#[command(name = "veloma_leap", about = "Play music with your hands: pitch on one axis, volume on the other")]
struct Cli {
    /// TOML config file; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Scale name, e.g. major, dorian, blues
    #[arg(long)]
    scale: Option<Scale>,

    /// Root key as a MIDI note number (60 = C4)
    #[arg(long)]
    root: Option<i32>,

    /// Octaves above the root
    #[arg(long)]
    octaves: Option<u32>,

    /// glide or discrete
    #[arg(long)]
    mode: Option<Mode>,

    /// Voice name or General MIDI program number
    #[arg(long)]
    voice: Option<Voice>,

    /// Volume below which nothing sounds (0–1)
    #[arg(long)]
    threshold: Option<f32>,

    /// Per-tick smoothing factor in (0, 1]
    #[arg(long)]
    smoothing: Option<f32>,

    /// Minimum seconds between Discrete notes
    #[arg(long)]
    cooldown: Option<f64>,

    /// Parallel voices per Glide note
    #[arg(long)]
    unison: Option<usize>,

    /// Substring of the MIDI output port name
    #[arg(long)]
    port: Option<String>,

    /// Skip the interactive prompts and use defaults
    #[arg(long)]
    quick: bool,
}

impl Cli {
    fn has_overrides(&self) -> bool {
        self.scale.is_some() || self.root.is_some() || self.octaves.is_some()
            || self.mode.is_some() || self.voice.is_some() || self.threshold.is_some()
            || self.smoothing.is_some() || self.cooldown.is_some() || self.unison.is_some()
    }

    fn apply(&self, cfg: &mut AppConfig) {
        let i = &mut cfg.instrument;
        if let Some(v) = self.scale     { i.scale = v; }
        if let Some(v) = self.root      { i.root_key = v; }
        if let Some(v) = self.octaves   { i.octave_range = v; }
        if let Some(v) = self.mode      { i.mode = v; }
        if let Some(v) = self.voice     { i.voice = v; }
        if let Some(v) = self.threshold { i.volume_threshold = v; }
        if let Some(v) = self.smoothing { i.smoothing_factor = v; }
        if let Some(v) = self.cooldown  { i.note_cooldown_seconds = v; }
        if let Some(v) = self.unison    { i.unison_voice_count = v; }
        if let Some(p) = &self.port     { cfg.midi_port = Some(p.clone()); }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║              Veloma — play music with your hands             ║");
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();

    #[cfg(feature = "leap")]
    println!("  Input: LeapMotion hardware");
    #[cfg(not(feature = "leap"))]
    println!("  Input: mouse + keyboard simulation  (use --features leap for hardware)");
    println!();

    let mut cfg = match &cli.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };

    if cli.quick {
        println!("  Quick-start: chromatic from C4 over 2 octaves, discrete, violin\n");
    } else if cli.config.is_none() && !cli.has_overrides() {
        cfg.instrument = configure_interactively();
    }
    cli.apply(&mut cfg);
    cfg.instrument.validate()?;

    info!(
        "{} {} root={} octaves={} voice={}",
        cfg.instrument.mode.name(), cfg.instrument.scale, cfg.instrument.root_key,
        cfg.instrument.octave_range, cfg.instrument.voice,
    );

    println!();
    println!("  Opening visualizer window…");
    println!();

    run(cfg)
}

fn configure_interactively() -> InstrumentConfig {
    let defaults = InstrumentConfig::default();

    let root_key: i32 = read_line("  Root note MIDI# (default 60 = C4): ")
        .trim().parse().unwrap_or(defaults.root_key).clamp(0, 115);

    let octave_range: u32 = read_line("  Octaves 1–5 (default 2): ")
        .trim().parse().unwrap_or(defaults.octave_range).clamp(1, 5);
    // Keep the top of the range a valid MIDI note.
    let octave_range = octave_range.min(((127 - root_key) / 12).max(1) as u32);

    let scale = pick_scale();
    let mode = match read_line("  Mode: 1=Discrete 2=Glide (default 1): ").trim() {
        "2" => Mode::Glide,
        _   => Mode::Discrete,
    };
    let voice = pick_voice(defaults.voice);

    InstrumentConfig { root_key, octave_range, scale, mode, voice, ..defaults }
}

fn pick_scale() -> Scale {
    println!("  Scale:");
    for (i, s) in Scale::ALL.iter().enumerate() {
        println!("    {:>2}={}", i + 1, s);
    }
    read_line("  Choice (default 1): ")
        .trim().parse::<usize>().ok()
        .and_then(|n| n.checked_sub(1))
        .and_then(|i| Scale::ALL.get(i).copied())
        .unwrap_or_default()
}

fn pick_voice(default: Voice) -> Voice {
    println!("  Voice (name or GM program):");
    println!("    0=Grand Piano  11=Vibraphone  40=Violin  42=Cello");
    println!("    56=Trumpet  73=Flute  80=Lead Square  89=Warm Pad");
    read_line(&format!("  Voice (default {}): ", default))
        .trim().parse::<Voice>().unwrap_or(default)
}

fn read_line(prompt: &str) -> String {
    print!("{}", prompt);
    io::stdout().flush().ok();
    let mut buf = String::new();
    io::stdin().read_line(&mut buf).ok();
    buf
}
