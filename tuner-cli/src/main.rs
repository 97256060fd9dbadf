//! # Tuner - Command Line Front End
//!
//! Runs a tuner session on the default microphone and prints every change
//! of the displayed reading as one JSON object per line.
//!
//! ## Architecture
//! - **Main Thread**: the detection loop (`TunerSession::run`) at a fixed cadence
//! - **Printer Thread**: receives published states over a crossbeam channel
//! - **Ctrl-C / time limit**: cancel the session's flag; the next tick stops the loop

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::Receiver;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;
use tuner_core::{TunerConfig, TunerSession, TunerState, tuning};

#[derive(Debug, Parser)]
#[command(name = "tuner", about = "Real-time instrument tuner")]
struct Args {
    /// JSON config file; flags below override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// A4 reference in Hz (400-480)
    #[arg(long)]
    a4: Option<f32>,

    /// Tuning preset id, see --list-tunings
    #[arg(long)]
    tuning: Option<String>,

    /// Play the reference tone of this string (0 = first in the preset order) before listening
    #[arg(long)]
    tone: Option<usize>,

    /// Reference tone length in milliseconds
    #[arg(long)]
    tone_ms: Option<u64>,

    /// Stop listening after this many seconds
    #[arg(long)]
    seconds: Option<u64>,

    /// Print the available tuning presets and exit
    #[arg(long)]
    list_tunings: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    if args.list_tunings {
        for preset in tuning::presets() {
            let strings: Vec<String> = preset
                .strings
                .iter()
                .map(|s| format!("{}{}", s.name, s.octave))
                .collect();
            println!("{:<20} {:<20} {}", preset.id, preset.name, strings.join(" "));
        }
        return Ok(());
    }

    let config = load_config(&args)?;
    log::info!("[MAIN] Starting tuner with {:?}", config);
    let mut session = TunerSession::with_default_devices(config)
        .context("creating tuner session")?;

    if let Some(index) = args.tone {
        let string = session
            .tuning()
            .strings
            .get(index)
            .cloned()
            .with_context(|| format!("tuning has no string {}", index))?;
        session
            .play_reference_tone(&string)
            .context("playing reference tone")?;
    }

    let states = session.subscribe();
    let printer = thread::spawn(move || print_states(states));

    session.start().context("starting audio capture")?;
    if let Some(flag) = session.cancellation() {
        if let Some(seconds) = args.seconds {
            let timer = flag.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_secs(seconds));
                log::info!("[MAIN] Time limit reached");
                timer.cancel();
            });
        }
        ctrlc::set_handler(move || flag.cancel()).context("installing Ctrl-C handler")?;
    }

    session.run();

    // Dropping the session closes the state channel and ends the printer.
    drop(session);
    if printer.join().is_err() {
        log::error!("[MAIN] Printer thread panicked");
    }
    log::info!("[MAIN] Tuner finished");
    Ok(())
}

/// Builds the config from the optional file, then applies flag overrides.
fn load_config(args: &Args) -> Result<TunerConfig> {
    let mut config = match &args.config {
        Some(path) => TunerConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => TunerConfig::default(),
    };
    if let Some(a4) = args.a4 {
        config.a4_hz = a4;
    }
    if let Some(tuning) = &args.tuning {
        config.tuning = tuning.clone();
    }
    if let Some(tone_ms) = args.tone_ms {
        config.tone_duration_ms = tone_ms;
    }
    config.validate().context("invalid settings")?;
    Ok(config)
}

/// Prints states whose visible reading differs from the last one printed.
fn print_states(states: Receiver<TunerState>) {
    let mut last: Option<TunerState> = None;
    for state in states {
        let changed = last.as_ref().is_none_or(|previous| {
            previous.is_listening != state.is_listening
                || previous.detected_note != state.detected_note
                || previous.detected_octave != state.detected_octave
                || previous.cents != state.cents
        });
        if changed {
            match serde_json::to_string(&state) {
                Ok(line) => println!("{}", line),
                Err(e) => log::error!("[MAIN] Could not serialize state: {}", e),
            }
            last = Some(state);
        }
    }
}
