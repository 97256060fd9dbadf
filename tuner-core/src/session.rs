//! # Tuner Session
//!
//! Orchestrates one listening session: opens the capture stream, runs the
//! per-frame pipeline (gate → estimate → octave correction → smoothing →
//! note lock → mapping) on a fixed cadence, and publishes a fresh
//! [`TunerState`] after every processed frame.
//!
//! ## Architecture
//! - **Capture**: the input callback pushes raw chunks over a crossbeam channel
//! - **Detection loop**: [`TunerSession::tick`] runs on a single thread; all
//!   pipeline state lives in a per-session [`SmoothingContext`]
//! - **Cancellation**: a [`CancellationFlag`] is checked before each iteration
//!   touches any buffer and again before the next iteration is scheduled
//! - **Playback**: reference tones go to a separate output stream

use crossbeam_channel::{Receiver, Sender, TryRecvError};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::audio::{AudioFrame, AudioInput, CpalInput, SampleWindow};
use crate::config::TunerConfig;
use crate::error::{Result, TunerError};
use crate::noise_gate::NoiseGate;
use crate::pitch;
use crate::playback::{AudioOutput, CpalOutput};
use crate::smoothing::{CentsSmoother, FrequencySmoother};
use crate::stabilizer::NoteStabilizer;
use crate::synth::{self, SharedSynth, ToneHandle, ToneSynthesizer};
use crate::tuning::{self, DEFAULT_A4_HZ, NoteKey, StringInfo, TuningPreset};

/// Chunks buffered between the capture callback and the loop.
const CAPTURE_QUEUE: usize = 64;

/// The externally observable output of a session.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TunerState {
    pub is_listening: bool,
    pub current_frequency_hz: f32,
    /// Empty until a note has been accepted.
    pub detected_note: String,
    pub detected_octave: i32,
    /// Deviation from the accepted note, in [-50, 50].
    pub cents: i32,
    pub clarity: f32,
}

/// Shared stop signal for one listening session.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Fixed-interval cadence for the detection loop.
#[derive(Debug, Clone)]
pub struct FrameScheduler {
    interval: Duration,
    next_due: Option<Instant>,
}

impl FrameScheduler {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_due: None,
        }
    }

    /// Makes the next iteration due immediately, dropping previous timing.
    pub fn restart(&mut self, now: Instant) {
        self.next_due = Some(now);
    }

    pub fn stop(&mut self) {
        self.next_due = None;
    }

    pub fn is_due(&self, now: Instant) -> bool {
        self.next_due.is_some_and(|due| now >= due)
    }

    pub fn schedule_next(&mut self, now: Instant) {
        self.next_due = Some(now + self.interval);
    }

    /// Time to wait before the next iteration; zero when due or stopped.
    pub fn time_until_next(&self, now: Instant) -> Duration {
        self.next_due
            .map(|due| due.saturating_duration_since(now))
            .unwrap_or(Duration::ZERO)
    }
}

/// Per-session pipeline state. Created on start, dropped on stop.
#[derive(Debug)]
pub struct SmoothingContext {
    gate: NoiseGate,
    frequency: FrequencySmoother,
    cents: CentsSmoother,
    stabilizer: NoteStabilizer,
    started_at: Instant,
}

impl SmoothingContext {
    pub fn new(started_at: Instant) -> Self {
        Self {
            gate: NoiseGate::new(),
            frequency: FrequencySmoother::new(),
            cents: CentsSmoother::new(),
            stabilizer: NoteStabilizer::new(),
            started_at,
        }
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.started_at)
    }

    pub fn stabilizer(&self) -> &NoteStabilizer {
        &self.stabilizer
    }

    pub fn gate(&self) -> &NoiseGate {
        &self.gate
    }
}

struct Capture {
    receiver: Receiver<Vec<f32>>,
    window: SampleWindow,
    sample_rate: u32,
}

/// A tuner bound to one input and one output device.
pub struct TunerSession {
    config: TunerConfig,
    a4_hz: f32,
    /// The selected preset as defined at concert pitch.
    preset: TuningPreset,
    /// `preset` retuned to `a4_hz`.
    tuning: TuningPreset,
    input: Box<dyn AudioInput>,
    output: Box<dyn AudioOutput>,
    synth: SharedSynth,
    current_tone: Option<ToneHandle>,
    capture: Option<Capture>,
    context: Option<SmoothingContext>,
    cancel: Option<CancellationFlag>,
    scheduler: FrameScheduler,
    state: TunerState,
    subscribers: Vec<Sender<TunerState>>,
}

impl TunerSession {
    pub fn new(
        config: TunerConfig,
        input: Box<dyn AudioInput>,
        output: Box<dyn AudioOutput>,
    ) -> Result<Self> {
        config.validate()?;
        let preset = tuning::find_preset(&config.tuning)
            .cloned()
            .ok_or_else(|| TunerError::Config(format!("unknown tuning '{}'", config.tuning)))?;
        let a4_hz = config.a4_hz;
        let tuning = preset.retuned(DEFAULT_A4_HZ, a4_hz);
        let scheduler = FrameScheduler::new(config.frame_interval());
        Ok(Self {
            config,
            a4_hz,
            preset,
            tuning,
            input,
            output,
            synth: ToneSynthesizer::shared(crate::audio::TARGET_SAMPLE_RATE),
            current_tone: None,
            capture: None,
            context: None,
            cancel: None,
            scheduler,
            state: TunerState::default(),
            subscribers: Vec::new(),
        })
    }

    /// A session on the default microphone and speakers.
    pub fn with_default_devices(config: TunerConfig) -> Result<Self> {
        Self::new(config, Box::new(CpalInput::new()), Box::new(CpalOutput::new()))
    }

    // --- Lifecycle ---

    pub fn start(&mut self) -> Result<()> {
        self.start_at(Instant::now())
    }

    /// Starts listening, treating `now` as the session start.
    ///
    /// Does nothing when already listening. On failure no session state is
    /// left behind.
    pub fn start_at(&mut self, now: Instant) -> Result<()> {
        if self.is_listening() {
            log::debug!("[SESSION] start() while listening ignored");
            return Ok(());
        }
        // A flag cancelled from outside that no tick has observed yet.
        self.stop();

        if self.tuning.strings.is_empty() {
            return Err(TunerError::InputUnavailable(format!(
                "tuning '{}' has no strings",
                self.tuning.id
            )));
        }

        let (sender, receiver) = crossbeam_channel::bounded(CAPTURE_QUEUE);
        let sample_rate = self.input.open(sender)?;
        log::info!(
            "[SESSION] Listening at {} Hz, tuning '{}', A4 = {} Hz",
            sample_rate,
            self.tuning.id,
            self.a4_hz
        );

        self.capture = Some(Capture {
            receiver,
            window: SampleWindow::new(self.config.buffer_size),
            sample_rate,
        });
        self.context = Some(SmoothingContext::new(now));
        self.cancel = Some(CancellationFlag::new());
        self.scheduler.restart(now);
        self.publish(TunerState {
            is_listening: true,
            ..TunerState::default()
        });
        Ok(())
    }

    /// Stops listening and releases the input. Does nothing when stopped.
    pub fn stop(&mut self) {
        let Some(flag) = self.cancel.take() else {
            return;
        };
        flag.cancel();
        self.input.close();
        self.capture = None;
        self.context = None;
        self.scheduler.stop();
        self.publish(TunerState::default());
        log::info!("[SESSION] Stopped listening");
    }

    pub fn is_listening(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| !flag.is_cancelled())
    }

    /// Flag that stops this session when cancelled from anywhere.
    pub fn cancellation(&self) -> Option<CancellationFlag> {
        self.cancel.clone()
    }

    // --- Detection loop ---

    /// One iteration of the detection loop.
    ///
    /// Returns `false` once the session is no longer listening; the caller
    /// must not schedule another iteration then.
    pub fn tick(&mut self, now: Instant) -> bool {
        if !self.check_listening() {
            return false;
        }
        if !self.scheduler.is_due(now) {
            return true;
        }

        match self.drain_capture() {
            Ok(Some(frame)) => {
                self.process_frame(&frame, now);
            }
            Ok(None) => {}
            Err(e) => {
                log::warn!("[SESSION] {}", e);
                self.stop();
                return false;
            }
        }

        if !self.check_listening() {
            return false;
        }
        self.scheduler.schedule_next(now);
        true
    }

    /// Runs the detection loop on this thread until the session stops.
    pub fn run(&mut self) {
        while self.tick(Instant::now()) {
            std::thread::sleep(self.scheduler.time_until_next(Instant::now()));
        }
    }

    /// Time until the next tick is due.
    pub fn time_until_next_tick(&self, now: Instant) -> Duration {
        self.scheduler.time_until_next(now)
    }

    fn check_listening(&mut self) -> bool {
        let cancelled = match &self.cancel {
            None => return false,
            Some(flag) => flag.is_cancelled(),
        };
        if cancelled {
            self.stop();
        }
        !cancelled
    }

    /// Moves captured chunks into the window and snapshots it.
    fn drain_capture(&mut self) -> Result<Option<AudioFrame>> {
        let Some(capture) = self.capture.as_mut() else {
            return Ok(None);
        };
        loop {
            match capture.receiver.try_recv() {
                Ok(chunk) => capture.window.push(&chunk),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    return Err(TunerError::TransientAudioInterruption(
                        "capture stream ended".into(),
                    ));
                }
            }
        }
        Ok(capture.window.frame(capture.sample_rate))
    }

    /// Runs the full pipeline on one frame.
    ///
    /// Returns `true` when a new state was published. Gated frames and
    /// frames without a usable pitch leave the state untouched.
    pub fn process_frame(&mut self, frame: &AudioFrame, now: Instant) -> bool {
        let Some(context) = self.context.as_mut() else {
            return false;
        };
        let elapsed = context.elapsed(now);

        if context.gate.should_gate(&frame.samples, elapsed) {
            return false;
        }
        let Some(detection) = pitch::estimate(&frame.samples, frame.sample_rate) else {
            return false;
        };
        let corrected = pitch::correct_octave(detection.frequency_hz, &self.tuning.strings);
        let smoothed = context.frequency.push(corrected);

        let mut next = TunerState {
            is_listening: true,
            current_frequency_hz: smoothed,
            clarity: detection.clarity,
            ..self.state.clone()
        };

        if let Some(reading) = tuning::frequency_to_note(smoothed, self.a4_hz) {
            let previous = context.stabilizer.accepted();
            if let Some(accepted) = context.stabilizer.update(reading.key(), elapsed) {
                if previous != Some(accepted) {
                    context.cents.reset();
                }
                match accepted_cents(smoothed, accepted, self.a4_hz) {
                    Some(raw) => {
                        next.detected_note = accepted.note.to_string();
                        next.detected_octave = accepted.octave;
                        next.cents = context.cents.push(raw);
                    }
                    None => log::warn!(
                        "[SESSION] Could not map accepted note {}{}",
                        accepted.note,
                        accepted.octave
                    ),
                }
            }
        }

        log::trace!(
            "[SESSION] {:.2} Hz (clarity {:.2}) -> {}{} {:+}",
            next.current_frequency_hz,
            next.clarity,
            next.detected_note,
            next.detected_octave,
            next.cents
        );
        self.publish(next);
        true
    }

    // --- Published state ---

    pub fn state(&self) -> &TunerState {
        &self.state
    }

    /// Receives every state published from now on.
    pub fn subscribe(&mut self) -> Receiver<TunerState> {
        let (sender, receiver) = crossbeam_channel::unbounded();
        self.subscribers.push(sender);
        receiver
    }

    /// Tuning string closest to the detected frequency.
    pub fn closest_string(&self) -> Option<&StringInfo> {
        if self.state.current_frequency_hz <= 0.0 {
            return None;
        }
        tuning::closest_string(self.state.current_frequency_hz, &self.tuning.strings)
    }

    /// The pipeline context of the running session.
    pub fn context(&self) -> Option<&SmoothingContext> {
        self.context.as_ref()
    }

    fn publish(&mut self, state: TunerState) {
        self.state = state;
        let state = &self.state;
        self.subscribers
            .retain(|subscriber| subscriber.send(state.clone()).is_ok());
    }

    // --- Configuration ---

    pub fn a4_frequency(&self) -> f32 {
        self.a4_hz
    }

    /// Changes the A4 reference, re-deriving the displayed note at once.
    pub fn set_a4_frequency(&mut self, hz: f32) -> Result<()> {
        self.a4_hz = tuning::validate_a4(hz)?;
        self.tuning = self.preset.retuned(DEFAULT_A4_HZ, hz);
        log::info!("[SESSION] A4 reference set to {} Hz", hz);
        self.rederive_note();
        Ok(())
    }

    /// Selects a built-in preset. Unknown ids are ignored with a warning.
    pub fn set_tuning(&mut self, preset_id: &str) {
        match tuning::find_preset(preset_id) {
            Some(preset) => self.set_tuning_preset(preset.clone()),
            None => log::warn!("[SESSION] Unknown tuning preset '{}', keeping '{}'", preset_id, self.preset.id),
        }
    }

    /// Selects a preset supplied by the caller, defined at concert pitch.
    pub fn set_tuning_preset(&mut self, preset: TuningPreset) {
        log::info!("[SESSION] Tuning set to '{}'", preset.id);
        self.tuning = preset.retuned(DEFAULT_A4_HZ, self.a4_hz);
        self.preset = preset;
    }

    pub fn tuning(&self) -> &TuningPreset {
        &self.tuning
    }

    pub fn config(&self) -> &TunerConfig {
        &self.config
    }

    fn rederive_note(&mut self) {
        let Some(context) = self.context.as_mut() else {
            return;
        };
        let Some(frequency) = context.frequency.current() else {
            return;
        };
        if self.state.detected_note.is_empty() {
            return;
        }
        let Some(reading) = tuning::frequency_to_note(frequency, self.a4_hz) else {
            return;
        };
        let key = reading.key();
        let Some(raw) = accepted_cents(frequency, key, self.a4_hz) else {
            return;
        };
        context.stabilizer.force_accept(key);
        context.cents.reset();
        let cents = context.cents.push(raw);
        let next = TunerState {
            detected_note: key.note.to_string(),
            detected_octave: key.octave,
            cents,
            ..self.state.clone()
        };
        self.publish(next);
    }

    // --- Reference tones ---

    /// Plays `string` for the configured default duration.
    pub fn play_reference_tone(&mut self, string: &StringInfo) -> Result<ToneHandle> {
        self.play_reference_tone_for(string, self.config.tone_duration_ms)
    }

    /// Plays `string` for `duration_ms`, replacing any tone still sounding.
    pub fn play_reference_tone_for(
        &mut self,
        string: &StringInfo,
        duration_ms: u64,
    ) -> Result<ToneHandle> {
        if !self.output.is_open() {
            let sample_rate = self.output.open(self.synth.clone())?;
            self.lock_synth()?.set_sample_rate(sample_rate);
        }
        let timbre = synth::timbre(self.tuning.instrument);
        let previous = self.current_tone.take();
        let mut synth = self.lock_synth()?;
        if let Some(previous) = previous {
            synth.cancel(previous);
        }
        let handle = synth.play(string.frequency_hz, timbre, duration_ms);
        drop(synth);
        log::info!(
            "[SESSION] Reference tone {}{} ({:.2} Hz) for {} ms",
            string.name,
            string.octave,
            string.frequency_hz,
            duration_ms
        );
        self.current_tone = Some(handle);
        Ok(handle)
    }

    /// Cancels the tone started last, releasing its oscillators.
    pub fn stop_reference_tone(&mut self) {
        if let Some(handle) = self.current_tone.take() {
            if let Ok(mut synth) = self.synth.lock() {
                synth.cancel(handle);
            }
        }
    }

    pub fn active_oscillators(&self) -> usize {
        self.synth
            .lock()
            .map(|synth| synth.active_oscillators())
            .unwrap_or(0)
    }

    /// The synthesizer rendered by the output stream.
    pub fn synth(&self) -> SharedSynth {
        self.synth.clone()
    }

    fn lock_synth(&self) -> Result<std::sync::MutexGuard<'_, ToneSynthesizer>> {
        self.synth
            .lock()
            .map_err(|_| TunerError::OutputUnavailable("tone synthesizer lock poisoned".into()))
    }

    // --- Foreground / background ---

    /// Suspends both audio contexts, e.g. when the app goes to background.
    pub fn on_background(&mut self) {
        if let Err(e) = self.input.suspend() {
            log::warn!("[SESSION] Could not suspend input: {}", e);
        }
        if let Err(e) = self.output.suspend() {
            log::warn!("[SESSION] Could not suspend output: {}", e);
        }
    }

    /// Resumes audio after a foreground transition.
    ///
    /// A listening session restarts its loop cold: buffered audio is
    /// discarded and the cadence restarts at `now`. If the input cannot be
    /// resumed the session is stopped.
    pub fn on_foreground(&mut self, now: Instant) -> Result<()> {
        if let Err(e) = self.output.resume() {
            log::warn!("[SESSION] Could not resume output: {}", e);
        }
        if !self.is_listening() {
            return Ok(());
        }
        if let Err(e) = self.input.resume() {
            log::warn!("[SESSION] Could not resume input, stopping: {}", e);
            self.stop();
            return Err(match e {
                TunerError::TransientAudioInterruption(_) => e,
                other => TunerError::TransientAudioInterruption(other.to_string()),
            });
        }
        if let Some(capture) = self.capture.as_mut() {
            while capture.receiver.try_recv().is_ok() {}
            capture.window.clear();
        }
        self.scheduler.restart(now);
        log::info!("[SESSION] Resumed in foreground, loop restarted");
        Ok(())
    }
}

impl Drop for TunerSession {
    fn drop(&mut self) {
        self.stop();
        self.output.close();
    }
}

/// Cents of `frequency` from the accepted note.
fn accepted_cents(frequency: f32, accepted: NoteKey, a4_hz: f32) -> Option<f32> {
    let target = tuning::note_to_frequency(accepted.note, accepted.octave, a4_hz).ok()?;
    Some(tuning::cents_between(frequency, target))
}
