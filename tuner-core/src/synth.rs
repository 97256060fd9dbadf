//! # Reference Tone Synthesizer
//!
//! Additive synthesis of reference tones: a fundamental plus a handful of
//! partials, shaped by an instrument-specific envelope. Timbres are plain
//! data looked up per [`Instrument`], so adding an instrument means adding a
//! table row.
//!
//! Every oscillator is tracked from the moment a tone starts until it is
//! released, either when its duration runs out during [`ToneSynthesizer::render`]
//! or when the tone is cancelled.

use crate::tuning::Instrument;
use std::f32::consts::PI;
use std::sync::{Arc, Mutex};

/// Synthesizer shared between the session and the output stream callback.
pub type SharedSynth = Arc<Mutex<ToneSynthesizer>>;

/// Fade applied to the last milliseconds of every tone to avoid a click.
const END_FADE_MS: f32 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Waveform {
    Sine,
    Triangle,
    Sawtooth,
    Square,
}

impl Waveform {
    /// One sample at `phase` in [0, 1).
    fn sample(self, phase: f32) -> f32 {
        match self {
            Waveform::Sine => (2.0 * PI * phase).sin(),
            Waveform::Triangle => 1.0 - 4.0 * (phase - 0.5).abs(),
            Waveform::Sawtooth => 2.0 * phase - 1.0,
            Waveform::Square => {
                if phase < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
        }
    }
}

/// Amplitude contour of a tone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Envelope {
    /// Fast attack then exponential decay, like a plucked string.
    Pluck { attack_ms: f32, decay_ms: f32 },
    /// Attack, hold, then a linear release ending at the tone's duration.
    Sustain { attack_ms: f32, release_ms: f32 },
}

impl Envelope {
    /// Gain at sample `n` of a tone lasting `total` samples.
    fn gain(self, n: usize, total: usize, sample_rate: f32) -> f32 {
        let ms = |value: f32| (value * sample_rate / 1000.0).max(1.0);
        let t = n as f32;
        let shape = match self {
            Envelope::Pluck {
                attack_ms,
                decay_ms,
            } => {
                let attack = ms(attack_ms);
                if t < attack {
                    t / attack
                } else {
                    (-(t - attack) / ms(decay_ms)).exp()
                }
            }
            Envelope::Sustain {
                attack_ms,
                release_ms,
            } => {
                let attack = ms(attack_ms);
                let release = ms(release_ms).min(total as f32);
                let remaining = total.saturating_sub(n) as f32;
                if t < attack {
                    t / attack
                } else if remaining < release {
                    remaining / release
                } else {
                    1.0
                }
            }
        };
        let remaining = total.saturating_sub(n) as f32;
        shape * (remaining / ms(END_FADE_MS)).min(1.0)
    }
}

/// One partial of a timbre, relative to the fundamental.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Partial {
    pub ratio: f32,
    pub gain: f32,
}

const fn partial(ratio: f32, gain: f32) -> Partial {
    Partial { ratio, gain }
}

/// Sound of one instrument family. The first partial is the fundamental.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InstrumentTimbre {
    pub waveform: Waveform,
    pub partials: &'static [Partial],
    pub envelope: Envelope,
    pub master_gain: f32,
}

static TIMBRES: [(Instrument, InstrumentTimbre); 8] = [
    (Instrument::Guitar, InstrumentTimbre {
        waveform: Waveform::Triangle,
        partials: &[partial(1.0, 1.0), partial(2.0, 0.5), partial(3.0, 0.3), partial(4.0, 0.18), partial(5.0, 0.1)],
        envelope: Envelope::Pluck { attack_ms: 4.0, decay_ms: 700.0 },
        master_gain: 0.3,
    }),
    (Instrument::Bass, InstrumentTimbre {
        waveform: Waveform::Sine,
        partials: &[partial(1.0, 1.0), partial(2.0, 0.6), partial(3.0, 0.35), partial(4.0, 0.2), partial(5.0, 0.1)],
        envelope: Envelope::Pluck { attack_ms: 6.0, decay_ms: 1100.0 },
        master_gain: 0.35,
    }),
    (Instrument::Ukulele, InstrumentTimbre {
        waveform: Waveform::Triangle,
        partials: &[partial(1.0, 1.0), partial(2.0, 0.4), partial(3.0, 0.25), partial(4.0, 0.12), partial(5.0, 0.06)],
        envelope: Envelope::Pluck { attack_ms: 3.0, decay_ms: 400.0 },
        master_gain: 0.3,
    }),
    (Instrument::Violin, InstrumentTimbre {
        waveform: Waveform::Sawtooth,
        partials: &[partial(1.0, 1.0), partial(2.0, 0.45), partial(3.0, 0.3), partial(4.0, 0.2), partial(5.0, 0.12), partial(6.0, 0.08)],
        envelope: Envelope::Sustain { attack_ms: 80.0, release_ms: 150.0 },
        master_gain: 0.18,
    }),
    (Instrument::Viola, InstrumentTimbre {
        waveform: Waveform::Sawtooth,
        partials: &[partial(1.0, 1.0), partial(2.0, 0.5), partial(3.0, 0.32), partial(4.0, 0.2), partial(5.0, 0.1)],
        envelope: Envelope::Sustain { attack_ms: 90.0, release_ms: 170.0 },
        master_gain: 0.2,
    }),
    (Instrument::Cello, InstrumentTimbre {
        waveform: Waveform::Sawtooth,
        partials: &[partial(1.0, 1.0), partial(2.0, 0.6), partial(3.0, 0.35), partial(4.0, 0.22), partial(5.0, 0.12), partial(6.0, 0.06)],
        envelope: Envelope::Sustain { attack_ms: 110.0, release_ms: 200.0 },
        master_gain: 0.22,
    }),
    (Instrument::Mandolin, InstrumentTimbre {
        waveform: Waveform::Square,
        partials: &[partial(1.0, 1.0), partial(2.0, 0.35), partial(3.0, 0.2), partial(4.0, 0.1), partial(5.0, 0.05)],
        envelope: Envelope::Pluck { attack_ms: 2.0, decay_ms: 350.0 },
        master_gain: 0.15,
    }),
    // The 4.2 partial is inharmonic and gives the bell-like ring.
    (Instrument::Banjo, InstrumentTimbre {
        waveform: Waveform::Triangle,
        partials: &[partial(1.0, 1.0), partial(2.0, 0.55), partial(3.0, 0.35), partial(4.2, 0.25), partial(5.0, 0.12)],
        envelope: Envelope::Pluck { attack_ms: 2.0, decay_ms: 300.0 },
        master_gain: 0.28,
    }),
];

/// Timbre used for reference tones of `instrument`.
pub fn timbre(instrument: Instrument) -> &'static InstrumentTimbre {
    TIMBRES
        .iter()
        .find(|(candidate, _)| *candidate == instrument)
        .map(|(_, timbre)| timbre)
        .unwrap_or(&TIMBRES[0].1)
}

/// Identifies a tone started by [`ToneSynthesizer::play`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ToneHandle(u64);

#[derive(Debug, Clone)]
struct Oscillator {
    waveform: Waveform,
    phase: f32,
    phase_inc: f32,
    gain: f32,
    emitted: usize,
    total: usize,
}

impl Oscillator {
    fn next(&mut self) -> f32 {
        let value = self.waveform.sample(self.phase) * self.gain;
        self.phase = (self.phase + self.phase_inc).fract();
        self.emitted += 1;
        value
    }

    fn finished(&self) -> bool {
        self.emitted >= self.total
    }
}

#[derive(Debug, Clone)]
struct Voice {
    handle: ToneHandle,
    oscillators: Vec<Oscillator>,
    envelope: Envelope,
    master_gain: f32,
    position: usize,
    total: usize,
}

/// Mixes all active reference tones.
#[derive(Debug, Clone)]
pub struct ToneSynthesizer {
    sample_rate: u32,
    voices: Vec<Voice>,
    next_handle: u64,
}

impl ToneSynthesizer {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            voices: Vec::new(),
            next_handle: 0,
        }
    }

    pub fn shared(sample_rate: u32) -> SharedSynth {
        Arc::new(Mutex::new(Self::new(sample_rate)))
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Applies to tones started afterwards.
    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        self.sample_rate = sample_rate.max(1);
    }

    /// Starts a tone at `frequency_hz` lasting `duration_ms`.
    ///
    /// Partials at or above Nyquist are left out.
    pub fn play(
        &mut self,
        frequency_hz: f32,
        timbre: &InstrumentTimbre,
        duration_ms: u64,
    ) -> ToneHandle {
        let rate = self.sample_rate as f32;
        let total = (duration_ms as f32 * rate / 1000.0).round() as usize;
        let oscillators: Vec<Oscillator> = timbre
            .partials
            .iter()
            .map(|p| (frequency_hz * p.ratio, p.gain))
            .filter(|&(freq, _)| freq > 0.0 && freq < rate / 2.0)
            .map(|(freq, gain)| Oscillator {
                waveform: timbre.waveform,
                phase: 0.0,
                phase_inc: freq / rate,
                gain,
                emitted: 0,
                total,
            })
            .collect();

        let handle = ToneHandle(self.next_handle);
        self.next_handle += 1;
        log::debug!(
            "[SYNTH] Tone {:?} at {:.2} Hz with {} oscillators for {} ms",
            handle,
            frequency_hz,
            oscillators.len(),
            duration_ms
        );
        if total > 0 && !oscillators.is_empty() {
            self.voices.push(Voice {
                handle,
                oscillators,
                envelope: timbre.envelope,
                master_gain: timbre.master_gain,
                position: 0,
                total,
            });
        }
        handle
    }

    /// Releases every oscillator of one tone. Returns whether it was active.
    pub fn cancel(&mut self, handle: ToneHandle) -> bool {
        let before = self.voices.len();
        self.voices.retain(|voice| voice.handle != handle);
        before != self.voices.len()
    }

    /// Releases every oscillator of every tone.
    pub fn cancel_all(&mut self) {
        self.voices.clear();
    }

    pub fn is_playing(&self, handle: ToneHandle) -> bool {
        self.voices.iter().any(|voice| voice.handle == handle)
    }

    /// Number of oscillators that have started and not yet been released.
    pub fn active_oscillators(&self) -> usize {
        self.voices.iter().map(|voice| voice.oscillators.len()).sum()
    }

    /// Fills an interleaved buffer with `channels` identical channels.
    ///
    /// Finished oscillators and voices are released as they run out.
    pub fn render(&mut self, out: &mut [f32], channels: usize) {
        let channels = channels.max(1);
        let rate = self.sample_rate as f32;
        for frame in out.chunks_mut(channels) {
            let mut mix = 0.0;
            for voice in &mut self.voices {
                let envelope = voice.envelope.gain(voice.position, voice.total, rate);
                let mut sum = 0.0;
                for oscillator in &mut voice.oscillators {
                    sum += oscillator.next();
                }
                voice.oscillators.retain(|oscillator| !oscillator.finished());
                voice.position += 1;
                mix += sum * envelope * voice.master_gain;
            }
            self.voices.retain(|voice| !voice.oscillators.is_empty());
            frame.fill(mix.tanh());
        }
    }
}
