//! # Pitch Detection Module
//!
//! Monophonic frequency estimation by normalized autocorrelation, with
//! parabolic interpolation for sub-sample accuracy and a cheap octave-error
//! correction against the strings of the active tuning.
//!
//! ## Features
//! - DC removal and a minimum-signal guard independent of the noise gate
//! - Lag search bounded to roughly 30-4000 Hz so per-frame cost is predictable
//! - Fundamental-period peak selection that ignores equally strong multiples
//! - Second-harmonic lock detection for high strings

use crate::noise_gate::rms;
use crate::tuning::{StringInfo, closest_string};

/// RMS below which the estimator refuses to guess.
pub const MIN_SIGNAL_RMS: f32 = 0.005;
/// Highest detectable frequency; sets the smallest lag.
pub const MAX_FREQUENCY_HZ: f32 = 4000.0;
/// Lowest detectable frequency; sets the largest lag.
pub const MIN_FREQUENCY_HZ: f32 = 30.0;
/// A later peak must reach this fraction of the strongest peak to be ignored
/// in favour of an earlier one.
const PEAK_RATIO: f32 = 0.9;

/// Octave correction is only attempted above this frequency.
pub const OCTAVE_CHECK_MIN_HZ: f32 = 250.0;
const OCTAVE_MATCH_RATIO: f32 = 0.4;
const OCTAVE_MATCH_MAX_DIFF_HZ: f32 = 15.0;

/// Raw output of the estimator for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionResult {
    pub frequency_hz: f32,
    /// Normalized autocorrelation peak strength in [0, 1].
    pub clarity: f32,
}

/// Estimates the fundamental frequency of `frame`.
///
/// Returns `None` for silence, signals too quiet to trust, or frames with
/// no positive correlation peak in the search range.
pub fn estimate(frame: &[f32], sample_rate: u32) -> Option<DetectionResult> {
    let len = frame.len();
    if len < 4 || sample_rate == 0 {
        return None;
    }

    // --- Step 1: DC removal ---
    let mean = frame.iter().sum::<f32>() / len as f32;
    let signal: Vec<f32> = frame.iter().map(|&s| s - mean).collect();

    // --- Step 2: Minimum signal guard ---
    let level = rms(&signal);
    if level < MIN_SIGNAL_RMS {
        return None;
    }
    let power = level * level;

    // --- Step 3: Normalized autocorrelation over the bounded lag range ---
    let sr = sample_rate as f32;
    let min_lag = ((sr / MAX_FREQUENCY_HZ) as usize).max(2);
    let lowest_pitch_lag = (sr / MIN_FREQUENCY_HZ) as usize;
    let max_lag = lowest_pitch_lag.min(len / 2);
    if min_lag >= max_lag {
        return None;
    }

    // One extra lag on each side so every candidate has interpolation neighbours.
    let first = min_lag - 1;
    let correlations: Vec<f32> = (first..=max_lag + 1)
        .map(|lag| correlation(&signal, lag))
        .collect();
    let at = |lag: usize| correlations[lag - first];

    // The lowest-pitch lag counts as a peak while still rising, so 30 Hz is
    // found even when the window tilts its peak past the range. A range cut
    // short by the frame length gets no such allowance: a rising curve there
    // belongs to a longer period the frame cannot resolve.
    let open_ended = max_lag == lowest_pitch_lag;
    let is_peak = |lag: usize| {
        let value = at(lag);
        value > 0.0
            && value > at(lag - 1)
            && ((open_ended && lag == max_lag) || value >= at(lag + 1))
    };

    let strongest = (min_lag..=max_lag)
        .filter(|&lag| is_peak(lag))
        .map(at)
        .fold(0.0_f32, f32::max);
    if strongest <= 0.0 {
        return None;
    }

    // --- Step 4: Fundamental period = first peak close to the strongest ---
    let best_lag = (min_lag..=max_lag).find(|&lag| is_peak(lag) && at(lag) >= strongest * PEAK_RATIO)?;
    let best_correlation = at(best_lag);

    // --- Step 5: Parabolic interpolation for better precision ---
    let y1 = at(best_lag - 1);
    let y2 = best_correlation;
    let y3 = at(best_lag + 1);
    let curvature = y1 - 2.0 * y2 + y3;
    let refined_lag = if curvature.abs() > f32::EPSILON {
        let shift = (y1 - y3) / (2.0 * curvature);
        best_lag as f32 + shift.clamp(-0.5, 0.5)
    } else {
        best_lag as f32
    };

    let frequency_hz = sr / refined_lag;
    let clarity = (best_correlation / power).clamp(0.0, 1.0);

    if frequency_hz.is_finite() && frequency_hz > 0.0 {
        Some(DetectionResult {
            frequency_hz,
            clarity,
        })
    } else {
        None
    }
}

/// Mean of `x[i] * x[i + lag]` over the overlapping samples.
fn correlation(signal: &[f32], lag: usize) -> f32 {
    let count = signal.len() - lag;
    // f64 accumulation keeps long sums from drowning the peak curvature.
    let sum: f64 = signal[..count]
        .iter()
        .zip(&signal[lag..])
        .map(|(&a, &b)| a as f64 * b as f64)
        .sum();
    (sum / count as f64) as f32
}

/// Halves `frequency` when it looks like the second harmonic of a string.
///
/// Autocorrelation on bright, harmonic-rich strings can lock onto the
/// overtone. If half the frequency lands much closer to a tuning string than
/// the frequency itself does, the fundamental is assumed.
pub fn correct_octave(frequency: f32, strings: &[StringInfo]) -> f32 {
    if frequency <= OCTAVE_CHECK_MIN_HZ {
        return frequency;
    }
    let half = frequency / 2.0;
    let (Some(direct), Some(octave)) = (
        closest_string(frequency, strings),
        closest_string(half, strings),
    ) else {
        return frequency;
    };

    let direct_diff = (frequency - direct.frequency_hz).abs();
    let octave_diff = (half - octave.frequency_hz).abs();
    if octave_diff < OCTAVE_MATCH_RATIO * direct_diff && octave_diff < OCTAVE_MATCH_MAX_DIFF_HZ {
        log::trace!(
            "[PITCH] Octave correction {:.2} Hz -> {:.2} Hz ({}{})",
            frequency,
            half,
            octave.name,
            octave.octave
        );
        half
    } else {
        frequency
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, sample_rate: u32, len: usize, amplitude: f32) -> Vec<f32> {
        (0..len)
            .map(|i| {
                amplitude
                    * (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate as f32).sin()
            })
            .collect()
    }

    #[test]
    fn silence_has_no_pitch() {
        assert!(estimate(&vec![0.0; 4096], 44100).is_none());
    }

    #[test]
    fn dc_offset_alone_has_no_pitch() {
        assert!(estimate(&vec![0.4; 4096], 44100).is_none());
    }

    #[test]
    fn dc_offset_does_not_shift_pitch() {
        let mut frame = sine(220.0, 44100, 4096, 0.3);
        frame.iter_mut().for_each(|s| *s += 0.25);
        let result = estimate(&frame, 44100).unwrap();
        assert!((result.frequency_hz - 220.0).abs() < 2.2);
    }

    #[test]
    fn short_frame_rejects_period_beyond_half_length() {
        // 1024 samples only resolve periods up to 512 lags (about 86 Hz).
        assert!(estimate(&sine(73.42, 44100, 1024, 0.5), 44100).is_none());
        assert!(estimate(&sine(70.0, 44100, 1024, 0.5), 44100).is_none());
    }

    #[test]
    fn short_frame_still_detects_resolvable_pitch() {
        let result = estimate(&sine(220.0, 44100, 1024, 0.5), 44100).unwrap();
        assert!((result.frequency_hz - 220.0).abs() < 2.2);
    }

    #[test]
    fn tiny_frames_are_rejected() {
        assert!(estimate(&[0.5, -0.5], 44100).is_none());
    }
}
