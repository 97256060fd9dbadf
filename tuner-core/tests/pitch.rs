mod common;

use common::{SAMPLE_RATE, sine};
use tuner_core::pitch::{correct_octave, estimate};
use tuner_core::tuning::find_preset;

const FRAME: usize = 16384;

fn assert_detects(freq: f32, sample_rate: u32) {
    let frame = sine(freq, sample_rate, FRAME, 0.5);
    let result = estimate(&frame, sample_rate)
        .unwrap_or_else(|| panic!("no pitch detected for {} Hz", freq));
    let error = (result.frequency_hz - freq).abs() / freq;
    assert!(
        error < 0.01,
        "{} Hz detected as {} Hz ({:.3}% off)",
        freq,
        result.frequency_hz,
        error * 100.0
    );
    assert!(result.clarity > 0.9, "{} Hz clarity {}", freq, result.clarity);
}

#[test]
fn sine_across_supported_range() {
    for freq in [30.0, 41.2, 55.0, 82.41, 110.0, 196.0, 329.63, 440.0, 880.0, 1760.0, 3520.0, 4000.0] {
        assert_detects(freq, SAMPLE_RATE);
    }
}

#[test]
fn sine_at_48k() {
    for freq in [73.42, 261.63, 1046.5] {
        assert_detects(freq, 48000);
    }
}

#[test]
fn harmonic_rich_signal_reports_fundamental() {
    let fundamental = sine(110.0, SAMPLE_RATE, FRAME, 0.3);
    let second = sine(220.0, SAMPLE_RATE, FRAME, 0.25);
    let third = sine(330.0, SAMPLE_RATE, FRAME, 0.15);
    let frame: Vec<f32> = fundamental
        .iter()
        .zip(&second)
        .zip(&third)
        .map(|((a, b), c)| a + b + c)
        .collect();
    let result = estimate(&frame, SAMPLE_RATE).unwrap();
    assert!((result.frequency_hz - 110.0).abs() < 1.1, "got {}", result.frequency_hz);
}

#[test]
fn quiet_signal_is_rejected() {
    let frame = sine(440.0, SAMPLE_RATE, 4096, 0.002);
    assert!(estimate(&frame, SAMPLE_RATE).is_none());
}

#[test]
fn octave_correction_halves_second_harmonic_lock() {
    let guitar = find_preset("guitar-standard").unwrap();
    let g3 = guitar.strings[3].frequency_hz;
    let corrected = correct_octave(2.0 * g3, &guitar.strings);
    assert!((corrected - g3).abs() < 1e-3);
}

#[test]
fn octave_correction_keeps_direct_match() {
    let guitar = find_preset("guitar-standard").unwrap();
    let e4 = guitar.strings[5].frequency_hz;
    assert_eq!(correct_octave(e4, &guitar.strings), e4);
}

#[test]
fn octave_correction_ignores_low_frequencies() {
    let guitar = find_preset("guitar-standard").unwrap();
    // 220 Hz is A2's second harmonic but sits below the check threshold.
    assert_eq!(correct_octave(220.0, &guitar.strings), 220.0);
}

#[test]
fn octave_correction_needs_close_half_match() {
    let guitar = find_preset("guitar-standard").unwrap();
    // Half of 500 Hz is 250 Hz, 3 Hz from B3, but 500 Hz is 170 Hz from E4:
    // corrected. Half of 640 Hz is 320 Hz, 9.6 Hz from E4 but 310 Hz from
    // the direct match; still under 15 Hz, so corrected too.
    assert_eq!(correct_octave(500.0, &guitar.strings), 250.0);
    assert_eq!(correct_octave(640.0, &guitar.strings), 320.0);
    // Half of 720 Hz is 360 Hz, 30 Hz from E4: over the absolute limit.
    assert_eq!(correct_octave(720.0, &guitar.strings), 720.0);
}

#[test]
fn octave_correction_without_strings_is_identity() {
    assert_eq!(correct_octave(600.0, &[]), 600.0);
}
