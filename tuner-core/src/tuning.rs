//! # Musical Tuning Module
//!
//! Frequency ↔ note conversions for equal temperament with a configurable
//! A4 reference, plus the built-in table of instrument tuning presets.
//!
//! ## Features
//! - Note/octave/cents mapping that stays correct below A4 (floor modulo)
//! - Exact inverse mapping from note name and octave to frequency
//! - Sharp and flat spellings accepted on input, sharps produced on output
//! - Tuning presets for guitar, bass, ukulele, bowed strings, mandolin and banjo

use crate::error::{Result, TunerError};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// Lowest accepted A4 reference in Hz.
pub const MIN_A4_HZ: f32 = 400.0;
/// Highest accepted A4 reference in Hz.
pub const MAX_A4_HZ: f32 = 480.0;
/// Concert pitch.
pub const DEFAULT_A4_HZ: f32 = 440.0;

/// Chromatic note names starting at A, so that index 0 is the A4 anchor.
pub const NOTE_NAMES: [&str; 12] = [
    "A", "A#", "B", "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#",
];

/// MIDI number of A4; anchors the octave arithmetic.
const A4_MIDI: i32 = 69;

/// A frequency expressed as the nearest equal-tempered note.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoteReading {
    /// Note name with sharp spelling (e.g. "A#").
    pub note: &'static str,
    /// Scientific pitch octave (A4 = 440 Hz is octave 4).
    pub octave: i32,
    /// Deviation from the note in whole cents, in [-50, 50].
    pub cents: i32,
}

impl NoteReading {
    /// Identity of the note independent of its tuning deviation.
    pub fn key(&self) -> NoteKey {
        NoteKey {
            note: self.note,
            octave: self.octave,
        }
    }
}

/// A note name and octave, used to compare readings across frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NoteKey {
    pub note: &'static str,
    pub octave: i32,
}

/// Rejects A4 references outside [`MIN_A4_HZ`, `MAX_A4_HZ`].
pub fn validate_a4(a4_hz: f32) -> Result<f32> {
    if a4_hz.is_finite() && (MIN_A4_HZ..=MAX_A4_HZ).contains(&a4_hz) {
        Ok(a4_hz)
    } else {
        Err(TunerError::ReferenceOutOfRange(a4_hz))
    }
}

/// Maps a frequency to its nearest note, octave and cents deviation.
///
/// Returns `None` for frequencies that cannot name a note (zero, negative,
/// or not finite).
pub fn frequency_to_note(freq: f32, a4_hz: f32) -> Option<NoteReading> {
    if !(freq.is_finite() && freq > 0.0 && a4_hz > 0.0) {
        return None;
    }
    let semitones_from_a4 = 12.0 * (freq / a4_hz).log2();
    let nearest = semitones_from_a4.round();
    let cents = ((semitones_from_a4 - nearest) * 100.0).round() as i32;
    let nearest = nearest as i32;

    // rem_euclid keeps the index positive for notes below A4.
    let note = NOTE_NAMES[nearest.rem_euclid(12) as usize];
    let octave = (nearest + A4_MIDI).div_euclid(12) - 1;

    Some(NoteReading {
        note,
        octave,
        cents: cents.clamp(-50, 50),
    })
}

/// Frequency of `note` in `octave`, the exact inverse of [`frequency_to_note`]
/// for a zero-cent reading.
pub fn note_to_frequency(note: &str, octave: i32, a4_hz: f32) -> Result<f32> {
    let from_c = semitones_from_c(note).ok_or_else(|| TunerError::UnknownNote(note.to_string()))?;
    // Cb and B# cross into the neighbouring octave, so no wrapping here.
    let midi = (octave + 1) * 12 + from_c;
    let semitones = (midi - A4_MIDI) as f32;
    Ok(a4_hz * 2.0_f32.powf(semitones / 12.0))
}

/// Index of a note name in [`NOTE_NAMES`], accepting flat spellings.
pub fn note_index(name: &str) -> Option<usize> {
    // NOTE_NAMES starts at A, nine semitones above C.
    semitones_from_c(name).map(|from_c| (from_c - 9).rem_euclid(12) as usize)
}

/// Semitones above the C of the written octave, in [-1, 12].
fn semitones_from_c(name: &str) -> Option<i32> {
    let mut chars = name.trim().chars();
    let letter = chars.next()?.to_ascii_uppercase();
    let natural: i32 = match letter {
        'C' => 0,
        'D' => 2,
        'E' => 4,
        'F' => 5,
        'G' => 7,
        'A' => 9,
        'B' => 11,
        _ => return None,
    };
    let accidental: i32 = match chars.as_str() {
        "" => 0,
        "#" | "♯" => 1,
        "b" | "♭" => -1,
        _ => return None,
    };
    Some(natural + accidental)
}

/// Calculates the deviation from a target frequency in cents.
///
/// Positive values are sharp, negative values flat.
pub fn cents_between(freq: f32, target_freq: f32) -> f32 {
    1200.0 * (freq / target_freq).log2()
}

/// Instrument families with their own tunings and reference-tone timbres.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Instrument {
    Guitar,
    Bass,
    Ukulele,
    Violin,
    Viola,
    Cello,
    Mandolin,
    Banjo,
}

/// One open string of a tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StringInfo {
    pub name: String,
    pub octave: i32,
    pub frequency_hz: f32,
    /// Position within the preset in the instrument's conventional string
    /// order. Usually lowest first, but re-entrant strings such as the banjo
    /// drone or the ukulele high G keep their traditional place.
    pub index: usize,
}

/// An ordered set of open-string pitches for one instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TuningPreset {
    pub id: String,
    pub name: String,
    pub instrument: Instrument,
    pub strings: Vec<StringInfo>,
}

impl TuningPreset {
    /// Builds a preset from note names, computing frequencies against `a4_hz`.
    ///
    /// Strings with unrecognized names are skipped.
    pub fn from_notes(
        id: &str,
        name: &str,
        instrument: Instrument,
        notes: &[(&str, i32)],
        a4_hz: f32,
    ) -> Self {
        let strings = notes
            .iter()
            .filter_map(|&(note, octave)| {
                note_to_frequency(note, octave, a4_hz)
                    .ok()
                    .map(|frequency_hz| (note, octave, frequency_hz))
            })
            .enumerate()
            .map(|(index, (note, octave, frequency_hz))| StringInfo {
                name: note.to_string(),
                octave,
                frequency_hz,
                index,
            })
            .collect();
        Self {
            id: id.to_string(),
            name: name.to_string(),
            instrument,
            strings,
        }
    }

    /// The same preset with every string scaled from `from_a4` to `to_a4`.
    pub fn retuned(&self, from_a4: f32, to_a4: f32) -> Self {
        let ratio = to_a4 / from_a4;
        let mut preset = self.clone();
        for string in &mut preset.strings {
            string.frequency_hz *= ratio;
        }
        preset
    }
}

/// Tuning string whose frequency is nearest to `freq`.
pub fn closest_string(freq: f32, strings: &[StringInfo]) -> Option<&StringInfo> {
    strings.iter().min_by(|a, b| {
        let diff_a = (a.frequency_hz - freq).abs();
        let diff_b = (b.frequency_hz - freq).abs();
        diff_a.total_cmp(&diff_b)
    })
}

/// Built-in presets, computed once at [`DEFAULT_A4_HZ`].
static PRESETS: Lazy<Vec<TuningPreset>> = Lazy::new(|| {
    use Instrument::*;
    let table: [(&str, &str, Instrument, &[(&str, i32)]); 14] = [
        ("guitar-standard", "Guitar Standard", Guitar,
            &[("E", 2), ("A", 2), ("D", 3), ("G", 3), ("B", 3), ("E", 4)]),
        ("guitar-drop-d", "Guitar Drop D", Guitar,
            &[("D", 2), ("A", 2), ("D", 3), ("G", 3), ("B", 3), ("E", 4)]),
        ("guitar-open-g", "Guitar Open G", Guitar,
            &[("D", 2), ("G", 2), ("D", 3), ("G", 3), ("B", 3), ("D", 4)]),
        ("guitar-dadgad", "Guitar DADGAD", Guitar,
            &[("D", 2), ("A", 2), ("D", 3), ("G", 3), ("A", 3), ("D", 4)]),
        ("bass-standard", "Bass Standard", Bass,
            &[("E", 1), ("A", 1), ("D", 2), ("G", 2)]),
        ("bass-5-string", "Bass 5-String", Bass,
            &[("B", 0), ("E", 1), ("A", 1), ("D", 2), ("G", 2)]),
        ("ukulele-standard", "Ukulele Standard", Ukulele,
            &[("G", 4), ("C", 4), ("E", 4), ("A", 4)]),
        ("ukulele-baritone", "Ukulele Baritone", Ukulele,
            &[("D", 3), ("G", 3), ("B", 3), ("E", 4)]),
        ("violin-standard", "Violin", Violin,
            &[("G", 3), ("D", 4), ("A", 4), ("E", 5)]),
        ("viola-standard", "Viola", Viola,
            &[("C", 3), ("G", 3), ("D", 4), ("A", 4)]),
        ("cello-standard", "Cello", Cello,
            &[("C", 2), ("G", 2), ("D", 3), ("A", 3)]),
        ("mandolin-standard", "Mandolin", Mandolin,
            &[("G", 3), ("D", 4), ("A", 4), ("E", 5)]),
        ("banjo-open-g", "Banjo Open G", Banjo,
            &[("G", 4), ("D", 3), ("G", 3), ("B", 3), ("D", 4)]),
        ("banjo-double-c", "Banjo Double C", Banjo,
            &[("G", 4), ("C", 3), ("G", 3), ("C", 4), ("D", 4)]),
    ];
    table
        .iter()
        .map(|(id, name, instrument, notes)| {
            TuningPreset::from_notes(id, name, *instrument, notes, DEFAULT_A4_HZ)
        })
        .collect()
});

/// All built-in presets.
pub fn presets() -> &'static [TuningPreset] {
    &PRESETS
}

/// Looks up a built-in preset by id.
pub fn find_preset(id: &str) -> Option<&'static TuningPreset> {
    PRESETS.iter().find(|preset| preset.id == id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floor_modulo_below_a4() {
        // G#3 is one semitone below A3: -13 semitones from A4.
        let reading = frequency_to_note(207.65, 440.0).unwrap();
        assert_eq!(reading.note, "G#");
        assert_eq!(reading.octave, 3);
    }

    #[test]
    fn octave_changes_at_c() {
        let b3 = frequency_to_note(246.94, 440.0).unwrap();
        let c4 = frequency_to_note(261.63, 440.0).unwrap();
        assert_eq!((b3.note, b3.octave), ("B", 3));
        assert_eq!((c4.note, c4.octave), ("C", 4));
    }

    #[test]
    fn flats_parse_to_sharps() {
        assert_eq!(note_index("Bb"), note_index("A#"));
        assert_eq!(note_index("Cb"), note_index("B"));
        assert_eq!(note_index("H"), None);
    }

    #[test]
    fn rejects_invalid_frequencies() {
        assert!(frequency_to_note(0.0, 440.0).is_none());
        assert!(frequency_to_note(f32::NAN, 440.0).is_none());
    }

    #[test]
    fn string_index_follows_conventional_order() {
        let banjo = find_preset("banjo-open-g").unwrap();
        let drone = &banjo.strings[0];
        assert_eq!((drone.name.as_str(), drone.octave, drone.index), ("G", 4, 0));
        assert!(drone.frequency_hz > banjo.strings[1].frequency_hz);
        for (position, string) in banjo.strings.iter().enumerate() {
            assert_eq!(string.index, position);
        }
    }

    #[test]
    fn presets_have_strings() {
        for preset in presets() {
            assert!(!preset.strings.is_empty(), "{} has no strings", preset.id);
        }
        let guitar = find_preset("guitar-standard").unwrap();
        assert!((guitar.strings[0].frequency_hz - 82.41).abs() < 0.01);
        assert!((guitar.strings[5].frequency_hz - 329.63).abs() < 0.01);
    }
}
