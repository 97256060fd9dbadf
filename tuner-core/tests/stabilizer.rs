use std::time::Duration;
use tuner_core::stabilizer::{NoteStabilizer, STARTUP_WINDOW};
use tuner_core::tuning::NoteKey;

fn key(note: &'static str, octave: i32) -> NoteKey {
    NoteKey { note, octave }
}

#[test]
fn startup_needs_five_identical_frames() {
    let mut stabilizer = NoteStabilizer::new();
    let mut t = Duration::ZERO;
    let step = Duration::from_millis(16);

    for distinct in [key("C", 4), key("D", 4), key("E", 4), key("F", 4)] {
        assert_eq!(stabilizer.update(distinct, t), None);
        t += step;
    }
    for frame in 1..=5 {
        let result = stabilizer.update(key("G", 4), t);
        if frame < 5 {
            assert_eq!(result, None, "published early at frame {}", frame);
        } else {
            assert_eq!(result, Some(key("G", 4)));
        }
        t += step;
    }
    assert!(t < STARTUP_WINDOW);
}

#[test]
fn steady_state_switches_after_two_frames() {
    let mut stabilizer = NoteStabilizer::new();
    let t = STARTUP_WINDOW + Duration::from_millis(1);

    stabilizer.update(key("A", 2), t);
    assert_eq!(stabilizer.update(key("A", 2), t), Some(key("A", 2)));

    // One frame of a new note keeps the old one on display.
    assert_eq!(stabilizer.update(key("D", 3), t), None);
    assert_eq!(stabilizer.accepted(), Some(key("A", 2)));
    assert_eq!(stabilizer.update(key("D", 3), t), Some(key("D", 3)));
    assert_eq!(stabilizer.accepted(), Some(key("D", 3)));
}

#[test]
fn startup_threshold_applies_to_switching_too() {
    let mut stabilizer = NoteStabilizer::new();
    let t = Duration::from_millis(100);
    for _ in 0..5 {
        stabilizer.update(key("A", 2), t);
    }
    assert_eq!(stabilizer.accepted(), Some(key("A", 2)));
    for _ in 0..4 {
        assert_eq!(stabilizer.update(key("E", 2), t), None);
    }
    assert_eq!(stabilizer.update(key("E", 2), t), Some(key("E", 2)));
}

#[test]
fn required_frames_follow_session_age() {
    assert_eq!(NoteStabilizer::required_frames(Duration::ZERO), 5);
    assert_eq!(NoteStabilizer::required_frames(Duration::from_millis(1199)), 5);
    assert_eq!(NoteStabilizer::required_frames(STARTUP_WINDOW), 2);
}
