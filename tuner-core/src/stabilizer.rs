//! # Note Stabilizer Module
//!
//! Locks the displayed note only after it has been heard for several
//! consecutive frames, so attack transients and brief misreads never make
//! the note name flicker.

use crate::tuning::NoteKey;
use std::time::Duration;

/// Start-up period during which more frames are required.
pub const STARTUP_WINDOW: Duration = Duration::from_millis(1200);
pub const STARTUP_REQUIRED_FRAMES: u32 = 5;
pub const STEADY_REQUIRED_FRAMES: u32 = 2;

/// Where the stabilizer currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    NoCandidate,
    Candidating { key: NoteKey, frames: u32 },
    Accepted(NoteKey),
}

/// Note-lock hysteresis filter, scoped to one listening session.
#[derive(Debug, Clone, Default)]
pub struct NoteStabilizer {
    candidate: Option<(NoteKey, u32)>,
    accepted: Option<NoteKey>,
}

impl NoteStabilizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames a candidate must persist for at `elapsed` into the session.
    pub fn required_frames(elapsed: Duration) -> u32 {
        if elapsed < STARTUP_WINDOW {
            STARTUP_REQUIRED_FRAMES
        } else {
            STEADY_REQUIRED_FRAMES
        }
    }

    /// Feeds the note heard in this frame.
    ///
    /// Returns the note to display, or `None` when the displayed note should
    /// not change this frame.
    pub fn update(&mut self, key: NoteKey, elapsed: Duration) -> Option<NoteKey> {
        let frames = match self.candidate {
            Some((candidate, frames)) if candidate == key => frames + 1,
            _ => 1,
        };
        self.candidate = Some((key, frames));

        if self.accepted == Some(key) {
            return self.accepted;
        }
        if frames >= Self::required_frames(elapsed) {
            if let Some(previous) = self.accepted {
                log::debug!(
                    "[STABILIZER] Switching {}{} -> {}{} after {} frames",
                    previous.note,
                    previous.octave,
                    key.note,
                    key.octave,
                    frames
                );
            }
            self.accepted = Some(key);
            return self.accepted;
        }
        None
    }

    /// Replaces the accepted note without candidacy, e.g. after the
    /// reference pitch changed under a note already on display.
    pub fn force_accept(&mut self, key: NoteKey) {
        self.accepted = Some(key);
        self.candidate = Some((key, STARTUP_REQUIRED_FRAMES));
    }

    pub fn accepted(&self) -> Option<NoteKey> {
        self.accepted
    }

    pub fn state(&self) -> LockState {
        match (self.candidate, self.accepted) {
            (Some((key, frames)), accepted) if accepted != Some(key) => {
                LockState::Candidating { key, frames }
            }
            (_, Some(accepted)) => LockState::Accepted(accepted),
            _ => LockState::NoCandidate,
        }
    }

    pub fn reset(&mut self) {
        self.candidate = None;
        self.accepted = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A4: NoteKey = NoteKey { note: "A", octave: 4 };
    const E4: NoteKey = NoteKey { note: "E", octave: 4 };

    #[test]
    fn starts_without_candidate() {
        assert_eq!(NoteStabilizer::new().state(), LockState::NoCandidate);
    }

    #[test]
    fn candidacy_is_reported() {
        let mut stabilizer = NoteStabilizer::new();
        stabilizer.update(A4, Duration::ZERO);
        stabilizer.update(A4, Duration::ZERO);
        assert_eq!(
            stabilizer.state(),
            LockState::Candidating { key: A4, frames: 2 }
        );
    }

    #[test]
    fn accepted_note_keeps_reporting() {
        let mut stabilizer = NoteStabilizer::new();
        let later = STARTUP_WINDOW;
        assert_eq!(stabilizer.update(A4, later), None);
        assert_eq!(stabilizer.update(A4, later), Some(A4));
        assert_eq!(stabilizer.update(A4, later), Some(A4));
        assert_eq!(stabilizer.state(), LockState::Accepted(A4));
    }

    #[test]
    fn interrupted_candidate_starts_over() {
        let mut stabilizer = NoteStabilizer::new();
        let later = STARTUP_WINDOW * 2;
        stabilizer.update(A4, later);
        stabilizer.update(A4, later);
        assert_eq!(stabilizer.update(E4, later), None);
        // A4 is still accepted; one stray E4 frame did not replace it.
        assert_eq!(stabilizer.accepted(), Some(A4));
        assert_eq!(stabilizer.update(A4, later), Some(A4));
    }

    #[test]
    fn reset_forgets_everything() {
        let mut stabilizer = NoteStabilizer::new();
        stabilizer.force_accept(A4);
        stabilizer.reset();
        assert_eq!(stabilizer.state(), LockState::NoCandidate);
    }
}
