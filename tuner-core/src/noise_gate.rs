//! # Noise Gate Module
//!
//! Decides whether a frame is loud enough to be worth analysing. The
//! threshold adapts to the ambient noise heard during the first moments of a
//! session, within a fixed corridor so it can never become too sensitive or
//! too permissive.

use std::collections::VecDeque;
use std::time::Duration;

/// Lowest threshold the gate will ever use.
pub const BASE_FLOOR: f32 = 0.01;
/// Highest threshold the gate will ever use.
pub const STATIC_CEILING: f32 = 0.05;
/// Multiplier applied to the median ambient RMS.
pub const NOISE_MULTIPLIER: f32 = 2.2;
/// Maximum number of ambient RMS samples kept.
pub const NOISE_WINDOW: usize = 40;
/// Ambient noise is only sampled during this part of a session.
pub const COLLECTION_WINDOW: Duration = Duration::from_millis(2400);

/// Root mean square of a buffer; zero for an empty buffer.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    (samples.iter().map(|&s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
}

/// Adaptive RMS gate.
#[derive(Debug, Clone, Default)]
pub struct NoiseGate {
    noise_samples: VecDeque<f32>,
    frozen_threshold: Option<f32>,
}

impl NoiseGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` when the frame should be skipped.
    ///
    /// `elapsed` is the time since the session started. While it is inside
    /// [`COLLECTION_WINDOW`] every frame's RMS is recorded, gated or not.
    pub fn should_gate(&mut self, samples: &[f32], elapsed: Duration) -> bool {
        let level = rms(samples);
        if elapsed < COLLECTION_WINDOW {
            if self.noise_samples.len() == NOISE_WINDOW {
                self.noise_samples.pop_front();
            }
            self.noise_samples.push_back(level);
        } else if self.frozen_threshold.is_none() {
            let threshold = self.compute_threshold();
            log::debug!(
                "[GATE] Freezing threshold at {:.4} from {} ambient samples",
                threshold,
                self.noise_samples.len()
            );
            self.frozen_threshold = Some(threshold);
        }
        level < self.threshold()
    }

    /// The threshold currently in force.
    pub fn threshold(&self) -> f32 {
        self.frozen_threshold
            .unwrap_or_else(|| self.compute_threshold())
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen_threshold.is_some()
    }

    /// Number of ambient samples collected so far.
    pub fn sample_count(&self) -> usize {
        self.noise_samples.len()
    }

    pub fn reset(&mut self) {
        self.noise_samples.clear();
        self.frozen_threshold = None;
    }

    fn compute_threshold(&self) -> f32 {
        match median(self.noise_samples.iter().copied()) {
            Some(ambient) => (ambient * NOISE_MULTIPLIER)
                .min(STATIC_CEILING)
                .max(BASE_FLOOR),
            None => BASE_FLOOR,
        }
    }
}

/// Median of the values, averaging the middle pair for even counts.
pub(crate) fn median(values: impl Iterator<Item = f32>) -> Option<f32> {
    let mut sorted: Vec<f32> = values.collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constant(level: f32) -> Vec<f32> {
        vec![level; 256]
    }

    #[test]
    fn empty_window_uses_floor() {
        let gate = NoiseGate::new();
        assert_eq!(gate.threshold(), BASE_FLOOR);
    }

    #[test]
    fn quiet_room_keeps_floor() {
        let mut gate = NoiseGate::new();
        assert!(gate.should_gate(&constant(0.001), Duration::from_millis(100)));
        assert_eq!(gate.threshold(), BASE_FLOOR);
        assert!(!gate.should_gate(&constant(0.2), Duration::from_millis(200)));
    }

    #[test]
    fn loud_room_is_capped_by_ceiling() {
        let mut gate = NoiseGate::new();
        for i in 0..10 {
            gate.should_gate(&constant(0.3), Duration::from_millis(i * 50));
        }
        assert_eq!(gate.threshold(), STATIC_CEILING);
    }

    #[test]
    fn threshold_tracks_moderate_noise() {
        let mut gate = NoiseGate::new();
        for i in 0..5 {
            gate.should_gate(&constant(0.015), Duration::from_millis(i * 50));
        }
        assert!((gate.threshold() - 0.033).abs() < 1e-4);
        // A level between floor and adaptive threshold is gated.
        assert!(gate.should_gate(&constant(0.02), Duration::from_millis(300)));
    }

    #[test]
    fn window_is_bounded_and_freezes() {
        let mut gate = NoiseGate::new();
        for i in 0..60 {
            gate.should_gate(&constant(0.001), Duration::from_millis(i * 20));
        }
        assert_eq!(gate.sample_count(), NOISE_WINDOW);
        assert!(!gate.is_frozen());

        gate.should_gate(&constant(0.5), COLLECTION_WINDOW);
        assert!(gate.is_frozen());
        let frozen = gate.threshold();
        gate.should_gate(&constant(0.5), COLLECTION_WINDOW + Duration::from_secs(1));
        assert_eq!(gate.threshold(), frozen);
        assert_eq!(gate.sample_count(), NOISE_WINDOW);
    }

    #[test]
    fn median_of_even_count() {
        assert_eq!(median([4.0, 1.0, 3.0, 2.0].into_iter()), Some(2.5));
        assert_eq!(median(std::iter::empty()), None);
    }
}
