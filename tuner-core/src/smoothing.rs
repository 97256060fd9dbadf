//! # Smoothing Module
//!
//! Temporal smoothing for the displayed reading. Frequency goes through a
//! median filter, a step limiter and an exponential filter; cents get their
//! own exponential filter and a dead zone so an in-tune needle stays still.

use crate::noise_gate::median;
use std::collections::VecDeque;

/// Number of raw frequencies the median is taken over.
pub const HISTORY_LEN: usize = 7;
/// Below this frequency the tighter step limit applies.
pub const LOW_STRING_HZ: f32 = 180.0;
pub const LOW_MAX_STEP_HZ: f32 = 6.0;
pub const HIGH_MAX_STEP_HZ: f32 = 12.0;
pub const SLOW_ALPHA: f32 = 0.12;
pub const FAST_ALPHA: f32 = 0.25;
/// A median jump larger than this switches to [`FAST_ALPHA`].
pub const FAST_TRACK_DELTA_HZ: f32 = 20.0;

pub const CENTS_ALPHA: f32 = 0.22;
/// Rounded cents with magnitude at or below this display as zero.
pub const CENTS_DEAD_ZONE: i32 = 3;

/// Median + rate-limited exponential smoothing of frequency.
#[derive(Debug, Clone, Default)]
pub struct FrequencySmoother {
    history: VecDeque<f32>,
    smoothed: Option<f32>,
}

impl FrequencySmoother {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one raw frequency and returns the smoothed frequency.
    pub fn push(&mut self, frequency: f32) -> f32 {
        if self.history.len() == HISTORY_LEN {
            self.history.pop_front();
        }
        self.history.push_back(frequency);
        let median = median(self.history.iter().copied()).unwrap_or(frequency);

        let next = match self.smoothed {
            None => median,
            Some(previous) => {
                let delta = median - previous;
                let max_step = if previous < LOW_STRING_HZ {
                    LOW_MAX_STEP_HZ
                } else {
                    HIGH_MAX_STEP_HZ
                };
                let limited = previous + delta.clamp(-max_step, max_step);
                let alpha = if delta.abs() > FAST_TRACK_DELTA_HZ {
                    FAST_ALPHA
                } else {
                    SLOW_ALPHA
                };
                previous + alpha * (limited - previous)
            }
        };
        self.smoothed = Some(next);
        next
    }

    pub fn current(&self) -> Option<f32> {
        self.smoothed
    }

    pub fn reset(&mut self) {
        self.history.clear();
        self.smoothed = None;
    }
}

/// Exponential smoothing of cents with a display dead zone.
#[derive(Debug, Clone, Default)]
pub struct CentsSmoother {
    smoothed: Option<f32>,
}

impl CentsSmoother {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds raw cents and returns the value to display.
    pub fn push(&mut self, cents: f32) -> i32 {
        let next = match self.smoothed {
            None => cents,
            Some(previous) => previous + CENTS_ALPHA * (cents - previous),
        };
        self.smoothed = Some(next);
        apply_dead_zone(next)
    }

    pub fn reset(&mut self) {
        self.smoothed = None;
    }
}

/// Rounds, zeroes values inside the dead zone and clamps to ±50.
pub fn apply_dead_zone(cents: f32) -> i32 {
    let rounded = cents.round() as i32;
    if rounded.abs() <= CENTS_DEAD_ZONE {
        0
    } else {
        rounded.clamp(-50, 50)
    }
}
