//! # Audio Capture Module
//!
//! This module handles real-time audio capture using CPAL (Cross-Platform Audio Library).
//! The input callback only forwards raw chunks over a channel; the detection loop keeps
//! a sliding window of the most recent samples and analyses it once per tick.
//!
//! ## Features
//! - Automatic audio device selection, preferring mono 32-bit float input
//! - Downmixing of multi-channel input to mono
//! - Suspend/resume of the input stream for background transitions
//! - [`AudioInput`] seam so sessions can be driven without hardware

use anyhow::{Context, anyhow};
use cpal::SupportedStreamConfigRange;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::Sender;
use std::collections::VecDeque;

use crate::error::{Result, TunerError};

/// Default number of samples analysed per frame.
///
/// Long enough to hold several periods of the lowest supported pitch.
pub const DEFAULT_BUFFER_SIZE: usize = 16384;

/// Preferred capture sample rate.
pub const TARGET_SAMPLE_RATE: u32 = 44100;

/// One analysis frame: a snapshot of the most recent samples.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioFrame {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }
}

/// Sliding window over the most recent captured samples.
#[derive(Debug, Clone)]
pub struct SampleWindow {
    samples: VecDeque<f32>,
    capacity: usize,
}

impl SampleWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends a chunk, discarding the oldest samples beyond capacity.
    pub fn push(&mut self, chunk: &[f32]) {
        let chunk = if chunk.len() > self.capacity {
            &chunk[chunk.len() - self.capacity..]
        } else {
            chunk
        };
        let overflow = (self.samples.len() + chunk.len()).saturating_sub(self.capacity);
        self.samples.drain(..overflow);
        self.samples.extend(chunk.iter().copied());
    }

    pub fn is_full(&self) -> bool {
        self.samples.len() == self.capacity
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// A frame of exactly `capacity` samples, once enough have arrived.
    pub fn frame(&self, sample_rate: u32) -> Option<AudioFrame> {
        self.is_full()
            .then(|| AudioFrame::new(self.samples.iter().copied().collect(), sample_rate))
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

/// A source of captured audio owned by a tuner session.
///
/// `open` starts delivering mono chunks to `sender` and returns the capture
/// sample rate. `close` must release the device; calling it twice is harmless.
pub trait AudioInput {
    fn open(&mut self, sender: Sender<Vec<f32>>) -> Result<u32>;
    fn close(&mut self);
    fn suspend(&mut self) -> Result<()>;
    fn resume(&mut self) -> Result<()>;
}

/// Microphone capture from the default input device.
#[derive(Default)]
pub struct CpalInput {
    stream: Option<cpal::Stream>,
}

impl CpalInput {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AudioInput for CpalInput {
    fn open(&mut self, sender: Sender<Vec<f32>>) -> Result<u32> {
        self.close();
        let (stream, sample_rate) = start_audio_capture(sender)
            .map_err(|e| TunerError::from_input_failure(format!("{:#}", e)))?;
        self.stream = Some(stream);
        Ok(sample_rate)
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.pause() {
                log::warn!("[AUDIO] Error pausing input stream: {}", e);
            }
            drop(stream);
            log::info!("[AUDIO] Input stream released");
        }
    }

    fn suspend(&mut self) -> Result<()> {
        match &self.stream {
            Some(stream) => stream
                .pause()
                .map_err(|e| TunerError::TransientAudioInterruption(e.to_string())),
            None => Ok(()),
        }
    }

    fn resume(&mut self) -> Result<()> {
        match &self.stream {
            Some(stream) => stream
                .play()
                .map_err(|e| TunerError::TransientAudioInterruption(e.to_string())),
            None => Ok(()),
        }
    }
}

impl Drop for CpalInput {
    fn drop(&mut self) {
        self.close();
    }
}

/// Starts audio capture from the default input device.
///
/// This function:
/// 1. Selects the default audio input device
/// 2. Picks the closest f32 configuration to [`TARGET_SAMPLE_RATE`], mono if possible
/// 3. Sets up a callback that downmixes each chunk and forwards it to `sender`
///
/// # Returns
/// * `Ok((stream, sample_rate))` - Audio stream handle and sample rate
/// * `Err(e)` - Error if audio setup fails
fn start_audio_capture(sender: Sender<Vec<f32>>) -> anyhow::Result<(cpal::Stream, u32)> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| anyhow!("No input device available"))?;

    log::info!(
        "[AUDIO] Using audio input device: {}",
        device.name().unwrap_or_else(|_| "<unnamed>".into())
    );

    let configs = device
        .supported_input_configs()
        .context("querying input configurations")?
        .collect::<Vec<_>>();
    let supported_config = find_supported_config(configs, TARGET_SAMPLE_RATE)
        .ok_or_else(|| anyhow!("No suitable f32 input format found"))?;

    let rate = TARGET_SAMPLE_RATE.clamp(
        supported_config.min_sample_rate().0,
        supported_config.max_sample_rate().0,
    );
    let config = supported_config.with_sample_rate(cpal::SampleRate(rate));
    let sample_rate = config.sample_rate().0;
    let channels = config.channels() as usize;
    let config: cpal::StreamConfig = config.into();

    log::info!(
        "[AUDIO] Selected sample rate: {} Hz, {} channel(s)",
        sample_rate,
        channels
    );

    let err_fn = |err| log::error!("[AUDIO] An error occurred on the input stream: {}", err);

    let stream = device
        .build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                let chunk = if channels == 1 {
                    data.to_vec()
                } else {
                    downmix(data, channels)
                };
                // A full channel means the loop is behind; dropping is fine
                // because only the most recent window is analysed.
                let _ = sender.try_send(chunk);
            },
            err_fn,
            None,
        )
        .context("building input stream")?;

    stream.play().context("starting input stream")?;

    Ok((stream, sample_rate))
}

/// Averages interleaved channels into one.
pub fn downmix(data: &[f32], channels: usize) -> Vec<f32> {
    data.chunks(channels.max(1))
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

/// Finds the best supported audio configuration for the target sample rate.
///
/// Only 32-bit float formats are considered. Mono wins over multi-channel,
/// then the range closest to `target_rate`.
fn find_supported_config(
    configs: Vec<SupportedStreamConfigRange>,
    target_rate: u32,
) -> Option<SupportedStreamConfigRange> {
    configs
        .into_iter()
        .filter(|c| c.sample_format() == cpal::SampleFormat::F32)
        .min_by_key(|c| {
            let covers = (c.min_sample_rate().0..=c.max_sample_rate().0).contains(&target_rate);
            let rate_diff = if covers {
                0
            } else {
                let min_diff = (c.min_sample_rate().0 as i64 - target_rate as i64).abs();
                let max_diff = (c.max_sample_rate().0 as i64 - target_rate as i64).abs();
                min_diff.min(max_diff)
            };
            (c.channels() != 1, rate_diff)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_keeps_most_recent_samples() {
        let mut window = SampleWindow::new(4);
        window.push(&[1.0, 2.0, 3.0]);
        assert!(window.frame(8000).is_none());
        window.push(&[4.0, 5.0]);
        let frame = window.frame(8000).unwrap();
        assert_eq!(frame.samples, vec![2.0, 3.0, 4.0, 5.0]);
        assert_eq!(frame.sample_rate, 8000);
    }

    #[test]
    fn oversized_chunk_is_truncated() {
        let mut window = SampleWindow::new(3);
        window.push(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(window.frame(1).unwrap().samples, vec![3.0, 4.0, 5.0]);
    }

    #[test]
    fn downmix_averages_channels() {
        assert_eq!(downmix(&[1.0, 0.0, 0.5, 0.5], 2), vec![0.5, 0.5]);
    }
}
