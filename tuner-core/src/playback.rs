//! # Reference Tone Playback
//!
//! Output side of the tuner. Reference tones are rendered by a cpal output
//! stream that is entirely separate from the capture stream, so starting or
//! stopping the microphone never cuts off a tone in flight.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SizedSample};

use crate::error::{Result, TunerError};
use crate::synth::SharedSynth;

/// A sink that renders a [`SharedSynth`].
///
/// `open` is called lazily before the first tone and returns the output
/// sample rate; it is a no-op when the sink is already open.
pub trait AudioOutput {
    fn open(&mut self, synth: SharedSynth) -> Result<u32>;
    fn is_open(&self) -> bool;
    fn suspend(&mut self) -> Result<()>;
    fn resume(&mut self) -> Result<()>;
    fn close(&mut self);
}

/// Playback on the default output device.
#[derive(Default)]
pub struct CpalOutput {
    stream: Option<(cpal::Stream, u32)>,
}

impl CpalOutput {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AudioOutput for CpalOutput {
    fn open(&mut self, synth: SharedSynth) -> Result<u32> {
        if let Some((_, sample_rate)) = &self.stream {
            return Ok(*sample_rate);
        }
        let (stream, sample_rate) = start_playback(synth)?;
        self.stream = Some((stream, sample_rate));
        Ok(sample_rate)
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    fn suspend(&mut self) -> Result<()> {
        match &self.stream {
            Some((stream, _)) => stream
                .pause()
                .map_err(|e| TunerError::TransientAudioInterruption(e.to_string())),
            None => Ok(()),
        }
    }

    fn resume(&mut self) -> Result<()> {
        match &self.stream {
            Some((stream, _)) => stream
                .play()
                .map_err(|e| TunerError::TransientAudioInterruption(e.to_string())),
            None => Ok(()),
        }
    }

    fn close(&mut self) {
        if let Some((stream, _)) = self.stream.take() {
            if let Err(e) = stream.pause() {
                log::warn!("[PLAYBACK] Error pausing output stream: {}", e);
            }
            log::info!("[PLAYBACK] Output stream released");
        }
    }
}

impl Drop for CpalOutput {
    fn drop(&mut self) {
        self.close();
    }
}

/// Opens the default output device and starts rendering `synth` into it.
fn start_playback(synth: SharedSynth) -> Result<(cpal::Stream, u32)> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| TunerError::OutputUnavailable("No output device available".into()))?;
    let supported = device
        .default_output_config()
        .map_err(|e| TunerError::OutputUnavailable(e.to_string()))?;

    let sample_rate = supported.sample_rate().0;
    let sample_format = supported.sample_format();
    let config: cpal::StreamConfig = supported.into();
    log::info!(
        "[PLAYBACK] Using output device {} at {} Hz ({:?})",
        device.name().unwrap_or_else(|_| "<unnamed>".into()),
        sample_rate,
        sample_format
    );

    let stream = match sample_format {
        cpal::SampleFormat::F32 => build_stream::<f32>(&device, &config, synth),
        cpal::SampleFormat::I16 => build_stream::<i16>(&device, &config, synth),
        cpal::SampleFormat::U16 => build_stream::<u16>(&device, &config, synth),
        other => {
            return Err(TunerError::OutputUnavailable(format!(
                "unsupported output sample format {:?}",
                other
            )));
        }
    }
    .map_err(|e| TunerError::OutputUnavailable(e.to_string()))?;

    stream
        .play()
        .map_err(|e| TunerError::OutputUnavailable(e.to_string()))?;
    Ok((stream, sample_rate))
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    synth: SharedSynth,
) -> std::result::Result<cpal::Stream, cpal::BuildStreamError>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = config.channels as usize;
    let mut scratch: Vec<f32> = Vec::new();
    device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            scratch.resize(data.len(), 0.0);
            match synth.lock() {
                Ok(mut synth) => synth.render(&mut scratch, channels),
                Err(_) => scratch.fill(0.0),
            }
            for (out, &value) in data.iter_mut().zip(&scratch) {
                *out = T::from_sample(value);
            }
        },
        |err| log::error!("[PLAYBACK] An error occurred on the output stream: {}", err),
        None,
    )
}
