//! Signal generators and scripted devices shared by the integration tests.
#![allow(dead_code)]

use crossbeam_channel::Sender;
use std::sync::{Arc, Mutex};
use tuner_core::error::{Result, TunerError};
use tuner_core::synth::SharedSynth;
use tuner_core::{AudioInput, AudioOutput};

pub const SAMPLE_RATE: u32 = 44100;

pub fn sine(freq: f32, sample_rate: u32, len: usize, amplitude: f32) -> Vec<f32> {
    (0..len)
        .map(|i| {
            amplitude * (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate as f32).sin()
        })
        .collect()
}

#[derive(Default)]
struct InputState {
    sender: Option<Sender<Vec<f32>>>,
    opens: usize,
    closes: usize,
    fail_open: Option<TunerError>,
    fail_resume: bool,
}

/// Test-side handle onto a [`ScriptedInput`].
#[derive(Clone, Default)]
pub struct InputProbe(Arc<Mutex<InputState>>);

impl InputProbe {
    pub fn push(&self, chunk: &[f32]) {
        let state = self.0.lock().unwrap();
        let sender = state.sender.as_ref().expect("input is not open");
        sender.send(chunk.to_vec()).unwrap();
    }

    pub fn opens(&self) -> usize {
        self.0.lock().unwrap().opens
    }

    pub fn closes(&self) -> usize {
        self.0.lock().unwrap().closes
    }

    pub fn is_open(&self) -> bool {
        self.0.lock().unwrap().sender.is_some()
    }

    pub fn fail_next_open(&self, error: TunerError) {
        self.0.lock().unwrap().fail_open = Some(error);
    }

    pub fn fail_resume(&self) {
        self.0.lock().unwrap().fail_resume = true;
    }
}

/// An input whose audio is pushed by the test.
pub struct ScriptedInput {
    probe: InputProbe,
    sample_rate: u32,
}

impl ScriptedInput {
    pub fn new(sample_rate: u32) -> (Self, InputProbe) {
        let probe = InputProbe::default();
        (
            Self {
                probe: probe.clone(),
                sample_rate,
            },
            probe,
        )
    }
}

impl AudioInput for ScriptedInput {
    fn open(&mut self, sender: Sender<Vec<f32>>) -> Result<u32> {
        let mut state = self.probe.0.lock().unwrap();
        if let Some(error) = state.fail_open.take() {
            return Err(error);
        }
        state.sender = Some(sender);
        state.opens += 1;
        Ok(self.sample_rate)
    }

    fn close(&mut self) {
        let mut state = self.probe.0.lock().unwrap();
        if state.sender.take().is_some() {
            state.closes += 1;
        }
    }

    fn suspend(&mut self) -> Result<()> {
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        if self.probe.0.lock().unwrap().fail_resume {
            Err(TunerError::TransientAudioInterruption("device gone".into()))
        } else {
            Ok(())
        }
    }
}

/// An output that records how often it was opened and renders nothing.
#[derive(Clone, Default)]
pub struct NullOutput {
    opens: Arc<Mutex<usize>>,
    open: bool,
}

impl NullOutput {
    pub fn opens(&self) -> usize {
        *self.opens.lock().unwrap()
    }
}

impl AudioOutput for NullOutput {
    fn open(&mut self, _synth: SharedSynth) -> Result<u32> {
        if !self.open {
            *self.opens.lock().unwrap() += 1;
            self.open = true;
        }
        Ok(48000)
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn suspend(&mut self) -> Result<()> {
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) {
        self.open = false;
    }
}
