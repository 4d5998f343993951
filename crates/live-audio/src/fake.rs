//! In-memory audio backend for running the pipelines without hardware.

use crate::backend::{ActiveStream, AudioBackend, InputCallback, OutputCallback};
use live_core::{LiveError, Result};
use parking_lot::{Condvar, Mutex};
use std::{collections::HashMap, sync::Arc, time::Duration};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Microphone {
    Available,
    Denied,
    Missing,
}

struct Gate {
    open: Mutex<bool>,
    opened: Condvar,
}

impl Gate {
    fn wait(&self) {
        let mut open = self.open.lock();
        while !*open {
            self.opened.wait(&mut open);
        }
    }

    fn release(&self) {
        *self.open.lock() = true;
        self.opened.notify_all();
    }
}

/// Holds every `open_input` on the audio thread until released or dropped.
pub struct InputGate {
    gate: Arc<Gate>,
}

impl InputGate {
    pub fn release(&self) {
        self.gate.release();
    }
}

impl Drop for InputGate {
    fn drop(&mut self) {
        self.gate.release();
    }
}

struct FakeState {
    microphone: Microphone,
    gate: Option<Arc<Gate>>,
    next_id: u64,
    inputs: HashMap<u64, InputCallback>,
    outputs: HashMap<u64, OutputCallback>,
}

/// Backend whose streams are driven by hand: [`FakeBackend::speak`] feeds
/// the open inputs and [`FakeBackend::render`] pulls from the open outputs.
#[derive(Clone)]
pub struct FakeBackend {
    state: Arc<Mutex<FakeState>>,
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeBackend {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeState {
                microphone: Microphone::Available,
                gate: None,
                next_id: 0,
                inputs: HashMap::new(),
                outputs: HashMap::new(),
            })),
        }
    }

    /// Every later `open_input` fails with `LiveError::Permission`.
    pub fn deny_microphone(&self) {
        self.state.lock().microphone = Microphone::Denied;
    }

    /// Every later `open_input` fails with `LiveError::Unsupported`.
    pub fn without_microphone(&self) {
        self.state.lock().microphone = Microphone::Missing;
    }

    pub fn hold_input_open(&self) -> InputGate {
        let gate = Arc::new(Gate {
            open: Mutex::new(false),
            opened: Condvar::new(),
        });
        self.state.lock().gate = Some(gate.clone());
        InputGate { gate }
    }

    pub fn active_inputs(&self) -> usize {
        self.state.lock().inputs.len()
    }

    pub fn active_outputs(&self) -> usize {
        self.state.lock().outputs.len()
    }

    /// Delivers one capture buffer to every open input. Returns how many received it.
    pub fn speak(&self, samples: &[f32]) -> usize {
        let mut state = self.state.lock();
        for callback in state.inputs.values_mut() {
            callback(samples);
        }
        state.inputs.len()
    }

    /// Pulls `frames` samples from every open output and returns their mix.
    pub fn render(&self, frames: usize) -> Vec<f32> {
        let mut mix = vec![0.0; frames];
        let mut buffer = vec![0.0; frames];
        let mut state = self.state.lock();
        for callback in state.outputs.values_mut() {
            buffer.fill(0.0);
            callback(&mut buffer);
            for (m, s) in mix.iter_mut().zip(&buffer) {
                *m += s;
            }
        }
        mix
    }

    /// Polls `condition` for up to two seconds.
    pub async fn wait_until(&self, condition: impl Fn(&FakeBackend) -> bool) -> bool {
        for _ in 0..400 {
            if condition(self) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        condition(self)
    }
}

enum Direction {
    Input,
    Output,
}

struct FakeStream {
    id: u64,
    direction: Direction,
    state: Arc<Mutex<FakeState>>,
}

impl ActiveStream for FakeStream {}

impl Drop for FakeStream {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        match self.direction {
            Direction::Input => drop(state.inputs.remove(&self.id)),
            Direction::Output => drop(state.outputs.remove(&self.id)),
        }
    }
}

impl AudioBackend for FakeBackend {
    fn open_input(
        &self,
        _sample_rate: u32,
        callback: InputCallback,
    ) -> Result<Box<dyn ActiveStream>> {
        let gate = self.state.lock().gate.clone();
        if let Some(gate) = gate {
            gate.wait();
        }

        let mut state = self.state.lock();
        match state.microphone {
            Microphone::Denied => return Err(LiveError::permission("access denied by user")),
            Microphone::Missing => return Err(LiveError::unsupported("no capture device")),
            Microphone::Available => {}
        }
        let id = state.next_id;
        state.next_id += 1;
        state.inputs.insert(id, callback);
        Ok(Box::new(FakeStream {
            id,
            direction: Direction::Input,
            state: self.state.clone(),
        }))
    }

    fn open_output(
        &self,
        _sample_rate: u32,
        callback: OutputCallback,
    ) -> Result<Box<dyn ActiveStream>> {
        let mut state = self.state.lock();
        let id = state.next_id;
        state.next_id += 1;
        state.outputs.insert(id, callback);
        Ok(Box::new(FakeStream {
            id,
            direction: Direction::Output,
            state: self.state.clone(),
        }))
    }
}
