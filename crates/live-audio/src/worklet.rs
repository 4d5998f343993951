//! Processing run inside the capture callback on the audio thread.

use crate::{backend::InputCallback, meter, pcm};
use live_core::MediaChunk;
use tokio::sync::mpsc;

/// Samples per emitted PCM16 frame.
pub const FRAME_SAMPLES: usize = 2048;

#[derive(Debug, Clone, PartialEq)]
pub enum CaptureEvent {
    /// One base64 PCM16 frame ready to send.
    Data(MediaChunk),
    /// Volume of the last capture buffer.
    Volume(f32),
}

/// Accumulates samples and cuts them into fixed-length PCM16 frames.
pub struct Pcm16Encoder {
    sample_rate: u32,
    buffer: Vec<f32>,
}

impl Pcm16Encoder {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            buffer: Vec::with_capacity(FRAME_SAMPLES),
        }
    }

    /// Feeds samples and calls `emit` for each completed frame.
    pub fn push(&mut self, mut samples: &[f32], mut emit: impl FnMut(MediaChunk)) {
        while !samples.is_empty() {
            let take = (FRAME_SAMPLES - self.buffer.len()).min(samples.len());
            self.buffer.extend_from_slice(&samples[..take]);
            samples = &samples[take..];
            if self.buffer.len() == FRAME_SAMPLES {
                emit(MediaChunk::pcm16(
                    self.sample_rate,
                    &pcm::f32_to_pcm16(&self.buffer),
                ));
                self.buffer.clear();
            }
        }
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

/// Builds the capture callback: a volume sample per buffer and a data
/// event per full frame, both sent without blocking.
pub fn capture_worklet(
    sample_rate: u32,
    events: mpsc::UnboundedSender<CaptureEvent>,
) -> InputCallback {
    let mut encoder = Pcm16Encoder::new(sample_rate);
    Box::new(move |samples: &[f32]| {
        let _ = events.send(CaptureEvent::Volume(meter::volume(samples)));
        encoder.push(samples, |chunk| {
            let _ = events.send(CaptureEvent::Data(chunk));
        });
    })
}
