use live_core::{LiveError, Result};
use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use std::collections::VecDeque;
use tracing::warn;

/// Rate of the PCM16 frames sent to the gateway.
pub const CAPTURE_SAMPLE_RATE: u32 = 16000;
/// Rate assumed for inbound PCM16 audio unless configured otherwise.
pub const PLAYBACK_SAMPLE_RATE: u32 = 24000;

/// Creates a mono resampler converting `in_sampling_rate` to `out_sampling_rate`.
pub fn create_resampler(
    in_sampling_rate: u32,
    out_sampling_rate: u32,
    chunk_size: usize,
) -> Result<FastFixedIn<f32>> {
    FastFixedIn::<f32>::new(
        out_sampling_rate as f64 / in_sampling_rate as f64,
        1.0,
        PolynomialDegree::Cubic,
        chunk_size,
        1,
    )
    .map_err(|e| {
        LiveError::unsupported(format!(
            "cannot resample {in_sampling_rate} Hz to {out_sampling_rate} Hz: {e}"
        ))
    })
}

/// Converts normalized samples into little-endian PCM16 bytes.
pub fn f32_to_pcm16(samples: &[f32]) -> Vec<u8> {
    samples
        .iter()
        .flat_map(|&sample| {
            let v = (sample * i16::MAX as f32).clamp(i16::MIN as f32, i16::MAX as f32) as i16;
            v.to_le_bytes()
        })
        .collect()
}

/// Converts little-endian PCM16 bytes into samples in `[-1, 1)`.
/// A trailing odd byte is ignored.
pub fn pcm16_to_f32(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
        .collect()
}

/// Feeds arbitrarily sized buffers through a fixed-input resampler.
pub struct StreamResampler {
    inner: FastFixedIn<f32>,
    pending: Vec<f32>,
}

impl StreamResampler {
    pub fn new(in_sampling_rate: u32, out_sampling_rate: u32) -> Result<Self> {
        // 10 ms of input per resampler call.
        let chunk_size = (in_sampling_rate as usize / 100).max(1);
        Ok(Self {
            inner: create_resampler(in_sampling_rate, out_sampling_rate, chunk_size)?,
            pending: Vec::with_capacity(chunk_size * 2),
        })
    }

    /// Returns every output sample that the buffered input can produce so far.
    pub fn process(&mut self, input: &[f32]) -> Vec<f32> {
        self.pending.extend_from_slice(input);
        let mut output = Vec::new();
        loop {
            let needed = self.inner.input_frames_next();
            if self.pending.len() < needed {
                break;
            }
            let chunk: Vec<f32> = self.pending.drain(..needed).collect();
            match self.inner.process(&[chunk], None) {
                Ok(frames) => {
                    if let Some(channel) = frames.first() {
                        output.extend_from_slice(channel);
                    }
                }
                Err(e) => {
                    warn!("Resampling failed, dropping buffered input: {}", e);
                    self.pending.clear();
                    break;
                }
            }
        }
        output
    }
}

/// Adapts a pull-style source at one rate to a device running at another.
///
/// The device asks for a buffer of samples; the source is pulled in 10 ms
/// blocks at its own rate and the surplus is kept for the next request.
pub struct PullResampler {
    resampler: StreamResampler,
    block: Vec<f32>,
    ready: VecDeque<f32>,
}

impl PullResampler {
    pub fn new(source_rate: u32, device_rate: u32) -> Result<Self> {
        Ok(Self {
            resampler: StreamResampler::new(source_rate, device_rate)?,
            block: vec![0.0; (source_rate as usize / 100).max(1)],
            ready: VecDeque::new(),
        })
    }

    /// Fills `out` with device-rate samples, pulling from `source` as needed.
    pub fn fill(&mut self, out: &mut [f32], source: &mut dyn FnMut(&mut [f32])) {
        let mut stalled = 0;
        while self.ready.len() < out.len() && stalled < 4 {
            self.block.fill(0.0);
            source(&mut self.block);
            let resampled = self.resampler.process(&self.block);
            if resampled.is_empty() {
                stalled += 1;
            }
            self.ready.extend(resampled);
        }

        let available = self.ready.len().min(out.len());
        for (slot, sample) in out.iter_mut().zip(self.ready.drain(..available)) {
            *slot = sample;
        }
        out[available..].fill(0.0);
    }
}
