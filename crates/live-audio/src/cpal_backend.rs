//! Audio backend on the platform's default devices through `cpal`.

use crate::{
    backend::{ActiveStream, AudioBackend, InputCallback, OutputCallback},
    pcm::{PullResampler, StreamResampler},
};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use live_core::{LiveError, Result};
use tracing::{error, info};

struct CpalStream(#[allow(dead_code)] cpal::Stream);

impl ActiveStream for CpalStream {}

/// Opens the default input and output devices of the default host.
///
/// Both directions run at the device's preferred rate and are resampled
/// to or from the requested one.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalBackend;

impl CpalBackend {
    pub fn new() -> Self {
        Self
    }
}

impl AudioBackend for CpalBackend {
    fn open_input(
        &self,
        sample_rate: u32,
        mut callback: InputCallback,
    ) -> Result<Box<dyn ActiveStream>> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| LiveError::unsupported("no input device available"))?;
        let supported = device.default_input_config().map_err(|e| match e {
            cpal::DefaultStreamConfigError::BackendSpecific { err } => {
                LiveError::permission(err.to_string())
            }
            other => LiveError::unsupported(other.to_string()),
        })?;

        let channels = supported.channels() as usize;
        let device_rate = supported.sample_rate().0;
        info!(
            device = %device.name().unwrap_or_default(),
            device_rate,
            channels,
            target_rate = sample_rate,
            "Opening input device."
        );

        let mut resampler = if device_rate != sample_rate {
            Some(StreamResampler::new(device_rate, sample_rate)?)
        } else {
            None
        };
        let mut deliver = move |mono: &[f32]| match &mut resampler {
            Some(resampler) => {
                let resampled = resampler.process(mono);
                if !resampled.is_empty() {
                    callback(&resampled);
                }
            }
            None => callback(mono),
        };

        let config: cpal::StreamConfig = supported.clone().into();
        let mut mono = Vec::new();
        let stream = match supported.sample_format() {
            cpal::SampleFormat::F32 => device.build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    mono.clear();
                    mono.extend(
                        data.chunks(channels)
                            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32),
                    );
                    deliver(&mono);
                },
                |e| error!("Input stream error: {}", e),
                None,
            ),
            cpal::SampleFormat::I16 => device.build_input_stream(
                &config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    mono.clear();
                    mono.extend(data.chunks(channels).map(|frame| {
                        frame.iter().map(|&s| s as f32 / 32768.0).sum::<f32>() / frame.len() as f32
                    }));
                    deliver(&mono);
                },
                |e| error!("Input stream error: {}", e),
                None,
            ),
            other => {
                return Err(LiveError::unsupported(format!(
                    "unsupported input sample format {other:?}"
                )));
            }
        }
        .map_err(build_error)?;

        stream
            .play()
            .map_err(|e| LiveError::unsupported(e.to_string()))?;
        Ok(Box::new(CpalStream(stream)))
    }

    fn open_output(
        &self,
        sample_rate: u32,
        mut callback: OutputCallback,
    ) -> Result<Box<dyn ActiveStream>> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| LiveError::unsupported("no output device available"))?;
        let supported = device
            .default_output_config()
            .map_err(|e| LiveError::unsupported(e.to_string()))?;

        // Many devices reject mono, so keep the device's channel count and duplicate.
        let channels = supported.channels() as usize;
        let device_rate = supported.sample_rate().0;
        let config = cpal::StreamConfig {
            channels: supported.channels(),
            sample_rate: supported.sample_rate(),
            buffer_size: cpal::BufferSize::Default,
        };
        info!(
            device = %device.name().unwrap_or_default(),
            device_rate,
            channels,
            source_rate = sample_rate,
            "Opening output device."
        );

        let mut resampler = if device_rate != sample_rate {
            Some(PullResampler::new(sample_rate, device_rate)?)
        } else {
            None
        };
        let mut mono = Vec::new();
        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    mono.resize(data.len() / channels, 0.0);
                    match &mut resampler {
                        Some(resampler) => resampler.fill(&mut mono, &mut callback),
                        None => callback(&mut mono),
                    }
                    for (frame, &sample) in data.chunks_mut(channels).zip(mono.iter()) {
                        frame.fill(sample);
                    }
                },
                |e| error!("Output stream error: {}", e),
                None,
            )
            .map_err(build_error)?;

        stream
            .play()
            .map_err(|e| LiveError::unsupported(e.to_string()))?;
        Ok(Box::new(CpalStream(stream)))
    }
}

fn build_error(e: cpal::BuildStreamError) -> LiveError {
    match e {
        cpal::BuildStreamError::BackendSpecific { err } => LiveError::permission(err.to_string()),
        other => LiveError::unsupported(other.to_string()),
    }
}
