use std::sync::atomic::{AtomicU32, Ordering};

/// Gain applied to the RMS before clamping. Speech rarely exceeds 0.2 RMS.
pub const VOLUME_SCALE: f32 = 5.0;

/// Volume of one analysis buffer in `[0, 1]`.
pub fn volume(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|&x| x * x).sum();
    let rms = (sum / samples.len() as f32).sqrt();
    (rms * VOLUME_SCALE).clamp(0.0, 1.0)
}

/// Latest volume sample, shared lock-free with an audio callback.
#[derive(Debug, Default)]
pub struct VolumeLevel(AtomicU32);

impl VolumeLevel {
    pub fn store(&self, volume: f32) {
        self.0.store(volume.to_bits(), Ordering::Relaxed);
    }

    pub fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }
}
