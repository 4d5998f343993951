use live_core::Result;

/// Receives mono capture buffers on the audio thread.
pub type InputCallback = Box<dyn FnMut(&[f32]) + Send + 'static>;
/// Fills mono output buffers on the audio thread.
pub type OutputCallback = Box<dyn FnMut(&mut [f32]) + Send + 'static>;

/// A running platform stream. Dropping it stops the stream and releases the device.
///
/// Implementations need not be `Send`; they never leave the audio context
/// thread that opened them.
pub trait ActiveStream {}

/// Source of capture and playback streams.
///
/// Callbacks always see mono `f32` samples at the requested `sample_rate`;
/// channel mixing and rate conversion are the backend's job. Opening an
/// input fails with `LiveError::Permission` when the microphone is refused and
/// `LiveError::Unsupported` when no device or API is available.
pub trait AudioBackend: Send + Sync + 'static {
    fn open_input(
        &self,
        sample_rate: u32,
        callback: InputCallback,
    ) -> Result<Box<dyn ActiveStream>>;

    fn open_output(
        &self,
        sample_rate: u32,
        callback: OutputCallback,
    ) -> Result<Box<dyn ActiveStream>>;
}
