//! Audio capture and playback pipelines for live sessions.
//!
//! Every platform stream lives on the thread of an [`AudioContext`]. The
//! [`AudioRecorder`] turns microphone input into base64 PCM16 frames and
//! volume samples; the [`AudioStreamer`] schedules inbound PCM16 chunks
//! back to back on an output device and can be flushed on interruption.
//! Audio callbacks never block: they talk to the control side through
//! lock-free ring buffers, atomics and unbounded channels.

pub mod backend;
pub mod context;
#[cfg(feature = "cpal")]
pub mod cpal_backend;
pub mod fake;
pub mod meter;
pub mod pcm;
pub mod recorder;
pub mod streamer;
pub mod worklet;

pub use backend::{ActiveStream, AudioBackend, InputCallback, OutputCallback};
pub use context::{AudioContext, AudioContextManager, PendingStream, StreamId};
#[cfg(feature = "cpal")]
pub use cpal_backend::CpalBackend;
pub use fake::{FakeBackend, InputGate};
pub use pcm::{CAPTURE_SAMPLE_RATE, PLAYBACK_SAMPLE_RATE};
pub use recorder::{AudioRecorder, RecorderStatus};
pub use streamer::AudioStreamer;
pub use worklet::CaptureEvent;
