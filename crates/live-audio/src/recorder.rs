use crate::{
    context::{AudioContext, StreamId},
    worklet::{CaptureEvent, capture_worklet},
};
use live_core::Result;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderStatus {
    Idle,
    Starting(StreamId),
    Recording(StreamId),
}

/// Microphone capture producing PCM16 frames and volume samples.
///
/// Events are delivered on the receiver returned by [`AudioRecorder::new`]
/// for as long as the recorder is running.
pub struct AudioRecorder {
    context: Arc<AudioContext>,
    events: mpsc::UnboundedSender<CaptureEvent>,
    status: Mutex<RecorderStatus>,
}

impl AudioRecorder {
    pub fn new(context: Arc<AudioContext>) -> (Self, mpsc::UnboundedReceiver<CaptureEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let recorder = Self {
            context,
            events,
            status: Mutex::new(RecorderStatus::Idle),
        };
        (recorder, rx)
    }

    pub fn sample_rate(&self) -> u32 {
        self.context.sample_rate()
    }

    pub fn status(&self) -> RecorderStatus {
        *self.status.lock()
    }

    pub fn is_recording(&self) -> bool {
        matches!(self.status(), RecorderStatus::Recording(_))
    }

    /// Opens the microphone and starts emitting [`CaptureEvent`]s.
    ///
    /// Suspends until the device is open. Fails with `LiveError::Permission`
    /// or `LiveError::Unsupported`. If [`AudioRecorder::stop`] is called
    /// meanwhile, the microphone is released right after it opens and this
    /// still returns `Ok`.
    pub async fn start(&self) -> Result<()> {
        let pending = {
            let mut status = self.status.lock();
            if *status != RecorderStatus::Idle {
                debug!("Recorder already started.");
                return Ok(());
            }
            let worklet = capture_worklet(self.context.sample_rate(), self.events.clone());
            let pending = self.context.open_input(worklet);
            *status = RecorderStatus::Starting(pending.id());
            pending
        };
        let stream = pending.id();

        let opened = pending.wait().await;
        let mut status = self.status.lock();
        let current = *status == RecorderStatus::Starting(stream);
        match opened {
            Ok(_) if current => {
                *status = RecorderStatus::Recording(stream);
                info!(
                    context_id = self.context.id(),
                    sample_rate = self.context.sample_rate(),
                    "Recording started."
                );
                Ok(())
            }
            Ok(_) => {
                debug!(stream, "Recorder stopped while starting.");
                Ok(())
            }
            Err(e) => {
                if current {
                    *status = RecorderStatus::Idle;
                }
                Err(e)
            }
        }
    }

    /// Releases the microphone. Safe to call at any time, any number of times.
    pub fn stop(&self) {
        let previous = std::mem::replace(&mut *self.status.lock(), RecorderStatus::Idle);
        match previous {
            RecorderStatus::Idle => {}
            RecorderStatus::Starting(stream) | RecorderStatus::Recording(stream) => {
                self.context.close_stream(stream);
                info!(context_id = self.context.id(), "Recording stopped.");
            }
        }
    }
}

impl Drop for AudioRecorder {
    fn drop(&mut self) {
        self.stop();
    }
}
