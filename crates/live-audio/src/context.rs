//! Audio contexts: one thread per context owning its platform streams.

use crate::backend::{ActiveStream, AudioBackend, InputCallback, OutputCallback};
use live_core::{LiveError, Result};
use parking_lot::Mutex;
use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
        mpsc,
    },
    thread,
};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

pub type StreamId = u64;

enum Command {
    OpenInput {
        stream: StreamId,
        callback: InputCallback,
        reply: oneshot::Sender<Result<()>>,
    },
    OpenOutput {
        stream: StreamId,
        callback: OutputCallback,
        reply: oneshot::Sender<Result<()>>,
    },
    Close(StreamId),
    Shutdown,
}

/// A stream requested from an [`AudioContext`] that the audio thread has not
/// confirmed yet. Dropping it without waiting releases the stream once opened.
pub struct PendingStream {
    id: StreamId,
    reply: oneshot::Receiver<Result<()>>,
}

impl PendingStream {
    pub fn id(&self) -> StreamId {
        self.id
    }

    /// Suspends until the device is open.
    pub async fn wait(self) -> Result<StreamId> {
        match self.reply.await {
            Ok(Ok(())) => Ok(self.id),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(LiveError::unsupported("audio context is closed")),
        }
    }
}

/// Handle to a named audio thread running at a fixed sample rate.
///
/// All platform streams are created, owned and dropped on that thread.
/// The handle only sends commands to it and never blocks.
pub struct AudioContext {
    id: String,
    sample_rate: u32,
    commands: mpsc::Sender<Command>,
    next_stream: AtomicU64,
}

impl AudioContext {
    fn spawn(id: &str, sample_rate: u32, backend: Arc<dyn AudioBackend>) -> Result<Self> {
        let (commands, rx) = mpsc::channel();
        let thread_id = id.to_string();
        thread::Builder::new()
            .name(format!("audio-ctx-{id}"))
            .spawn(move || run(thread_id, sample_rate, backend, rx))
            .map_err(|e| LiveError::unsupported(format!("cannot start audio thread: {e}")))?;
        info!(context_id = id, sample_rate, "Audio context started.");
        Ok(Self {
            id: id.to_string(),
            sample_rate,
            commands,
            next_stream: AtomicU64::new(1),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn open_input(&self, callback: InputCallback) -> PendingStream {
        let (reply, rx) = oneshot::channel();
        let stream = self.next_stream.fetch_add(1, Ordering::Relaxed);
        self.send(Command::OpenInput {
            stream,
            callback,
            reply,
        });
        PendingStream {
            id: stream,
            reply: rx,
        }
    }

    pub fn open_output(&self, callback: OutputCallback) -> PendingStream {
        let (reply, rx) = oneshot::channel();
        let stream = self.next_stream.fetch_add(1, Ordering::Relaxed);
        self.send(Command::OpenOutput {
            stream,
            callback,
            reply,
        });
        PendingStream {
            id: stream,
            reply: rx,
        }
    }

    /// Stops and releases a stream. Unknown ids are ignored, and a stream
    /// that is still opening is released as soon as it opens.
    pub fn close_stream(&self, stream: StreamId) {
        self.send(Command::Close(stream));
    }

    /// Stops the audio thread, releasing every stream it still owns.
    pub fn close(&self) {
        self.send(Command::Shutdown);
    }

    fn send(&self, command: Command) {
        // A failed send drops the command, so a pending reply resolves as closed.
        if self.commands.send(command).is_err() {
            debug!(context_id = %self.id, "Audio context already closed.");
        }
    }
}

impl Drop for AudioContext {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Shutdown);
    }
}

fn run(
    id: String,
    sample_rate: u32,
    backend: Arc<dyn AudioBackend>,
    commands: mpsc::Receiver<Command>,
) {
    let mut streams: HashMap<StreamId, Box<dyn ActiveStream>> = HashMap::new();

    while let Ok(command) = commands.recv() {
        match command {
            Command::OpenInput {
                stream,
                callback,
                reply,
            } => {
                let opened = backend.open_input(sample_rate, callback);
                settle(&id, &mut streams, stream, opened, reply);
            }
            Command::OpenOutput {
                stream,
                callback,
                reply,
            } => {
                let opened = backend.open_output(sample_rate, callback);
                settle(&id, &mut streams, stream, opened, reply);
            }
            Command::Close(stream) => {
                if streams.remove(&stream).is_some() {
                    debug!(context_id = %id, stream, "Stream closed.");
                }
            }
            Command::Shutdown => break,
        }
    }

    info!(context_id = %id, open_streams = streams.len(), "Audio context stopped.");
}

fn settle(
    id: &str,
    streams: &mut HashMap<StreamId, Box<dyn ActiveStream>>,
    stream: StreamId,
    opened: Result<Box<dyn ActiveStream>>,
    reply: oneshot::Sender<Result<()>>,
) {
    match opened {
        Ok(active) => {
            if reply.send(Ok(())).is_ok() {
                debug!(context_id = id, stream, "Stream opened.");
                streams.insert(stream, active);
            } else {
                debug!(context_id = id, stream, "Opener went away, releasing stream.");
            }
        }
        Err(e) => {
            warn!(context_id = id, stream, "Failed to open stream: {}", e);
            let _ = reply.send(Err(e));
        }
    }
}

/// Registry of audio contexts keyed by id, shared by every pipeline of a process.
pub struct AudioContextManager {
    backend: Arc<dyn AudioBackend>,
    contexts: Mutex<HashMap<String, Arc<AudioContext>>>,
}

impl AudioContextManager {
    pub fn new(backend: Arc<dyn AudioBackend>) -> Self {
        Self {
            backend,
            contexts: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the context registered under `id`, creating it at `sample_rate` if needed.
    ///
    /// An existing context keeps the rate it was created with.
    pub fn get_or_create(&self, id: &str, sample_rate: u32) -> Result<Arc<AudioContext>> {
        let mut contexts = self.contexts.lock();
        if let Some(context) = contexts.get(id) {
            if context.sample_rate != sample_rate {
                warn!(
                    context_id = id,
                    existing = context.sample_rate,
                    requested = sample_rate,
                    "Reusing audio context at a different sample rate."
                );
            }
            return Ok(context.clone());
        }
        let context = Arc::new(AudioContext::spawn(id, sample_rate, self.backend.clone())?);
        contexts.insert(id.to_string(), context.clone());
        Ok(context)
    }

    pub fn get(&self, id: &str) -> Option<Arc<AudioContext>> {
        self.contexts.lock().get(id).cloned()
    }

    /// Shuts down and forgets one context. Returns false for unknown ids.
    pub fn close(&self, id: &str) -> bool {
        match self.contexts.lock().remove(id) {
            Some(context) => {
                context.close();
                true
            }
            None => false,
        }
    }

    pub fn close_all(&self) {
        let contexts: Vec<_> = self.contexts.lock().drain().collect();
        for (_, context) in contexts {
            context.close();
        }
    }

    pub fn len(&self) -> usize {
        self.contexts.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeBackend;

    #[test]
    fn test_manager_reuses_contexts_by_id() {
        let manager = AudioContextManager::new(Arc::new(FakeBackend::new()));
        let first = manager.get_or_create("audio-out", 24000).unwrap();
        let again = manager.get_or_create("audio-out", 16000).unwrap();
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(again.sample_rate(), 24000);
        assert_eq!(manager.len(), 1);

        manager.get_or_create("audio-in", 16000).unwrap();
        assert_eq!(manager.len(), 2);
        assert!(manager.close("audio-in"));
        assert!(!manager.close("audio-in"));
        manager.close_all();
        assert!(manager.is_empty());
        assert!(manager.get("audio-out").is_none());
    }

    #[tokio::test]
    async fn test_streams_open_and_close_on_the_audio_thread() {
        let backend = FakeBackend::new();
        let manager = AudioContextManager::new(Arc::new(backend.clone()));
        let context = manager.get_or_create("audio-out", 24000).unwrap();

        let stream = context
            .open_output(Box::new(|out: &mut [f32]| out.fill(0.0)))
            .wait()
            .await
            .unwrap();
        assert_eq!(backend.active_outputs(), 1);

        context.close_stream(stream);
        assert!(backend.wait_until(|b| b.active_outputs() == 0).await);
    }

    #[tokio::test]
    async fn test_open_on_closed_context_fails() {
        let manager = AudioContextManager::new(Arc::new(FakeBackend::new()));
        let context = manager.get_or_create("audio-in", 16000).unwrap();
        context.close();
        let result = context.open_input(Box::new(|_: &[f32]| {})).wait().await;
        assert!(matches!(result, Err(LiveError::Unsupported(_))));
    }
}
