//! The session facade a caller drives: microphone, live client and speakers.

use crate::config::Config;
use live_audio::{AudioContextManager, AudioRecorder, AudioStreamer, CaptureEvent};
use live_client::{LiveClient, LiveClientOptions};
use live_core::{ContentPart, LiveError, LiveEvent, Modality, Result};
use parking_lot::Mutex;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use tokio::{
    sync::{OnceCell, mpsc, watch},
    task::JoinHandle,
};
use tracing::{debug, error, info, warn};

/// Audio context used for inbound audio.
pub const PLAYBACK_CONTEXT: &str = "audio-out";
/// Audio context used for the microphone.
pub const CAPTURE_CONTEXT: &str = "audio-in";

#[derive(Clone, Debug)]
pub struct SessionOptions {
    pub client: LiveClientOptions,
    pub capture_sample_rate: u32,
    pub playback_sample_rate: u32,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            client: LiveClientOptions::default(),
            capture_sample_rate: live_audio::CAPTURE_SAMPLE_RATE,
            playback_sample_rate: live_audio::PLAYBACK_SAMPLE_RATE,
        }
    }
}

impl From<&Config> for SessionOptions {
    fn from(config: &Config) -> Self {
        Self {
            client: LiveClientOptions::new(config.ws_url.clone()),
            capture_sample_rate: config.capture_sample_rate,
            playback_sample_rate: config.playback_sample_rate,
        }
    }
}

struct Capture {
    recorder: Arc<AudioRecorder>,
    forward: JoinHandle<()>,
}

struct Shared {
    client: LiveClient,
    audio: Arc<AudioContextManager>,
    options: SessionOptions,
    streamer: OnceCell<AudioStreamer>,
    capture: Mutex<Option<Capture>>,
    connected: watch::Sender<bool>,
    input_volume: Arc<watch::Sender<f32>>,
    last_error: watch::Sender<Option<LiveError>>,
    /// Set between a local disconnect and its `Close`; audio queued in between is stale.
    draining: AtomicBool,
}

impl Shared {
    /// The playback pipeline, opened on first use.
    async fn playback(&self) -> Result<&AudioStreamer> {
        self.streamer
            .get_or_try_init(|| async {
                let context = self
                    .audio
                    .get_or_create(PLAYBACK_CONTEXT, self.options.playback_sample_rate)?;
                AudioStreamer::open(context).await
            })
            .await
    }

    fn fail(&self, err: LiveError) {
        self.last_error.send_replace(Some(err));
    }

    fn stop_capture(&self) -> bool {
        let Some(capture) = self.capture.lock().take() else {
            return false;
        };
        capture.recorder.stop();
        capture.forward.abort();
        self.input_volume.send_replace(0.0);
        true
    }
}

/// Wires capture to the client and client audio to playback.
///
/// Must be created inside a tokio runtime: it spawns the task that consumes
/// the client's events. Every event except `Audio`, which goes straight to
/// the speakers, is forwarded to the receiver returned by [`VoiceSession::new`].
pub struct VoiceSession {
    shared: Arc<Shared>,
    pump: JoinHandle<()>,
}

impl VoiceSession {
    pub fn new(
        options: SessionOptions,
        audio: Arc<AudioContextManager>,
    ) -> (Self, mpsc::UnboundedReceiver<LiveEvent>) {
        let (client, client_events) = LiveClient::new(options.client.clone());
        let (forward, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            client,
            audio,
            options,
            streamer: OnceCell::new(),
            capture: Mutex::new(None),
            connected: watch::channel(false).0,
            input_volume: Arc::new(watch::channel(0.0).0),
            last_error: watch::channel(None).0,
            draining: AtomicBool::new(false),
        });
        let pump = tokio::spawn(pump_events(shared.clone(), client_events, forward));
        (Self { shared, pump }, rx)
    }

    pub fn client(&self) -> &LiveClient {
        &self.shared.client
    }

    /// Restarts the session: closes any open socket, then connects to `chat_id`.
    pub async fn connect(&self, chat_id: &str, modality: Modality) -> Result<bool> {
        self.shared.last_error.send_replace(None);
        self.shared.client.disconnect();
        self.shared
            .client
            .connect(chat_id, modality)
            .await
            .inspect_err(|e| self.shared.fail(e.clone()))
    }

    /// Flushes playback, stops capture and closes the socket.
    pub fn disconnect(&self) -> bool {
        self.shared.stop_capture();
        self.shared.draining.store(true, Ordering::SeqCst);
        let closed = self.shared.client.disconnect();
        if !closed {
            self.shared.draining.store(false, Ordering::SeqCst);
        }
        if let Some(streamer) = self.shared.streamer.get() {
            streamer.stop();
        }
        self.shared.connected.send_replace(false);
        closed
    }

    pub fn connected(&self) -> bool {
        *self.shared.connected.borrow()
    }

    pub fn watch_connected(&self) -> watch::Receiver<bool> {
        self.shared.connected.subscribe()
    }

    /// Latest output volume, zero until playback has started.
    pub fn volume(&self) -> f32 {
        self.shared
            .streamer
            .get()
            .map(AudioStreamer::volume)
            .unwrap_or(0.0)
    }

    pub fn input_volume(&self) -> f32 {
        *self.shared.input_volume.borrow()
    }

    pub fn watch_input_volume(&self) -> watch::Receiver<f32> {
        self.shared.input_volume.subscribe()
    }

    /// Last capture, connection or playback failure.
    pub fn error(&self) -> Option<LiveError> {
        self.shared.last_error.borrow().clone()
    }

    pub fn watch_error(&self) -> watch::Receiver<Option<LiveError>> {
        self.shared.last_error.subscribe()
    }

    /// Sends `text` as one complete turn.
    pub fn send_text(&self, text: &str) {
        self.shared
            .client
            .send(vec![ContentPart::text(text)], true);
    }

    /// Starts the microphone and streams its frames over the session.
    ///
    /// Frames are sent whenever a socket is open and dropped otherwise.
    /// Calling it again while capture is running does nothing.
    pub async fn start_capture(&self) -> Result<()> {
        let recorder = {
            let mut capture = self.shared.capture.lock();
            if capture.is_some() {
                debug!("Capture already running.");
                return Ok(());
            }
            let context = self
                .shared
                .audio
                .get_or_create(CAPTURE_CONTEXT, self.shared.options.capture_sample_rate)
                .inspect_err(|e| self.shared.fail(e.clone()))?;
            let (recorder, captured) = AudioRecorder::new(context);
            let recorder = Arc::new(recorder);
            let forward = tokio::spawn(forward_capture(
                self.shared.client.clone(),
                self.shared.input_volume.clone(),
                captured,
            ));
            *capture = Some(Capture {
                recorder: recorder.clone(),
                forward,
            });
            recorder
        };

        if let Err(e) = recorder.start().await {
            warn!("Failed to start capture: {}", e);
            let mut capture = self.shared.capture.lock();
            if capture
                .as_ref()
                .is_some_and(|c| Arc::ptr_eq(&c.recorder, &recorder))
            {
                if let Some(capture) = capture.take() {
                    capture.forward.abort();
                }
            }
            drop(capture);
            self.shared.fail(e.clone());
            return Err(e);
        }
        info!("Capture started.");
        Ok(())
    }

    /// Stops the microphone. Returns false if capture was not running.
    pub fn stop_capture(&self) -> bool {
        self.shared.stop_capture()
    }

    pub fn is_capturing(&self) -> bool {
        self.shared.capture.lock().is_some()
    }

    /// Disconnects and closes every audio context of the manager.
    pub fn shutdown(self) {
        self.disconnect();
        self.shared.audio.close_all();
        info!("Voice session shut down.");
    }
}

impl Drop for VoiceSession {
    fn drop(&mut self) {
        self.pump.abort();
        self.shared.stop_capture();
        self.shared.client.disconnect();
    }
}

async fn pump_events(
    shared: Arc<Shared>,
    mut events: mpsc::UnboundedReceiver<LiveEvent>,
    forward: mpsc::UnboundedSender<LiveEvent>,
) {
    while let Some(event) = events.recv().await {
        match &event {
            LiveEvent::Open => {
                shared.connected.send_replace(true);
            }
            LiveEvent::Close { reason } => {
                debug!(?reason, "Session closed.");
                shared.draining.store(false, Ordering::SeqCst);
                shared.connected.send_replace(false);
            }
            LiveEvent::Error(e) => {
                warn!("Session error: {}", e);
                shared.fail(e.clone());
            }
            LiveEvent::Audio(_) if shared.draining.load(Ordering::SeqCst) => {
                debug!("Dropping audio received before disconnect.");
                continue;
            }
            LiveEvent::Audio(data) => {
                match shared.playback().await {
                    Ok(streamer) => {
                        streamer.add_chunk(data);
                    }
                    Err(e) => {
                        error!("Failed to start playback: {}", e);
                        shared.fail(e);
                    }
                }
                continue;
            }
            LiveEvent::Interrupted => {
                if let Some(streamer) = shared.streamer.get() {
                    streamer.stop();
                }
            }
            LiveEvent::Log(log) => {
                debug!(kind = %log.kind, message = ?log.message, "live log");
            }
            _ => {}
        }
        let _ = forward.send(event);
    }
}

async fn forward_capture(
    client: LiveClient,
    input_volume: Arc<watch::Sender<f32>>,
    mut captured: mpsc::UnboundedReceiver<CaptureEvent>,
) {
    while let Some(event) = captured.recv().await {
        match event {
            CaptureEvent::Data(chunk) => client.send_realtime_input(vec![chunk]),
            CaptureEvent::Volume(volume) => {
                input_volume.send_replace(volume);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use live_audio::FakeBackend;

    fn session(backend: &FakeBackend) -> (VoiceSession, mpsc::UnboundedReceiver<LiveEvent>) {
        let audio = Arc::new(AudioContextManager::new(Arc::new(backend.clone())));
        VoiceSession::new(SessionOptions::default(), audio)
    }

    #[tokio::test]
    async fn test_idle_session_state() {
        let backend = FakeBackend::new();
        let (session, _events) = session(&backend);

        assert!(!session.connected());
        assert_eq!(session.volume(), 0.0);
        assert_eq!(session.input_volume(), 0.0);
        assert!(session.error().is_none());
        assert!(!session.disconnect());
        assert!(!session.disconnect());
        // No socket: dropped without error.
        session.send_text("hello");
    }

    #[tokio::test]
    async fn test_capture_publishes_input_volume() {
        let backend = FakeBackend::new();
        let (session, _events) = session(&backend);
        let mut volume = session.watch_input_volume();

        session.start_capture().await.unwrap();
        assert!(session.is_capturing());
        session.start_capture().await.unwrap();
        assert_eq!(backend.active_inputs(), 1);

        backend.speak(&[0.1; 256]);
        volume.changed().await.unwrap();
        assert!(session.input_volume() > 0.0);

        assert!(session.stop_capture());
        assert!(!session.stop_capture());
        assert_eq!(session.input_volume(), 0.0);
        assert!(backend.wait_until(|b| b.active_inputs() == 0).await);
    }

    #[tokio::test]
    async fn test_capture_failure_is_observable() {
        let backend = FakeBackend::new();
        backend.deny_microphone();
        let (session, _events) = session(&backend);

        let err = session.start_capture().await.unwrap_err();
        assert!(matches!(err, LiveError::Permission(_)));
        assert_eq!(session.error(), Some(err));
        assert!(!session.is_capturing());
    }

    #[tokio::test]
    async fn test_failed_connect_is_observable() {
        let backend = FakeBackend::new();
        let audio = Arc::new(AudioContextManager::new(Arc::new(backend.clone())));
        let options = SessionOptions {
            client: LiveClientOptions::new("ws://127.0.0.1:9"),
            ..SessionOptions::default()
        };
        let (session, mut events) = VoiceSession::new(options, audio);

        assert!(session.connect("chat-1", Modality::Audio).await.is_err());
        assert!(matches!(session.error(), Some(LiveError::Connection(_))));
        assert!(!session.connected());

        let mut saw_close = false;
        while let Ok(Some(event)) =
            tokio::time::timeout(std::time::Duration::from_millis(200), events.recv()).await
        {
            saw_close |= matches!(event, LiveEvent::Close { .. });
        }
        assert!(saw_close);
    }
}
