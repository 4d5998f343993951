use crate::connection;
use live_core::{
    ClientContentLog, ConnectionStatus, ContentPart, LiveError, LiveEvent, LogMessage,
    MediaChunk, Modality, OutboundFrame, Result, StreamingLog,
};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{debug, error, info, warn};

pub const DEFAULT_URL: &str = "ws://localhost:3000";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveClientOptions {
    /// Base WebSocket URL of the gateway, without the `/user` suffix.
    pub url: String,
}

impl LiveClientOptions {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn user_endpoint(&self) -> String {
        format!("{}/user", self.url.trim_end_matches('/'))
    }
}

impl Default for LiveClientOptions {
    fn default() -> Self {
        Self::new(DEFAULT_URL)
    }
}

pub(crate) struct SocketHandle {
    outbound: mpsc::UnboundedSender<Message>,
    task: JoinHandle<()>,
}

impl SocketHandle {
    fn send(&self, frame: &OutboundFrame) {
        match frame.to_json() {
            Ok(text) => {
                if self.outbound.send(Message::Text(text.into())).is_err() {
                    debug!("Connection task already gone, frame dropped.");
                }
            }
            Err(e) => error!("Failed to serialize outbound frame: {}", e),
        }
    }
}

#[derive(Default)]
pub(crate) struct State {
    pub(crate) status: ConnectionStatus,
    pub(crate) stream_sid: Option<String>,
    pub(crate) modality: Modality,
    /// Bumped by every accepted `connect` and every `disconnect`.
    pub(crate) generation: u64,
    pub(crate) socket: Option<SocketHandle>,
}

pub(crate) struct Shared {
    pub(crate) state: Mutex<State>,
    events: mpsc::UnboundedSender<LiveEvent>,
}

impl Shared {
    pub(crate) fn emit(&self, event: LiveEvent) {
        // A dropped receiver only means nobody is listening anymore.
        let _ = self.events.send(event);
    }

    pub(crate) fn log(&self, kind: &str, message: impl Into<LogMessage>) {
        self.emit(LiveEvent::Log(StreamingLog::new(kind, message)));
    }

    /// Emits `event` only while `generation` is still the live connection.
    ///
    /// The check and the send happen under the state lock, so nothing from an
    /// old connection can follow the `Close` that `disconnect` emits.
    pub(crate) fn emit_for(&self, generation: u64, event: LiveEvent) -> bool {
        let state = self.state.lock();
        if state.generation != generation {
            return false;
        }
        self.emit(event);
        true
    }
}

/// Client for one realtime session over the gateway WebSocket.
///
/// Cloning is cheap and every clone drives the same socket. Events for all
/// clones arrive on the receiver returned by [`LiveClient::new`]. Dropping
/// the last clone closes the socket.
#[derive(Clone)]
pub struct LiveClient {
    shared: Arc<Shared>,
    options: Arc<LiveClientOptions>,
}

impl LiveClient {
    pub fn new(options: LiveClientOptions) -> (Self, mpsc::UnboundedReceiver<LiveEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let client = Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State::default()),
                events,
            }),
            options: Arc::new(options),
        };
        (client, rx)
    }

    pub fn status(&self) -> ConnectionStatus {
        self.shared.state.lock().status
    }

    pub fn stream_sid(&self) -> Option<String> {
        self.shared.state.lock().stream_sid.clone()
    }

    pub fn modality(&self) -> Modality {
        self.shared.state.lock().modality
    }

    pub fn config(&self) -> &LiveClientOptions {
        &self.options
    }

    /// Opens `<url>/user` for the session `chat_id`.
    ///
    /// Returns `Ok(false)` without touching the network while another
    /// connect is in flight or a socket is already open, and also when a
    /// `disconnect` cancelled this attempt before the handshake finished.
    /// The client only reports `Connected` once the handshake has completed.
    pub async fn connect(&self, chat_id: &str, modality: Modality) -> Result<bool> {
        let generation = match self.begin_connect(chat_id, modality) {
            Ok(generation) => generation,
            Err(e) => {
                warn!(chat_id, "Connect rejected: {}", e);
                return Ok(false);
            }
        };

        let endpoint = self.options.user_endpoint();
        info!(chat_id, %modality, %endpoint, "Connecting to live gateway.");

        match connect_async(endpoint.as_str()).await {
            Ok((socket, _)) => match self.finish_connect(chat_id, generation, socket) {
                Ok(()) => Ok(true),
                Err(mut socket) => {
                    debug!(chat_id, "Connect cancelled during handshake, closing socket.");
                    if let Err(e) = socket.close(None).await {
                        debug!("Error while closing cancelled socket: {}", e);
                    }
                    Ok(false)
                }
            },
            Err(e) => {
                let err = LiveError::connection(e.to_string());
                let current = {
                    let mut state = self.shared.state.lock();
                    if state.generation == generation {
                        state.status = ConnectionStatus::Disconnected;
                        true
                    } else {
                        false
                    }
                };
                if !current {
                    return Ok(false);
                }
                error!(chat_id, "Failed to connect: {}", err);
                self.shared.log("server.error", err.to_string());
                self.shared.emit(LiveEvent::Error(err.clone()));
                self.shared.emit(LiveEvent::Close {
                    reason: Some(err.to_string()),
                });
                Err(err)
            }
        }
    }

    fn begin_connect(&self, chat_id: &str, modality: Modality) -> Result<u64> {
        let mut state = self.shared.state.lock();
        if matches!(
            state.status,
            ConnectionStatus::Connecting | ConnectionStatus::Connected
        ) {
            return Err(LiveError::State {
                operation: "connect",
                status: state.status,
            });
        }
        state.status = ConnectionStatus::Connecting;
        state.generation += 1;
        state.stream_sid = Some(chat_id.to_string());
        state.modality = modality;
        Ok(state.generation)
    }

    /// Publishes the open socket, or hands it back if this attempt was cancelled.
    fn finish_connect(
        &self,
        chat_id: &str,
        generation: u64,
        socket: connection::Socket,
    ) -> std::result::Result<(), connection::Socket> {
        let mut state = self.shared.state.lock();
        if state.generation != generation || state.status != ConnectionStatus::Connecting {
            return Err(socket);
        }
        state.status = ConnectionStatus::Connected;
        info!(chat_id, "Connected to live gateway.");
        // Open goes out before the task can emit anything inbound.
        self.shared.log("client.open", "Connected");
        self.shared.emit(LiveEvent::Open);

        let (outbound, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(connection::run(
            socket,
            rx,
            Arc::downgrade(&self.shared),
            chat_id.to_string(),
            generation,
        ));
        state.socket = Some(SocketHandle { outbound, task });
        Ok(())
    }

    /// Closes the socket and returns to `Disconnected`.
    ///
    /// Returns `false` when there is no socket to close. A connect that is
    /// still handshaking is cancelled and will close its socket on arrival.
    pub fn disconnect(&self) -> bool {
        let socket = {
            let mut state = self.shared.state.lock();
            let Some(socket) = state.socket.take() else {
                if state.status == ConnectionStatus::Connecting {
                    state.generation += 1;
                    state.status = ConnectionStatus::Disconnected;
                    debug!("Cancelled in-flight connect.");
                }
                return false;
            };
            state.generation += 1;
            state.status = ConnectionStatus::Disconnected;
            socket
        };

        // Dropping the last sender makes the task send a close frame and exit.
        let SocketHandle { outbound, task } = socket;
        drop(outbound);
        drop(task);

        info!("Disconnected from live gateway.");
        self.shared.log("client.close", "Disconnected");
        self.shared.emit(LiveEvent::Close { reason: None });
        true
    }

    /// Sends each chunk as its own `media` frame tagged with the session stream id.
    pub fn send_realtime_input(&self, chunks: Vec<MediaChunk>) {
        let (mut has_audio, mut has_video) = (false, false);
        {
            let state = self.shared.state.lock();
            let Some(socket) = &state.socket else {
                debug!(chunks = chunks.len(), "No active socket, realtime input dropped.");
                return;
            };
            let stream_sid = state.stream_sid.clone().unwrap_or_default();
            for chunk in chunks {
                has_audio |= chunk.is_audio();
                has_video |= chunk.is_image();
                socket.send(&OutboundFrame::media(chunk, stream_sid.as_str()));
            }
        }

        let summary = match (has_audio, has_video) {
            (true, true) => "audio + video",
            (true, false) => "audio",
            (false, true) => "video",
            (false, false) => "unknown",
        };
        self.shared.log("client.realtimeInput", summary);
    }

    /// Sends one content turn.
    pub fn send(&self, turns: Vec<ContentPart>, turn_complete: bool) {
        {
            let state = self.shared.state.lock();
            let Some(socket) = &state.socket else {
                debug!("No active socket, content turn dropped.");
                return;
            };
            socket.send(&OutboundFrame::turns(turns.clone(), turn_complete));
        }
        self.shared.log(
            "client.send",
            ClientContentLog {
                turns,
                turn_complete,
            },
        );
    }
}
