//! The task that owns one WebSocket for its whole lifetime.

use crate::client::Shared;
use crate::codec;
use futures_util::{SinkExt, StreamExt};
use live_core::{ConnectionStatus, LiveError, LiveEvent};
use std::sync::Weak;
use tokio::{net::TcpStream, sync::mpsc};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, tungstenite::protocol::Message};
use tracing::{debug, info, instrument, warn};

pub(crate) type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Pumps outbound frames to the socket and inbound frames to the event channel.
///
/// The task ends when the server closes, the transport fails, or every
/// outbound sender is gone, either through `disconnect` or because the last
/// client handle was dropped. Inbound events are only delivered while
/// `generation` is current, and only the task of the current generation is
/// allowed to move the client back to `Disconnected`.
#[instrument(name = "live_connection", skip_all, fields(stream_sid = %stream_sid, generation = generation))]
pub(crate) async fn run(
    socket: Socket,
    mut outbound: mpsc::UnboundedReceiver<Message>,
    shared: Weak<Shared>,
    stream_sid: String,
    generation: u64,
) {
    let (mut sink, mut stream) = socket.split();
    let mut close_reason: Option<String> = None;

    loop {
        tokio::select! {
            biased;

            frame = outbound.recv() => {
                match frame {
                    Some(message) => {
                        if let Err(e) = sink.send(message).await {
                            warn!("Failed to write frame: {}", e);
                            if let Some(shared) = shared.upgrade() {
                                shared.emit_for(
                                    generation,
                                    LiveEvent::Error(LiveError::connection(e.to_string())),
                                );
                            }
                            close_reason = Some(e.to_string());
                            break;
                        }
                    }
                    None => {
                        debug!("Outbound queue closed, closing socket.");
                        if let Err(e) = sink.close().await {
                            debug!("Error while closing socket: {}", e);
                        }
                        break;
                    }
                }
            },
            inbound = stream.next() => {
                let Some(shared) = shared.upgrade() else {
                    debug!("Client dropped, closing socket.");
                    if let Err(e) = sink.close().await {
                        debug!("Error while closing socket: {}", e);
                    }
                    break;
                };
                match inbound {
                    Some(Ok(Message::Text(text))) => handle_text(&shared, generation, &text),
                    Some(Ok(Message::Binary(data))) => {
                        shared.emit_for(generation, codec::decode_binary_frame(data));
                    }
                    Some(Ok(Message::Close(frame))) => {
                        close_reason = frame
                            .map(|f| f.reason.to_string())
                            .filter(|reason| !reason.is_empty());
                        info!(reason = ?close_reason, "Server closed the connection.");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("WebSocket error: {}", e);
                        if shared.emit_for(
                            generation,
                            LiveEvent::Error(LiveError::connection(e.to_string())),
                        ) {
                            shared.log("server.error", e.to_string());
                        }
                        close_reason = Some(e.to_string());
                        break;
                    }
                    None => {
                        info!("Socket stream ended.");
                        break;
                    }
                }
            },
        }
    }

    let Some(shared) = shared.upgrade() else {
        return;
    };
    let current = {
        let mut state = shared.state.lock();
        if state.generation == generation {
            state.status = ConnectionStatus::Disconnected;
            state.socket = None;
            true
        } else {
            false
        }
    };
    if current {
        let message = match &close_reason {
            Some(reason) => format!("disconnected with reason: {reason}"),
            None => "disconnected".to_string(),
        };
        shared.log("server.close", message);
        shared.emit(LiveEvent::Close {
            reason: close_reason,
        });
    }
}

fn handle_text(shared: &Shared, generation: u64, text: &str) {
    let delivered = match codec::decode_text_frame(text) {
        Ok(events) => events
            .into_iter()
            .all(|event| shared.emit_for(generation, event)),
        Err(e) => {
            warn!("Dropping malformed inbound frame: {}", e);
            shared.emit_for(generation, LiveEvent::Error(e))
        }
    };
    if delivered {
        shared.log("server.content", text);
    }
}
