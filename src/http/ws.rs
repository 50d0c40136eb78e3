use super::state::AppState;
use crate::recognition::BridgeEvent;
use crate::session::{LiveSession, ServerMessage};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Outgoing frames buffered per connection
const OUTBOUND_BUFFER: usize = 256;

/// Maximum WebSocket message size (10 MB)
const MAX_WS_MESSAGE_SIZE: usize = 10 * 1024 * 1024;

enum Outbound {
    Message(ServerMessage),
    Close,
}

enum Input {
    Frame(Option<Result<Message, axum::Error>>),
    Recognition(Option<BridgeEvent>),
}

/// GET /ws/record
/// Upgrade to a live transcription session
pub async fn record_session(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.max_message_size(MAX_WS_MESSAGE_SIZE)
        .on_upgrade(move |socket| run_session(socket, state))
}

async fn run_session(socket: WebSocket, state: AppState) {
    let session_id = uuid::Uuid::new_v4().to_string();
    let monitor = state
        .sessions
        .register(&session_id, &state.services.settings.default_speaker)
        .await;
    let mut session = LiveSession::new(session_id.clone(), Arc::clone(&state.services), monitor);

    info!("WebSocket connected: session_id={}", session_id);

    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<Outbound>(OUTBOUND_BUFFER);

    // Sender task for outgoing frames
    let sender_task = tokio::spawn(async move {
        while let Some(outbound) = outbound_rx.recv().await {
            let result = match outbound {
                Outbound::Message(message) => match serde_json::to_string(&message) {
                    Ok(json) => sender.send(Message::Text(json)).await,
                    Err(e) => {
                        error!("Failed to serialize outgoing message: {}", e);
                        continue;
                    }
                },
                Outbound::Close => {
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
            };

            if let Err(e) = result {
                warn!("Failed to send WebSocket message: {}", e);
                break;
            }
        }
    });

    loop {
        let input = tokio::select! {
            frame = receiver.next() => Input::Frame(frame),
            event = session.next_event() => Input::Recognition(event),
        };

        let replies = match input {
            Input::Frame(Some(Ok(Message::Text(text)))) => session.handle_text(&text).await,
            Input::Frame(Some(Ok(Message::Binary(chunk)))) => {
                session.handle_audio_bytes(chunk).await
            }
            Input::Frame(Some(Ok(Message::Close(_)))) | Input::Frame(None) => {
                info!("WebSocket closed by client: session_id={}", session_id);
                break;
            }
            Input::Frame(Some(Ok(_))) => continue,
            Input::Frame(Some(Err(e))) => {
                warn!("WebSocket error on session {}: {}", session_id, e);
                break;
            }
            Input::Recognition(Some(event)) => session.handle_event(event).await,
            Input::Recognition(None) => continue,
        };

        for reply in replies {
            if outbound_tx.send(Outbound::Message(reply)).await.is_err() {
                debug!("Outbound channel closed for session {}", session_id);
            }
        }

        if session.is_ended() {
            let _ = outbound_tx.send(Outbound::Close).await;
            break;
        }
    }

    // Transport errors are not reported; just release everything
    session.close().await;
    state.sessions.remove(&session_id).await;

    drop(outbound_tx);
    if let Err(e) = sender_task.await {
        error!("WebSocket sender task panicked: {}", e);
    }

    info!("Session cleanup complete: session_id={}", session_id);
}
