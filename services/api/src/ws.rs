use crate::AppState;
use crate::error::ApiError;
use crate::routes::{SessionParams, StartStatus};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use bytes::Bytes;
use futures::{Sink, SinkExt, Stream, StreamExt};
use punchout_core::Trainer;
use punchout_core::session_state::{SessionRegistry, SessionState};
use punchout_core::speech::AudioBuffer;
use std::fmt::Display;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Size of each binary audio frame.
pub const AUDIO_CHUNK_SIZE: usize = 1024;
/// Chunks buffered between the audio producer and the socket writer.
const RELAY_CAPACITY: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    Completed,
    ClientClosed,
}

/// Upgrades `/start` to a WebSocket that streams the spoken welcome.
pub async fn start_ws(
    ws: WebSocketUpgrade,
    State(app): State<AppState>,
    Query(params): Query<SessionParams>,
) -> Result<Response, ApiError> {
    let session_id = params.id().to_string();
    SessionRegistry::validate_id(&session_id)?;
    info!(%session_id, "start channel upgrade request received");
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, app.trainer, session_id)))
}

async fn handle_socket(socket: WebSocket, trainer: Trainer, session_id: String) {
    info!(%session_id, "start channel established");
    let (mut sender, receiver) = socket.split();
    // Reading alongside the relay notices a client Close frame right away
    // instead of on the next failed write.
    let outcome = tokio::select! {
        outcome = run_start(&mut sender, &trainer, &session_id) => outcome,
        () = wait_for_close(receiver) => RelayOutcome::ClientClosed,
    };
    if outcome == RelayOutcome::ClientClosed {
        debug!(%session_id, "client left before the welcome finished");
        return;
    }
    // The client may already be gone; nothing left to report either way.
    let _ = sender.close().await;
    info!(%session_id, "start channel closed");
}

/// Resolves once the client closes the channel, errors, or disconnects.
///
/// Other inbound frames are ignored; the channel is send-only.
pub async fn wait_for_close<R, E>(mut receiver: R)
where
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    while let Some(frame) = receiver.next().await {
        match frame {
            Ok(Message::Close(_)) => {
                debug!("client sent close frame");
                return;
            }
            Ok(_) => {}
            Err(e) => {
                debug!(error = %e, "start channel read failed");
                return;
            }
        }
    }
}

/// Resets the session, relays the welcome audio as binary frames and ends
/// with a text status frame.
pub async fn run_start<S>(sink: &mut S, trainer: &Trainer, session_id: &str) -> RelayOutcome
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    let status = match trainer.start_session_with_speech(session_id).await {
        Ok(outcome) => match outcome.audio {
            Ok(audio) => {
                if relay_audio(sink, audio).await == RelayOutcome::ClientClosed {
                    return RelayOutcome::ClientClosed;
                }
                StartStatus::ready(&outcome.state)
            }
            Err(e) => StartStatus::error(
                format!("Error generating welcome audio: {e}"),
                &outcome.state,
            ),
        },
        Err(e) => StartStatus::error(e.to_string(), &SessionState::new()),
    };
    send_status(sink, &status).await
}

/// Streams `audio` in fixed-size frames through a bounded channel.
///
/// The producer stops as soon as the writer goes away.
pub async fn relay_audio<S>(sink: &mut S, mut audio: AudioBuffer) -> RelayOutcome
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    let (tx, rx) = mpsc::channel::<Bytes>(RELAY_CAPACITY);

    let producer = async move {
        while let Some(chunk) = audio.next_chunk(AUDIO_CHUNK_SIZE) {
            if tx.send(chunk).await.is_err() {
                break;
            }
        }
    };

    // Each send waits for the socket, so a slow client holds the producer back
    // once RELAY_CAPACITY chunks are queued.
    let consumer = async {
        let mut rx = rx;
        let mut frames = 0usize;
        while let Some(chunk) = rx.recv().await {
            if let Err(e) = sink.send(Message::Binary(chunk)).await {
                debug!(error = %e, frames, "audio relay stopped by client");
                return RelayOutcome::ClientClosed;
            }
            frames += 1;
        }
        debug!(frames, "audio relay finished");
        RelayOutcome::Completed
    };

    let ((), outcome) = tokio::join!(producer, consumer);
    outcome
}

async fn send_status<S>(sink: &mut S, status: &StartStatus) -> RelayOutcome
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    let payload = match serde_json::to_string(status) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(error = %e, "failed to encode start status");
            return RelayOutcome::Completed;
        }
    };
    match sink.send(Message::Text(payload.into())).await {
        Ok(()) => RelayOutcome::Completed,
        Err(e) => {
            debug!(error = %e, "client left before the start status");
            RelayOutcome::ClientClosed
        }
    }
}
