//! Streaming WebSocket channel for browser clients.
//!
//! A binary frame is a complete recording to transcribe; a text frame is a
//! JSON command. Each request runs as its own task, so several may be in
//! flight on one socket and their updates interleave. Within one request,
//! updates keep remote arrival order and the terminal message comes last.

use crate::AppState;
use axum::{
    extract::{
        ws::{Message as AxumMessage, WebSocket},
        Extension, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use base64::Engine;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use voxbridge_voice::{ClientSink, SessionUpdate, SynthesisRequest};

/// Outbound queue depth per socket. Request tasks wait when it is full.
const OUTBOUND_QUEUE: usize = 256;

/// Buffer between a session driver and its request task.
const UPDATE_BUFFER: usize = 64;

/// Incoming WebSocket message types.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum IncomingMessage {
    #[serde(rename = "synthesize")]
    Synthesize {
        #[serde(default)]
        text: String,
        #[serde(default)]
        rate: Option<f32>,
        #[serde(default)]
        pitch: Option<f32>,
    },
}

/// Outgoing WebSocket message types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OutgoingMessage {
    #[serde(rename = "audio_chunk")]
    AudioChunk { chunk: String },
    #[serde(rename = "audio_complete")]
    AudioComplete {
        #[serde(rename = "fullAudio")]
        full_audio: String,
    },
    #[serde(rename = "recognition_result")]
    RecognitionResult {
        text: String,
        #[serde(rename = "isPartial")]
        is_partial: bool,
    },
    #[serde(rename = "error")]
    Error { message: String },
}

fn encode(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// Handler for `GET /ws`.
pub async fn ws_handler(
    Extension(state): Extension<Arc<AppState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Queues `message` for the client, waiting for space.
async fn send_ws(tx: &mpsc::Sender<String>, message: &OutgoingMessage) {
    match serde_json::to_string(message) {
        Ok(json) => {
            if tx.send(json).await.is_err() {
                tracing::debug!("websocket client gone; dropping outgoing message");
            }
        }
        Err(e) => {
            tracing::error!("failed to serialize WebSocket message: {}", e);
        }
    }
}

/// Queues an error without waiting; used from the read loop.
fn send_ws_error(tx: &mpsc::Sender<String>, message: String) {
    match serde_json::to_string(&OutgoingMessage::Error { message }) {
        Ok(json) => {
            if let Err(e) = tx.try_send(json) {
                tracing::warn!("failed to send WebSocket error to client: {}", e);
            }
        }
        Err(e) => {
            tracing::error!("failed to serialize WebSocket error message: {}", e);
        }
    }
}

/// Handles the WebSocket connection.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    tracing::info!("websocket client connected");

    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<String>(OUTBOUND_QUEUE);

    // Spawn a task to forward messages from rx to the websocket sender
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(AxumMessage::Text(msg.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            AxumMessage::Binary(bytes) => {
                tracing::debug!(bytes = bytes.len(), "received recording over websocket");
                tokio::spawn(run_recognition(state.clone(), bytes.to_vec(), tx.clone()));
            }
            AxumMessage::Text(text) => match serde_json::from_str::<IncomingMessage>(text.as_str()) {
                Ok(IncomingMessage::Synthesize { text, rate, pitch }) => {
                    let request = SynthesisRequest {
                        text,
                        rate,
                        pitch,
                        voice: None,
                    };
                    tokio::spawn(run_synthesis(state.clone(), request, tx.clone()));
                }
                Err(e) => {
                    tracing::warn!("failed to parse incoming WebSocket message: {}", e);
                    send_ws_error(&tx, "invalid message format".to_string());
                }
            },
            AxumMessage::Close(_) => break,
            AxumMessage::Ping(_) | AxumMessage::Pong(_) => {}
        }
    }

    // In-flight requests keep running; their sends fail once the forwarder is gone.
    drop(tx);
    send_task.abort();
    tracing::info!("websocket client disconnected");
}

/// Streams synthesized audio chunks, then the full audio or an error.
async fn run_synthesis(state: Arc<AppState>, request: SynthesisRequest, tx: mpsc::Sender<String>) {
    let (sink, mut updates) = ClientSink::streaming(UPDATE_BUFFER);

    // The sink is dropped when the service returns, which ends the forwarder.
    let forward = async {
        while let Some(update) = updates.recv().await {
            if let SessionUpdate::AudioChunk(chunk) = update {
                send_ws(&tx, &OutgoingMessage::AudioChunk { chunk: encode(&chunk) }).await;
            }
        }
    };
    let (result, ()) = tokio::join!(state.speech.synthesize(&request, sink), forward);

    let terminal = match result {
        Ok(audio) => OutgoingMessage::AudioComplete {
            full_audio: encode(&audio),
        },
        Err(e) => OutgoingMessage::Error {
            message: e.to_string(),
        },
    };
    send_ws(&tx, &terminal).await;
}

/// Streams partial and final transcripts, or an error.
async fn run_recognition(state: Arc<AppState>, audio: Vec<u8>, tx: mpsc::Sender<String>) {
    let (sink, mut updates) = ClientSink::streaming(UPDATE_BUFFER);

    let forward = async {
        let mut saw_final = false;
        while let Some(update) = updates.recv().await {
            if let SessionUpdate::Transcript { text, is_partial } = update {
                saw_final |= !is_partial;
                send_ws(&tx, &OutgoingMessage::RecognitionResult { text, is_partial }).await;
            }
        }
        saw_final
    };
    let (result, saw_final) = tokio::join!(state.speech.recognize(&audio, sink), forward);

    match result {
        // Finals were already streamed; only an empty outcome needs reporting.
        Ok(text) if !saw_final => {
            send_ws(
                &tx,
                &OutgoingMessage::RecognitionResult {
                    text,
                    is_partial: false,
                },
            )
            .await;
        }
        Ok(_) => {}
        Err(e) => {
            send_ws(
                &tx,
                &OutgoingMessage::Error {
                    message: e.to_string(),
                },
            )
            .await;
        }
    }
}
