//! Shared fixtures: a fake remote speech service, mock converters, app state.

#![allow(dead_code)]

use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};
use voxbridge_server::delivery::{ArtifactStore, Delivery, DeliveryMode};
use voxbridge_server::AppState;
use voxbridge_types::{Action, ControlFrame, EventFrame, EventName, TaskKind};
use voxbridge_voice::{SpeechConfig, SpeechService};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Remote {
    /// Synthesis streams "A" then "B"; recognition yields "你" then "你好".
    Normal,
    /// Drops the connection right after `task-started`.
    CloseAfterStart,
}

/// Starts a fake remote speech service and returns its endpoint URL.
pub async fn start_remote(behavior: Remote) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(serve_task(stream, behavior));
        }
    });
    format!("ws://{}/api-ws/v1/inference", addr)
}

async fn serve_task(stream: TcpStream, behavior: Remote) {
    let Ok(mut ws) = accept_async(stream).await else {
        return;
    };
    let Some(run) = next_control(&mut ws).await else {
        return;
    };
    let task_id = run.header.task_id.clone();
    let kind = run.run_task_kind().unwrap();
    send_event(&mut ws, EventFrame::new(EventName::TaskStarted, &task_id)).await;

    if behavior == Remote::CloseAfterStart {
        let _ = ws.close(None).await;
        return;
    }

    while let Some(frame) = next_control(&mut ws).await {
        if frame.action() == Action::FinishTask {
            break;
        }
    }

    match kind {
        TaskKind::Synthesis => {
            for chunk in [b"A".to_vec(), b"B".to_vec()] {
                ws.send(Message::Binary(chunk.into())).await.unwrap();
            }
        }
        TaskKind::Recognition => {
            send_event(&mut ws, EventFrame::result(&task_id, "你", None)).await;
            send_event(&mut ws, EventFrame::result(&task_id, "你好", Some(800.0))).await;
        }
    }
    send_event(&mut ws, EventFrame::new(EventName::TaskFinished, &task_id)).await;
    while let Some(Ok(_)) = ws.next().await {}
}

/// Next control frame, skipping binary audio.
async fn next_control(ws: &mut WebSocketStream<TcpStream>) -> Option<ControlFrame> {
    while let Some(Ok(message)) = ws.next().await {
        if let Message::Text(text) = message {
            return serde_json::from_str(text.as_str()).ok();
        }
    }
    None
}

async fn send_event(ws: &mut WebSocketStream<TcpStream>, frame: EventFrame) {
    let json = serde_json::to_string(&frame).unwrap();
    let _ = ws.send(Message::Text(json.into())).await;
}

/// Copies the `-i` argument to the last argument.
pub const COPY_FFMPEG: &str = r#"#!/bin/sh
prev=""
input=""
for arg in "$@"; do
  if [ "$prev" = "-i" ]; then input="$arg"; fi
  prev="$arg"
done
cp "$input" "$prev"
"#;

pub const FAILING_FFMPEG: &str =
    "#!/bin/sh\necho 'Invalid data found when processing input' >&2\nexit 1\n";

pub async fn write_script(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("ffmpeg");
    tokio::fs::write(&path, body).await.unwrap();
    let mut perms = tokio::fs::metadata(&path).await.unwrap().permissions();
    perms.set_mode(0o755);
    tokio::fs::set_permissions(&path, perms).await.unwrap();
    path
}

/// A recognizer-ready WAV of `frames` silent samples.
pub fn silent_wav(frames: u32) -> Vec<u8> {
    let data_len = frames * 2;
    let mut out = Vec::new();
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&16_000u32.to_le_bytes());
    out.extend_from_slice(&32_000u32.to_le_bytes());
    out.extend_from_slice(&2u16.to_le_bytes());
    out.extend_from_slice(&16u16.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    out.resize(out.len() + data_len as usize, 0);
    out
}

pub struct Fixture {
    pub endpoint: String,
    pub api_key: String,
    pub ffmpeg: PathBuf,
    pub mode: DeliveryMode,
    pub audio_dir: PathBuf,
}

impl Fixture {
    pub fn state(&self) -> AppState {
        let mut speech = SpeechConfig::new(self.api_key.clone());
        speech.endpoint = self.endpoint.clone();
        speech.task_timeout_seconds = 5;
        speech.transcoder.ffmpeg_binary = self.ffmpeg.clone();
        speech.transcoder.timeout_seconds = 10;
        AppState {
            speech: SpeechService::new(speech),
            delivery: Delivery::new(self.mode, ArtifactStore::new(self.audio_dir.clone(), "/audio")),
            static_dir: None,
        }
    }
}

/// Serves `app` on an ephemeral port.
pub async fn serve(app: axum::Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}
