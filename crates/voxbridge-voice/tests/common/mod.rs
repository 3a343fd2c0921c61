//! A fake remote speech service speaking the duplex task protocol.

#![allow(dead_code)]

use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_hdr_async, WebSocketStream};
use voxbridge_types::{Action, ControlFrame, EventFrame, EventName, TaskId, TaskKind};

/// How the fake remote answers a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    /// Streams "A", "B" for synthesis; "你" then "你好" for recognition.
    Normal,
    /// Acknowledges the task then drops the connection.
    CloseAfterStart,
    /// Fails the task right after it starts.
    FailAfterStart,
}

#[derive(Debug, Default)]
pub struct Observed {
    pub auth_headers: Vec<String>,
    pub inspection_headers: Vec<String>,
    pub actions: Vec<Action>,
    /// Task ids announced by each `run-task`, in arrival order.
    pub task_ids: Vec<TaskId>,
    pub binary_frames: Vec<Vec<u8>>,
}

pub struct FakeRemote {
    pub addr: SocketAddr,
    pub observed: Arc<Mutex<Observed>>,
}

impl FakeRemote {
    pub async fn start(behavior: Behavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let observed = Arc::new(Mutex::new(Observed::default()));

        let shared = observed.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let shared = shared.clone();
                tokio::spawn(serve(stream, behavior, shared));
            }
        });

        Self { addr, observed }
    }

    pub fn endpoint(&self) -> String {
        format!("ws://{}/api-ws/v1/inference", self.addr)
    }
}

async fn serve(stream: TcpStream, behavior: Behavior, observed: Arc<Mutex<Observed>>) {
    let headers = observed.clone();
    let callback = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        let mut seen = headers.lock().unwrap();
        if let Some(v) = req.headers().get("authorization") {
            seen.auth_headers.push(v.to_str().unwrap_or_default().to_string());
        }
        if let Some(v) = req.headers().get("x-dashscope-datainspection") {
            seen.inspection_headers
                .push(v.to_str().unwrap_or_default().to_string());
        }
        Ok(resp)
    };
    let Ok(mut ws) = accept_hdr_async(stream, callback).await else {
        return;
    };

    let Some(run) = next_control(&mut ws, &observed).await else {
        return;
    };
    let task_id = run.header.task_id.clone();
    let kind = run.run_task_kind().unwrap();

    send_event(&mut ws, EventFrame::new(EventName::TaskStarted, &task_id)).await;

    match behavior {
        Behavior::CloseAfterStart => {
            let _ = ws.close(None).await;
            return;
        }
        Behavior::FailAfterStart => {
            send_event(
                &mut ws,
                EventFrame::failed(&task_id, "InvalidParameter", "voice not found"),
            )
            .await;
            return;
        }
        Behavior::Normal => {}
    }

    // Read until finish-task; recognition audio arrives in between.
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => {
                let frame: ControlFrame = serde_json::from_str(text.as_str()).unwrap();
                observed.lock().unwrap().actions.push(frame.action());
                if frame.action() == Action::FinishTask {
                    break;
                }
            }
            Some(Ok(Message::Binary(bytes))) => {
                observed.lock().unwrap().binary_frames.push(bytes.to_vec());
            }
            Some(Ok(_)) => continue,
            _ => return,
        }
    }

    match kind {
        TaskKind::Synthesis => {
            for chunk in [b"A".as_slice(), b"B".as_slice()] {
                ws.send(Message::Binary(chunk.to_vec().into())).await.unwrap();
            }
        }
        TaskKind::Recognition => {
            send_event(&mut ws, EventFrame::result(&task_id, "你", None)).await;
            send_event(&mut ws, EventFrame::result(&task_id, "你好", Some(1500.0))).await;
        }
    }
    send_event(&mut ws, EventFrame::new(EventName::TaskFinished, &task_id)).await;

    // Wait for the client to close.
    while let Some(Ok(_)) = ws.next().await {}
}

async fn next_control(
    ws: &mut WebSocketStream<TcpStream>,
    observed: &Arc<Mutex<Observed>>,
) -> Option<ControlFrame> {
    while let Some(Ok(message)) = ws.next().await {
        if let Message::Text(text) = message {
            let frame: ControlFrame = serde_json::from_str(text.as_str()).ok()?;
            let mut seen = observed.lock().unwrap();
            seen.actions.push(frame.action());
            if frame.action() == Action::RunTask {
                seen.task_ids.push(frame.header.task_id.clone());
            }
            drop(seen);
            return Some(frame);
        }
    }
    None
}

async fn send_event(ws: &mut WebSocketStream<TcpStream>, frame: EventFrame) {
    let json = serde_json::to_string(&frame).unwrap();
    let _ = ws.send(Message::Text(json.into())).await;
}
