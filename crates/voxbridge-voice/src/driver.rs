//! Drives one task session over one connection to its terminal outcome.

use crate::connection::{DuplexConnection, Inbound};
use crate::error::SpeechError;
use crate::session::{Outbound, SessionInput, SessionUpdate, TaskSession, Transition};
use std::time::Duration;
use tokio::sync::mpsc;
use voxbridge_types::{EventFrame, TaskId, TaskKind, TaskOutput};

/// Where a session's incremental output goes.
#[derive(Debug, Clone)]
pub enum ClientSink {
    /// The caller only wants the terminal result.
    OneShot,
    /// Updates are forwarded in order as they arrive.
    Streaming(mpsc::Sender<SessionUpdate>),
}

impl ClientSink {
    pub fn streaming(capacity: usize) -> (Self, mpsc::Receiver<SessionUpdate>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::Streaming(tx), rx)
    }

    async fn forward(&self, update: SessionUpdate) {
        if let Self::Streaming(tx) = self {
            // A departed client does not cancel the remote task.
            if tx.send(update).await.is_err() {
                tracing::trace!("streaming client gone; dropping update");
            }
        }
    }
}

/// Owns the connection and closes it at most once.
struct ClosingConnection {
    connection: Box<dyn DuplexConnection>,
    closed: bool,
    send_error: Option<String>,
}

impl ClosingConnection {
    fn new(connection: Box<dyn DuplexConnection>) -> Self {
        Self {
            connection,
            closed: false,
            send_error: None,
        }
    }

    /// Sends `frame` unless an earlier send already failed. A failed send
    /// stops all further sends but leaves the receive side open, so a
    /// terminal event the remote already queued is still read.
    async fn send(&mut self, frame: Outbound, task_id: &TaskId) {
        if self.send_error.is_some() {
            return;
        }
        if let Err(e) = self.connection.send(frame).await {
            tracing::debug!(task_id = %task_id, "send failed, draining inbound frames: {}", e);
            self.send_error = Some(e.to_string());
        }
    }

    /// Idempotent; only the first call reaches the connection.
    async fn close(&mut self, task_id: &TaskId) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.connection.close().await {
            tracing::debug!(task_id = %task_id, "error while closing speech connection: {}", e);
        }
    }
}

/// Runs `session` over `connection` until it reaches a terminal state.
///
/// Sends `run-task` first, then reacts to inbound frames strictly in arrival
/// order. Exactly one outcome is returned; the connection is closed exactly
/// once, after the terminal transition. If no terminal event arrives within
/// `deadline` the session fails as a transport error.
pub async fn drive(
    connection: Box<dyn DuplexConnection>,
    mut session: TaskSession,
    sink: &ClientSink,
    deadline: Duration,
) -> Result<TaskOutput, SpeechError> {
    let task_id = session.task_id().clone();
    let kind = session.kind();
    let mut link = ClosingConnection::new(connection);

    let outcome = match tokio::time::timeout(deadline, run(&mut link, &mut session, sink)).await {
        Ok(outcome) => outcome,
        Err(_) => terminal(session.handle(SessionInput::TransportClosed(format!(
            "no terminal event within {} seconds",
            deadline.as_secs_f32()
        )))),
    };

    link.close(&task_id).await;
    log_outcome(&task_id, kind, &outcome);
    outcome
}

async fn run(
    link: &mut ClosingConnection,
    session: &mut TaskSession,
    sink: &ClientSink,
) -> Result<TaskOutput, SpeechError> {
    let run_task = session.start()?;
    let task_id = session.task_id().clone();
    tracing::debug!(task_id = %task_id, kind = session.kind().as_str(), "sending run-task");
    link.send(Outbound::Control(run_task), &task_id).await;

    loop {
        let input = match link.connection.recv().await {
            Some(Ok(Inbound::Text(text))) => match EventFrame::parse(&text) {
                Ok(frame) => {
                    tracing::debug!(task_id = %task_id, event = frame.event().as_str(), "received event");
                    SessionInput::Event(frame)
                }
                Err(e) => SessionInput::Malformed(e.to_string()),
            },
            Some(Ok(Inbound::Binary(bytes))) => SessionInput::Binary(bytes),
            Some(Err(e)) => SessionInput::TransportClosed(
                link.send_error.clone().unwrap_or_else(|| e.to_string()),
            ),
            None => SessionInput::TransportClosed(link.send_error.clone().unwrap_or_else(|| {
                "connection closed before a terminal event".to_string()
            })),
        };

        let transition = session.handle(input);
        for update in transition.updates {
            sink.forward(update).await;
        }
        if let Some(outcome) = transition.outcome {
            return outcome;
        }
        for frame in transition.outbound {
            link.send(frame, &task_id).await;
        }
    }
}

fn terminal(transition: Transition) -> Result<TaskOutput, SpeechError> {
    transition.outcome.unwrap_or_else(|| {
        Err(SpeechError::Transport(
            "session ended without a terminal outcome".to_string(),
        ))
    })
}

fn log_outcome(task_id: &TaskId, kind: TaskKind, outcome: &Result<TaskOutput, SpeechError>) {
    match outcome {
        Ok(TaskOutput::Audio(audio)) => {
            tracing::info!(task_id = %task_id, kind = kind.as_str(), bytes = audio.len(), "speech task finished");
        }
        Ok(TaskOutput::Transcript(text)) => {
            tracing::info!(task_id = %task_id, kind = kind.as_str(), chars = text.chars().count(), "speech task finished");
        }
        Err(e) => {
            tracing::warn!(task_id = %task_id, kind = kind.as_str(), error_kind = e.kind(), "speech task failed: {}", e);
        }
    }
}
