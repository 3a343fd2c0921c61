//! In-memory scripted remote used by unit tests.

use crate::config::SpeechConfig;
use crate::connection::{Connector, DuplexConnection, Inbound};
use crate::error::SpeechError;
use crate::session::Outbound;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Barrier;
use voxbridge_types::{Action, EventFrame, EventName, TaskId};

/// One scripted inbound frame. Event frames are addressed to the task id
/// announced by the session's `run-task`.
#[derive(Debug, Clone)]
pub enum Step {
    Started,
    Binary(Vec<u8>),
    Result(String, Option<f64>),
    Finished,
    Failed(String),
    Raw(String),
}

#[derive(Debug, Clone)]
pub struct Script {
    steps: VecDeque<Step>,
    hang: bool,
    fail_sends_after: Option<usize>,
}

impl Script {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: steps.into(),
            hang: false,
            fail_sends_after: None,
        }
    }

    /// Never yield anything once the steps run out.
    pub fn hang(mut self) -> Self {
        self.hang = true;
        self
    }

    /// Accept `n` outbound frames, then fail every send.
    pub fn fail_sends_after(mut self, n: usize) -> Self {
        self.fail_sends_after = Some(n);
        self
    }
}

/// Observes what a scripted connection saw.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    sent: Arc<Mutex<Vec<Outbound>>>,
    closes: Arc<AtomicUsize>,
}

impl Recorder {
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn sent_actions(&self) -> Vec<Action> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter_map(|frame| match frame {
                Outbound::Control(control) => Some(control.action()),
                Outbound::Binary(_) => None,
            })
            .collect()
    }

    pub fn binary_frames(&self) -> Vec<Vec<u8>> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter_map(|frame| match frame {
                Outbound::Binary(bytes) => Some(bytes.clone()),
                Outbound::Control(_) => None,
            })
            .collect()
    }

    pub fn frame_order(&self) -> Vec<&'static str> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|frame| match frame {
                Outbound::Control(control) => match control.action() {
                    Action::RunTask => "run",
                    Action::ContinueTask => "continue",
                    Action::FinishTask => "finish",
                },
                Outbound::Binary(_) => "binary",
            })
            .collect()
    }

    /// The task id carried by the first control frame sent, if any.
    pub fn announced_task_id(&self) -> Option<TaskId> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .find_map(|frame| match frame {
                Outbound::Control(control) => Some(control.header.task_id.clone()),
                Outbound::Binary(_) => None,
            })
    }

    fn task_id(&self) -> TaskId {
        self.announced_task_id()
            .unwrap_or_else(|| TaskId::from("unannounced"))
    }
}

pub struct ScriptedConnection {
    script: Script,
    recorder: Recorder,
}

impl ScriptedConnection {
    pub fn new(script: Script) -> (Self, Recorder) {
        let recorder = Recorder::default();
        (
            Self {
                script,
                recorder: recorder.clone(),
            },
            recorder,
        )
    }
}

#[async_trait]
impl DuplexConnection for ScriptedConnection {
    async fn send(&mut self, frame: Outbound) -> Result<(), SpeechError> {
        let mut sent = self.recorder.sent.lock().unwrap();
        if let Some(limit) = self.script.fail_sends_after {
            if sent.len() >= limit {
                return Err(SpeechError::Transport("broken pipe".to_string()));
            }
        }
        sent.push(frame);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<Inbound, SpeechError>> {
        let Some(step) = self.script.steps.pop_front() else {
            if self.script.hang {
                std::future::pending::<()>().await;
            }
            return None;
        };
        let id = self.recorder.task_id();
        let text = |frame: EventFrame| {
            Inbound::Text(serde_json::to_string(&frame).expect("event frame serializes"))
        };
        Some(Ok(match step {
            Step::Started => text(EventFrame::new(EventName::TaskStarted, &id)),
            Step::Binary(bytes) => Inbound::Binary(bytes),
            Step::Result(sentence, end_time) => text(EventFrame::result(&id, &sentence, end_time)),
            Step::Finished => text(EventFrame::new(EventName::TaskFinished, &id)),
            Step::Failed(message) => text(EventFrame::failed(&id, "InternalError", &message)),
            Step::Raw(raw) => Inbound::Text(raw),
        }))
    }

    async fn close(&mut self) -> Result<(), SpeechError> {
        self.recorder.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Hands out one scripted connection per attempt and counts attempts.
#[derive(Clone, Default)]
pub struct ScriptedConnector {
    script: Option<Script>,
    stall: bool,
    gate: Option<Arc<Barrier>>,
    attempts: Arc<AtomicUsize>,
    recorders: Arc<Mutex<Vec<Recorder>>>,
}

impl ScriptedConnector {
    pub fn new(script: Script) -> Self {
        Self {
            script: Some(script),
            ..Self::default()
        }
    }

    /// A connector whose every attempt is refused.
    pub fn refusing() -> Self {
        Self::default()
    }

    /// A connector whose attempts never complete.
    pub fn stalled() -> Self {
        Self {
            stall: true,
            ..Self::default()
        }
    }

    /// Holds every attempt until `n` attempts are in flight at once.
    pub fn gated(mut self, n: usize) -> Self {
        self.gate = Some(Arc::new(Barrier::new(n)));
        self
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Task ids announced over each handed-out connection, in connect order.
    pub fn announced_task_ids(&self) -> Vec<TaskId> {
        self.recorders
            .lock()
            .unwrap()
            .iter()
            .filter_map(Recorder::announced_task_id)
            .collect()
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(
        &self,
        _config: &SpeechConfig,
    ) -> Result<Box<dyn DuplexConnection>, SpeechError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.stall {
            std::future::pending::<()>().await;
        }
        if let Some(gate) = &self.gate {
            gate.wait().await;
        }
        match &self.script {
            Some(script) => {
                let (connection, recorder) = ScriptedConnection::new(script.clone());
                self.recorders.lock().unwrap().push(recorder);
                Ok(Box::new(connection))
            }
            None => Err(SpeechError::Transport("connection refused".to_string())),
        }
    }
}
