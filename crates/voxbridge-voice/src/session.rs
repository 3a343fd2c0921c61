//! Per-task state machine for the remote duplex task protocol.
//!
//! `TaskSession` performs no I/O. The driver feeds it inbound frames and
//! transport events, and it answers with the frames to send, the updates to
//! forward to the client, and at most one terminal outcome. Transitions are
//! deterministic, so the protocol can be exercised with synthetic events.

use crate::error::SpeechError;
use voxbridge_types::{
    ControlFrame, EventFrame, EventName, RecognitionParameters, SynthesisParameters, TaskId,
    TaskKind, TaskOutput, TaskParameters, TaskState,
};

/// Something that happened on the session's connection.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionInput {
    Event(EventFrame),
    Binary(Vec<u8>),
    /// A text frame that does not parse as an event.
    Malformed(String),
    /// The connection closed or errored.
    TransportClosed(String),
}

/// A frame to write to the remote service.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Control(ControlFrame),
    Binary(Vec<u8>),
}

/// Incremental output forwarded to streaming clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionUpdate {
    AudioChunk(Vec<u8>),
    Transcript { text: String, is_partial: bool },
}

/// Effects of one input, in the order they must be applied.
#[derive(Debug, Default)]
pub struct Transition {
    pub outbound: Vec<Outbound>,
    pub updates: Vec<SessionUpdate>,
    pub outcome: Option<Result<TaskOutput, SpeechError>>,
}

impl Transition {
    fn outcome(outcome: Result<TaskOutput, SpeechError>) -> Self {
        Self {
            outcome: Some(outcome),
            ..Self::default()
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.outcome.is_some()
    }
}

#[derive(Debug)]
enum Work {
    Synthesis {
        text: String,
        audio: Vec<u8>,
    },
    Recognition {
        /// Taken when the audio frame is emitted.
        wav: Option<Vec<u8>>,
        final_text: Option<String>,
    },
}

#[derive(Debug)]
pub struct TaskSession {
    task_id: TaskId,
    model: String,
    parameters: TaskParameters,
    state: TaskState,
    run_sent: bool,
    work: Work,
}

impl TaskSession {
    pub fn synthesis(
        text: impl Into<String>,
        model: impl Into<String>,
        parameters: SynthesisParameters,
    ) -> Self {
        Self::new(
            model.into(),
            TaskParameters::Synthesis(parameters),
            Work::Synthesis {
                text: text.into(),
                audio: Vec::new(),
            },
        )
    }

    pub fn recognition(
        wav: Vec<u8>,
        model: impl Into<String>,
        parameters: RecognitionParameters,
    ) -> Self {
        Self::new(
            model.into(),
            TaskParameters::Recognition(parameters),
            Work::Recognition {
                wav: Some(wav),
                final_text: None,
            },
        )
    }

    fn new(model: String, parameters: TaskParameters, work: Work) -> Self {
        Self {
            task_id: TaskId::generate(),
            model,
            parameters,
            state: TaskState::Pending,
            run_sent: false,
            work,
        }
    }

    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    pub fn kind(&self) -> TaskKind {
        self.parameters.kind()
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    /// Returns the `run-task` frame. Must be the first frame of the task.
    pub fn start(&mut self) -> Result<ControlFrame, SpeechError> {
        if self.run_sent || self.state != TaskState::Pending {
            return Err(SpeechError::Protocol(format!(
                "run-task already issued for task {}",
                self.task_id
            )));
        }
        self.run_sent = true;
        Ok(ControlFrame::run_task(
            &self.task_id,
            &self.model,
            self.parameters.clone(),
        ))
    }

    /// Applies one input. Terminal sessions ignore everything.
    pub fn handle(&mut self, input: SessionInput) -> Transition {
        if self.state.is_terminal() {
            return Transition::default();
        }

        match input {
            SessionInput::Event(frame) => self.on_event(frame),
            SessionInput::Binary(bytes) => self.on_binary(bytes),
            SessionInput::Malformed(reason) => {
                self.fail(SpeechError::Protocol(format!("malformed event frame: {}", reason)))
            }
            SessionInput::TransportClosed(reason) => self.fail(SpeechError::Transport(reason)),
        }
    }

    fn on_event(&mut self, frame: EventFrame) -> Transition {
        if let Some(id) = &frame.header.task_id {
            if id != &self.task_id {
                return self.fail(SpeechError::Protocol(format!(
                    "event for task {} received on task {}",
                    id, self.task_id
                )));
            }
        }

        match (self.state, frame.event()) {
            (_, EventName::TaskFailed) => {
                let message = frame
                    .header
                    .error_message
                    .clone()
                    .unwrap_or_else(|| "remote task failed".to_string());
                self.fail(SpeechError::RemoteTask {
                    code: frame.header.error_code.clone(),
                    message,
                })
            }
            (TaskState::Pending, EventName::TaskStarted) => {
                self.state = TaskState::Started;
                Transition {
                    outbound: self.input_frames(),
                    ..Transition::default()
                }
            }
            (TaskState::Pending, other) => self.fail(SpeechError::Protocol(format!(
                "received {} before task-started",
                other.as_str()
            ))),
            (TaskState::Started, EventName::ResultGenerated) => self.on_result(&frame),
            (TaskState::Started, EventName::TaskFinished) => self.finish(),
            (TaskState::Started, other) => self.fail(SpeechError::Protocol(format!(
                "unexpected {} after task-started",
                other.as_str()
            ))),
            (TaskState::Finished | TaskState::Failed, _) => Transition::default(),
        }
    }

    fn on_binary(&mut self, bytes: Vec<u8>) -> Transition {
        if self.state == TaskState::Pending {
            return self.fail(SpeechError::Protocol(
                "binary frame before task-started".to_string(),
            ));
        }

        match &mut self.work {
            Work::Synthesis { audio, .. } => {
                audio.extend_from_slice(&bytes);
                Transition {
                    updates: vec![SessionUpdate::AudioChunk(bytes)],
                    ..Transition::default()
                }
            }
            Work::Recognition { .. } => {
                tracing::debug!(task_id = %self.task_id, len = bytes.len(), "ignoring binary frame on recognition task");
                Transition::default()
            }
        }
    }

    fn on_result(&mut self, frame: &EventFrame) -> Transition {
        // Synthesis tasks also emit result-generated (usage metadata); only
        // recognition results carry meaning here.
        let Work::Recognition { final_text, .. } = &mut self.work else {
            return Transition::default();
        };
        let Some(sentence) = frame.sentence() else {
            return Transition::default();
        };

        let is_partial = sentence.is_partial();
        if !is_partial {
            *final_text = Some(sentence.text.clone());
        }
        Transition {
            updates: vec![SessionUpdate::Transcript {
                text: sentence.text.clone(),
                is_partial,
            }],
            ..Transition::default()
        }
    }

    /// Frames sent in reply to `task-started`: continue, [audio], finish.
    fn input_frames(&mut self) -> Vec<Outbound> {
        let continue_frame = match &self.work {
            Work::Synthesis { text, .. } => ControlFrame::continue_with_text(&self.task_id, text),
            Work::Recognition { .. } => ControlFrame::continue_with_audio(&self.task_id),
        };
        let mut frames = vec![Outbound::Control(continue_frame)];
        if let Work::Recognition { wav, .. } = &mut self.work {
            if let Some(wav) = wav.take() {
                frames.push(Outbound::Binary(wav));
            }
        }
        frames.push(Outbound::Control(ControlFrame::finish_task(&self.task_id)));
        frames
    }

    fn finish(&mut self) -> Transition {
        self.state = TaskState::Finished;
        let output = match &mut self.work {
            Work::Synthesis { audio, .. } => TaskOutput::Audio(std::mem::take(audio)),
            Work::Recognition { final_text, .. } => {
                TaskOutput::Transcript(final_text.take().unwrap_or_default())
            }
        };
        Transition::outcome(Ok(output))
    }

    fn fail(&mut self, error: SpeechError) -> Transition {
        self.state = TaskState::Failed;
        match &mut self.work {
            Work::Synthesis { audio, .. } => audio.clear(),
            Work::Recognition { wav, .. } => *wav = None,
        }
        Transition::outcome(Err(error))
    }
}
