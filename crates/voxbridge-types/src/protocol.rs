//! Wire schema of the remote speech service's duplex task protocol.
//!
//! Outbound control frames carry `header.action`; inbound event frames carry
//! `header.event`. Both are tagged with the task id. Audio travels in raw
//! binary frames and has no schema here.

use crate::task::{TaskId, TaskKind, TaskParameters};
use serde::{Deserialize, Serialize};

/// Value of `header.streaming` on every outbound frame.
pub const STREAMING_DUPLEX: &str = "duplex";

/// Value of `payload.task_group` on `run-task`.
pub const TASK_GROUP_AUDIO: &str = "audio";

/// Audio container announced to the recognizer before the binary frame.
pub const RECOGNITION_AUDIO_FORMAT: &str = "wav";

/// Outbound control actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Action {
    RunTask,
    ContinueTask,
    FinishTask,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlHeader {
    pub action: Action,
    pub task_id: TaskId,
    pub streaming: String,
}

/// `payload.input` of a control frame. Serializes to `{}` when empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binary: Option<BinaryHint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinaryHint {
    pub audio_format: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunTaskPayload {
    pub task_group: String,
    pub task: String,
    pub function: String,
    pub model: String,
    pub parameters: TaskParameters,
    pub input: TaskInput,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputPayload {
    pub input: TaskInput,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ControlPayload {
    RunTask(RunTaskPayload),
    Input(InputPayload),
}

/// A JSON control frame sent to the remote service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlFrame {
    pub header: ControlHeader,
    pub payload: ControlPayload,
}

impl ControlFrame {
    fn new(action: Action, task_id: &TaskId, payload: ControlPayload) -> Self {
        Self {
            header: ControlHeader {
                action,
                task_id: task_id.clone(),
                streaming: STREAMING_DUPLEX.to_string(),
            },
            payload,
        }
    }

    /// `run-task`: opens the remote task with its full parameter bag.
    pub fn run_task(task_id: &TaskId, model: &str, parameters: TaskParameters) -> Self {
        let kind = parameters.kind();
        Self::new(
            Action::RunTask,
            task_id,
            ControlPayload::RunTask(RunTaskPayload {
                task_group: TASK_GROUP_AUDIO.to_string(),
                task: kind.task_type().to_string(),
                function: kind.function().to_string(),
                model: model.to_string(),
                parameters,
                input: TaskInput::default(),
            }),
        )
    }

    /// `continue-task` carrying text to synthesize.
    pub fn continue_with_text(task_id: &TaskId, text: &str) -> Self {
        Self::new(
            Action::ContinueTask,
            task_id,
            ControlPayload::Input(InputPayload {
                input: TaskInput {
                    text: Some(text.to_string()),
                    binary: None,
                },
            }),
        )
    }

    /// `continue-task` announcing that audio follows in a binary frame.
    pub fn continue_with_audio(task_id: &TaskId) -> Self {
        Self::new(
            Action::ContinueTask,
            task_id,
            ControlPayload::Input(InputPayload {
                input: TaskInput {
                    text: None,
                    binary: Some(BinaryHint {
                        audio_format: RECOGNITION_AUDIO_FORMAT.to_string(),
                    }),
                },
            }),
        )
    }

    /// `finish-task`: no more input for this task.
    pub fn finish_task(task_id: &TaskId) -> Self {
        Self::new(
            Action::FinishTask,
            task_id,
            ControlPayload::Input(InputPayload {
                input: TaskInput::default(),
            }),
        )
    }

    pub fn action(&self) -> Action {
        self.header.action
    }

    /// The task kind announced by a `run-task` frame.
    pub fn run_task_kind(&self) -> Option<TaskKind> {
        match &self.payload {
            ControlPayload::RunTask(run) => Some(run.parameters.kind()),
            ControlPayload::Input(_) => None,
        }
    }
}

/// Inbound event names. Anything unrecognized maps to `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventName {
    TaskStarted,
    ResultGenerated,
    TaskFinished,
    TaskFailed,
    #[serde(other)]
    Unknown,
}

impl EventName {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TaskStarted => "task-started",
            Self::ResultGenerated => "result-generated",
            Self::TaskFinished => "task-finished",
            Self::TaskFailed => "task-failed",
            Self::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventHeader {
    pub event: EventName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// A recognition hypothesis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sentence {
    pub text: String,
    /// Absent or null while the utterance is still open.
    #[serde(default)]
    pub end_time: Option<f64>,
}

impl Sentence {
    pub fn is_partial(&self) -> bool {
        self.end_time.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventOutput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentence: Option<Sentence>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<EventOutput>,
}

/// A JSON event frame received from the remote service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventFrame {
    pub header: EventHeader,
    #[serde(default)]
    pub payload: EventPayload,
}

impl EventFrame {
    /// Parses one inbound text frame.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn new(event: EventName, task_id: &TaskId) -> Self {
        Self {
            header: EventHeader {
                event,
                task_id: Some(task_id.clone()),
                error_code: None,
                error_message: None,
            },
            payload: EventPayload::default(),
        }
    }

    /// A `result-generated` frame; `end_time: None` marks it partial.
    pub fn result(task_id: &TaskId, text: &str, end_time: Option<f64>) -> Self {
        let mut frame = Self::new(EventName::ResultGenerated, task_id);
        frame.payload.output = Some(EventOutput {
            sentence: Some(Sentence {
                text: text.to_string(),
                end_time,
            }),
        });
        frame
    }

    /// A `task-failed` frame with the given code and message.
    pub fn failed(task_id: &TaskId, code: &str, message: &str) -> Self {
        let mut frame = Self::new(EventName::TaskFailed, task_id);
        frame.header.error_code = Some(code.to_string());
        frame.header.error_message = Some(message.to_string());
        frame
    }

    pub fn event(&self) -> EventName {
        self.header.event
    }

    pub fn sentence(&self) -> Option<&Sentence> {
        self.payload.output.as_ref()?.sentence.as_ref()
    }
}
