//! Task identity, lifecycle state, and parameter bags for remote speech tasks.
//!
//! A task is one request-scoped interaction with the remote speech service.
//! These types carry no I/O; the state machine that mutates them lives in
//! `voxbridge-voice`.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque identifier correlating every frame of one remote task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Generates a fresh identifier (UUID v4, 32 lowercase hex characters).
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Returns the identifier as sent on the wire.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// The two kinds of remote task the proxy drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Text-to-speech.
    Synthesis,
    /// Speech-to-text.
    Recognition,
}

impl TaskKind {
    /// Remote `task` field value.
    pub fn task_type(self) -> &'static str {
        match self {
            Self::Synthesis => "tts",
            Self::Recognition => "asr",
        }
    }

    /// Remote `function` field value.
    pub fn function(self) -> &'static str {
        match self {
            Self::Synthesis => "SpeechSynthesizer",
            Self::Recognition => "recognition",
        }
    }

    /// Label used in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Synthesis => "synthesis",
            Self::Recognition => "recognition",
        }
    }
}

/// Lifecycle state of a task session.
///
/// Ordered: a session only ever moves forward through
/// `Pending -> Started -> {Finished | Failed}` (or straight from `Pending`
/// to `Failed`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    Started,
    Finished,
    Failed,
}

impl TaskState {
    /// Returns `true` for `Finished` and `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Failed)
    }
}

/// Synthesis parameter bag, serialized verbatim into the `run-task` frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisParameters {
    pub text_type: String,
    pub voice: String,
    pub format: String,
    pub sample_rate: u32,
    pub volume: u32,
    pub rate: f32,
    pub pitch: f32,
}

impl Default for SynthesisParameters {
    fn default() -> Self {
        Self {
            text_type: "PlainText".to_string(),
            voice: "longtong".to_string(),
            format: "mp3".to_string(),
            sample_rate: 22050,
            volume: 50,
            rate: 1.0,
            pitch: 1.0,
        }
    }
}

/// Recognition parameter bag, serialized verbatim into the `run-task` frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognitionParameters {
    pub format: String,
    pub sample_rate: u32,
    pub punctuation_prediction_enabled: bool,
}

impl Default for RecognitionParameters {
    fn default() -> Self {
        Self {
            format: "wav".to_string(),
            sample_rate: 16000,
            punctuation_prediction_enabled: true,
        }
    }
}

/// Parameter bag for either task kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TaskParameters {
    Synthesis(SynthesisParameters),
    Recognition(RecognitionParameters),
}

impl TaskParameters {
    pub fn kind(&self) -> TaskKind {
        match self {
            Self::Synthesis(_) => TaskKind::Synthesis,
            Self::Recognition(_) => TaskKind::Recognition,
        }
    }
}

/// Successful result of a finished task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutput {
    /// Concatenated binary audio frames, in arrival order.
    Audio(Vec<u8>),
    /// Last final recognition hypothesis, or empty if none arrived.
    Transcript(String),
}
