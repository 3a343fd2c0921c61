use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use voxbridge_types::{RecognitionParameters, SynthesisParameters};

/// Inference endpoint of the remote speech service.
pub const DEFAULT_ENDPOINT: &str = "wss://dashscope.aliyuncs.com/api-ws/v1/inference";

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_true() -> bool {
    true
}

fn default_task_timeout_seconds() -> u64 {
    120
}

/// 10 MiB, matching the largest browser recording the client produces.
fn default_max_audio_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_max_text_bytes() -> usize {
    64 * 1024
}

fn default_synthesis_model() -> String {
    "cosyvoice-v1".to_string()
}

fn default_voice() -> String {
    "longtong".to_string()
}

fn default_audio_format() -> String {
    "mp3".to_string()
}

fn default_sample_rate() -> u32 {
    22050
}

fn default_volume() -> u32 {
    50
}

fn default_recognition_model() -> String {
    "paraformer-realtime-v2".to_string()
}

fn default_ffmpeg_binary() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_transcode_timeout_seconds() -> u64 {
    60
}

/// Process-wide, read-only configuration of the remote speech service.
///
/// Loaded once at startup and shared by every session through an `Arc`.
#[derive(Clone, Serialize, Deserialize)]
pub struct SpeechConfig {
    #[serde(default, skip_serializing)]
    pub api_key: String,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Sends `X-DashScope-DataInspection: enable` on connect.
    #[serde(default = "default_true")]
    pub data_inspection: bool,
    /// Upper bound on one remote task, from connect to terminal event.
    #[serde(default = "default_task_timeout_seconds")]
    pub task_timeout_seconds: u64,
    #[serde(default = "default_max_audio_bytes")]
    pub max_audio_bytes: usize,
    #[serde(default = "default_max_text_bytes")]
    pub max_text_bytes: usize,
    #[serde(default)]
    pub synthesis: SynthesisConfig,
    #[serde(default)]
    pub recognition: RecognitionConfig,
    #[serde(default)]
    pub transcoder: TranscoderConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisConfig {
    #[serde(default = "default_synthesis_model")]
    pub model: String,
    #[serde(default = "default_voice")]
    pub voice: String,
    #[serde(default = "default_audio_format")]
    pub format: String,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_volume")]
    pub volume: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognitionConfig {
    #[serde(default = "default_recognition_model")]
    pub model: String,
    #[serde(default = "default_true")]
    pub punctuation_prediction_enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscoderConfig {
    #[serde(default = "default_ffmpeg_binary")]
    pub ffmpeg_binary: PathBuf,
    /// Parent directory for per-request scratch directories. Defaults to the
    /// OS temp dir.
    #[serde(default)]
    pub scratch_dir: Option<PathBuf>,
    #[serde(default = "default_transcode_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            endpoint: default_endpoint(),
            data_inspection: true,
            task_timeout_seconds: default_task_timeout_seconds(),
            max_audio_bytes: default_max_audio_bytes(),
            max_text_bytes: default_max_text_bytes(),
            synthesis: SynthesisConfig::default(),
            recognition: RecognitionConfig::default(),
            transcoder: TranscoderConfig::default(),
        }
    }
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            model: default_synthesis_model(),
            voice: default_voice(),
            format: default_audio_format(),
            sample_rate: default_sample_rate(),
            volume: default_volume(),
        }
    }
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            model: default_recognition_model(),
            punctuation_prediction_enabled: true,
        }
    }
}

impl Default for TranscoderConfig {
    fn default() -> Self {
        Self {
            ffmpeg_binary: default_ffmpeg_binary(),
            scratch_dir: None,
            timeout_seconds: default_transcode_timeout_seconds(),
        }
    }
}

impl fmt::Debug for SpeechConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpeechConfig")
            .field("api_key", &"[REDACTED]")
            .field("endpoint", &self.endpoint)
            .field("data_inspection", &self.data_inspection)
            .field("task_timeout_seconds", &self.task_timeout_seconds)
            .field("max_audio_bytes", &self.max_audio_bytes)
            .field("max_text_bytes", &self.max_text_bytes)
            .field("synthesis", &self.synthesis)
            .field("recognition", &self.recognition)
            .field("transcoder", &self.transcoder)
            .finish()
    }
}

impl SpeechConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Self::default()
        }
    }

    /// Returns `false` when the credential is empty or whitespace.
    pub fn has_credential(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_seconds)
    }

    /// Recognition parameters derived from config. Format and rate are fixed
    /// by the transcoder's output contract.
    pub fn recognition_parameters(&self) -> RecognitionParameters {
        RecognitionParameters {
            punctuation_prediction_enabled: self.recognition.punctuation_prediction_enabled,
            ..RecognitionParameters::default()
        }
    }
}

impl SynthesisConfig {
    /// Builds the wire parameter bag for one request.
    pub fn parameters(&self, voice: Option<&str>, rate: f32, pitch: f32) -> SynthesisParameters {
        SynthesisParameters {
            voice: voice.unwrap_or(&self.voice).to_string(),
            format: self.format.clone(),
            sample_rate: self.sample_rate,
            volume: self.volume,
            rate,
            pitch,
            ..SynthesisParameters::default()
        }
    }
}

impl TranscoderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}
