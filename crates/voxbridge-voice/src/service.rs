use crate::config::SpeechConfig;
use crate::connection::{Connector, WsConnector};
use crate::driver::{drive, ClientSink};
use crate::error::SpeechError;
use crate::session::TaskSession;
use crate::transcode::{FfmpegTranscoder, Transcoder};
use std::ops::RangeInclusive;
use std::sync::Arc;
use tokio::time::Instant;
use voxbridge_types::TaskOutput;

/// Accepted range for the speaking rate and pitch multipliers.
pub const PROSODY_RANGE: RangeInclusive<f32> = 0.5..=2.0;

/// A text-to-speech request as received from a client.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SynthesisRequest {
    pub text: String,
    pub rate: Option<f32>,
    pub pitch: Option<f32>,
    pub voice: Option<String>,
}

impl SynthesisRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }
}

/// Entry point for both task kinds. Cheap to clone and share across requests.
#[derive(Clone)]
pub struct SpeechService {
    config: Arc<SpeechConfig>,
    connector: Arc<dyn Connector>,
    transcoder: Arc<dyn Transcoder>,
}

impl std::fmt::Debug for SpeechService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeechService")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SpeechService {
    pub fn new(config: SpeechConfig) -> Self {
        let transcoder = FfmpegTranscoder::from_config(&config.transcoder);
        Self::with_parts(config, Arc::new(WsConnector), Arc::new(transcoder))
    }

    pub fn with_parts(
        config: SpeechConfig,
        connector: Arc<dyn Connector>,
        transcoder: Arc<dyn Transcoder>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            connector,
            transcoder,
        }
    }

    pub fn config(&self) -> &SpeechConfig {
        &self.config
    }

    /// Whether a service credential is configured.
    pub fn is_enabled(&self) -> bool {
        self.config.has_credential()
    }

    /// Synthesizes `request.text` and returns the concatenated audio.
    ///
    /// Audio chunks are forwarded to `sink` as they arrive.
    pub async fn synthesize(
        &self,
        request: &SynthesisRequest,
        sink: ClientSink,
    ) -> Result<Vec<u8>, SpeechError> {
        let text = request.text.trim();
        if text.is_empty() {
            return Err(SpeechError::Validation("text is required".to_string()));
        }
        if text.len() > self.config.max_text_bytes {
            return Err(SpeechError::Validation(format!(
                "text exceeds {} bytes",
                self.config.max_text_bytes
            )));
        }
        self.require_credential()?;
        let rate = prosody("rate", request.rate)?;
        let pitch = prosody("pitch", request.pitch)?;

        let parameters = self
            .config
            .synthesis
            .parameters(request.voice.as_deref(), rate, pitch);
        let session = TaskSession::synthesis(text, &self.config.synthesis.model, parameters);
        tracing::info!(
            task_id = %session.task_id(),
            kind = session.kind().as_str(),
            chars = text.chars().count(),
            "starting synthesis"
        );

        match self.run(session, sink).await? {
            TaskOutput::Audio(audio) => Ok(audio),
            TaskOutput::Transcript(_) => Err(SpeechError::Protocol(
                "synthesis produced a transcript".to_string(),
            )),
        }
    }

    /// Transcribes client audio of any container ffmpeg understands.
    ///
    /// Partial and final hypotheses are forwarded to `sink` as they arrive.
    /// Returns the last final hypothesis, or an empty string when the
    /// recognizer produced none.
    pub async fn recognize(&self, audio: &[u8], sink: ClientSink) -> Result<String, SpeechError> {
        if audio.is_empty() {
            return Err(SpeechError::Validation("audio is required".to_string()));
        }
        if audio.len() > self.config.max_audio_bytes {
            return Err(SpeechError::Validation(format!(
                "audio exceeds {} bytes",
                self.config.max_audio_bytes
            )));
        }
        self.require_credential()?;

        let wav = self.transcoder.transcode(audio).await?;
        let session = TaskSession::recognition(
            wav,
            &self.config.recognition.model,
            self.config.recognition_parameters(),
        );
        tracing::info!(
            task_id = %session.task_id(),
            kind = session.kind().as_str(),
            input_bytes = audio.len(),
            "starting recognition"
        );

        match self.run(session, sink).await? {
            TaskOutput::Transcript(text) => Ok(text),
            TaskOutput::Audio(_) => Err(SpeechError::Protocol(
                "recognition produced audio".to_string(),
            )),
        }
    }

    fn require_credential(&self) -> Result<(), SpeechError> {
        if self.config.has_credential() {
            Ok(())
        } else {
            Err(SpeechError::Configuration(
                "speech service credential is not configured".to_string(),
            ))
        }
    }

    /// Connects and drives `session`. The task timeout covers the connect
    /// and handshake as well as the exchange that follows.
    async fn run(&self, session: TaskSession, sink: ClientSink) -> Result<TaskOutput, SpeechError> {
        let timeout = self.config.task_timeout();
        let deadline = Instant::now() + timeout;
        let connect = self.connector.connect(&self.config);
        let connection = match tokio::time::timeout_at(deadline, connect).await {
            Ok(Ok(connection)) => connection,
            Ok(Err(e)) => {
                tracing::warn!(task_id = %session.task_id(), "failed to connect to speech service: {}", e);
                return Err(e);
            }
            Err(_) => {
                tracing::warn!(task_id = %session.task_id(), "timed out connecting to speech service");
                return Err(SpeechError::Transport(format!(
                    "no connection to speech service within {} seconds",
                    timeout.as_secs_f32()
                )));
            }
        };
        drive(connection, session, &sink, deadline.saturating_duration_since(Instant::now())).await
    }
}

fn prosody(name: &str, value: Option<f32>) -> Result<f32, SpeechError> {
    let value = value.unwrap_or(1.0);
    if PROSODY_RANGE.contains(&value) {
        Ok(value)
    } else {
        Err(SpeechError::Validation(format!(
            "{} must be between {} and {}",
            name,
            PROSODY_RANGE.start(),
            PROSODY_RANGE.end()
        )))
    }
}
