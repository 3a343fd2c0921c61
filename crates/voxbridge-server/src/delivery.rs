//! Hands synthesized audio back to one-shot clients.
//!
//! In `url` mode the audio is persisted under a fresh name and the client
//! receives a link; in `base64` mode it is returned inline as a data URI.

use base64::Engine;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tokio::io::AsyncWriteExt;
use voxbridge_voice::SpeechError;

/// Result delivery mode, fixed per deployment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    #[default]
    Url,
    Base64,
}

impl FromStr for DeliveryMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "url" => Ok(Self::Url),
            "base64" | "inline" => Ok(Self::Base64),
            other => Err(format!("unknown delivery mode {:?}", other)),
        }
    }
}

/// Body of a successful `POST /api/synthesize`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SynthesisResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_base64: Option<String>,
    pub is_base64: bool,
}

/// Writes audio artifacts into a public directory.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
    url_prefix: String,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>, url_prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            url_prefix: url_prefix.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn url_prefix(&self) -> &str {
        &self.url_prefix
    }

    /// Persists `audio` as `audio_<millis>.<extension>` and returns its public URL.
    ///
    /// Names are claimed with create-new semantics; on collision the
    /// millisecond discriminator advances until a free name is found, so
    /// concurrent writers never overwrite each other.
    pub async fn persist(&self, audio: &[u8], extension: &str) -> Result<String, SpeechError> {
        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            SpeechError::Persistence(format!(
                "failed to create audio directory {:?}: {}",
                self.dir, e
            ))
        })?;

        let mut stamp = chrono::Utc::now().timestamp_millis();
        let (file_name, mut file) = loop {
            let file_name = format!("audio_{}.{}", stamp, extension);
            match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(self.dir.join(&file_name))
                .await
            {
                Ok(file) => break (file_name, file),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => stamp += 1,
                Err(e) => {
                    return Err(SpeechError::Persistence(format!(
                        "failed to create {}: {}",
                        file_name, e
                    )))
                }
            }
        };

        let written = async {
            file.write_all(audio).await?;
            file.flush().await
        }
        .await;
        if let Err(e) = written {
            self.discard_partial(&file_name).await;
            return Err(SpeechError::Persistence(format!(
                "failed to write {}: {}",
                file_name, e
            )));
        }

        tracing::debug!(file = %file_name, bytes = audio.len(), "persisted synthesized audio");
        Ok(format!(
            "{}/{}",
            self.url_prefix.trim_end_matches('/'),
            file_name
        ))
    }

    /// Removes a truncated artifact after a failed write.
    async fn discard_partial(&self, file_name: &str) {
        match tokio::fs::remove_file(self.dir.join(file_name)).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(file = %file_name, "failed to remove partial audio artifact: {}", e);
            }
        }
    }
}

/// Delivers synthesized audio according to the deployment's mode.
#[derive(Debug, Clone)]
pub struct Delivery {
    mode: DeliveryMode,
    store: ArtifactStore,
}

impl Delivery {
    pub fn new(mode: DeliveryMode, store: ArtifactStore) -> Self {
        Self { mode, store }
    }

    pub fn mode(&self) -> DeliveryMode {
        self.mode
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub async fn deliver(
        &self,
        audio: &[u8],
        format: &str,
    ) -> Result<SynthesisResponse, SpeechError> {
        match self.mode {
            DeliveryMode::Url => {
                let url = self.store.persist(audio, extension_for(format)).await?;
                Ok(SynthesisResponse {
                    success: true,
                    audio_url: Some(url),
                    audio_base64: None,
                    is_base64: false,
                })
            }
            DeliveryMode::Base64 => Ok(SynthesisResponse {
                success: true,
                audio_url: None,
                audio_base64: Some(data_uri(format, audio)),
                is_base64: true,
            }),
        }
    }
}

/// MIME type for a synthesis output format.
pub fn mime_for(format: &str) -> &'static str {
    match format.to_ascii_lowercase().as_str() {
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "pcm" => "audio/pcm",
        "opus" | "ogg" => "audio/ogg",
        _ => "application/octet-stream",
    }
}

fn extension_for(format: &str) -> &'static str {
    match format.to_ascii_lowercase().as_str() {
        "mp3" => "mp3",
        "wav" => "wav",
        "pcm" => "pcm",
        "opus" | "ogg" => "ogg",
        _ => "bin",
    }
}

/// `data:<mime>;base64,<payload>` for inline playback.
pub fn data_uri(format: &str, audio: &[u8]) -> String {
    format!(
        "data:{};base64,{}",
        mime_for(format),
        base64::engine::general_purpose::STANDARD.encode(audio)
    )
}
