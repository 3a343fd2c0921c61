//! Audio transcoding into the recognizer's input contract.
//!
//! Client recordings arrive as compressed, packetized audio (typically
//! WebM/Opus from a browser). The recognizer accepts only mono 16-bit
//! linear PCM at 16 kHz in a WAV container.

use crate::config::TranscoderConfig;
use crate::error::SpeechError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tempfile::TempDir;
use tokio::process::Command;

pub const TARGET_SAMPLE_RATE: u32 = 16_000;
pub const TARGET_CHANNELS: u16 = 1;
pub const TARGET_BITS_PER_SAMPLE: u16 = 16;

const INPUT_FILE: &str = "input.webm";
const OUTPUT_FILE: &str = "output.wav";

/// Longest stderr excerpt carried in an error message.
const MAX_STDERR_EXCERPT: usize = 512;

/// Converts arbitrary client audio into recognizer-ready WAV bytes.
#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn transcode(&self, input: &[u8]) -> Result<Vec<u8>, SpeechError>;
}

/// Transcoder backed by an external `ffmpeg` process.
///
/// Each call gets its own uniquely named scratch directory holding the input
/// and output artifacts. The directory is removed on every exit path before
/// the result is returned.
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    binary: PathBuf,
    scratch_dir: Option<PathBuf>,
    timeout: Duration,
}

impl FfmpegTranscoder {
    pub fn new(
        binary: impl Into<PathBuf>,
        scratch_dir: Option<PathBuf>,
        timeout: Duration,
    ) -> Self {
        Self {
            binary: binary.into(),
            scratch_dir,
            timeout,
        }
    }

    pub fn from_config(config: &TranscoderConfig) -> Self {
        Self::new(
            config.ffmpeg_binary.clone(),
            config.scratch_dir.clone(),
            config.timeout(),
        )
    }

    async fn scratch(&self) -> Result<TempDir, SpeechError> {
        let builder = {
            let mut b = tempfile::Builder::new();
            b.prefix("transcode-");
            b
        };
        let created = match &self.scratch_dir {
            Some(parent) => {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    SpeechError::Transcode(format!(
                        "failed to create scratch directory {:?}: {}",
                        parent, e
                    ))
                })?;
                builder.tempdir_in(parent)
            }
            None => builder.tempdir(),
        };
        created.map_err(|e| {
            SpeechError::Transcode(format!("failed to allocate scratch directory: {}", e))
        })
    }

    async fn run(&self, dir: &Path, input: &[u8]) -> Result<Vec<u8>, SpeechError> {
        let input_path = dir.join(INPUT_FILE);
        let output_path = dir.join(OUTPUT_FILE);

        tokio::fs::write(&input_path, input).await.map_err(|e| {
            SpeechError::Transcode(format!("failed to write transcoder input: {}", e))
        })?;

        let mut command = Command::new(&self.binary);
        command
            .arg("-hide_banner")
            .arg("-loglevel")
            .arg("error")
            .arg("-y")
            .arg("-i")
            .arg(&input_path)
            .arg("-acodec")
            .arg("pcm_s16le")
            .arg("-ar")
            .arg(TARGET_SAMPLE_RATE.to_string())
            .arg("-ac")
            .arg(TARGET_CHANNELS.to_string())
            .arg("-f")
            .arg("wav")
            .arg(&output_path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = command
            .spawn()
            .map_err(|e| SpeechError::Transcode(format!("failed to spawn ffmpeg: {}", e)))?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                SpeechError::Transcode(format!(
                    "ffmpeg timed out after {} seconds",
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| SpeechError::Transcode(format!("failed to wait for ffmpeg: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let excerpt: String = stderr.trim().chars().take(MAX_STDERR_EXCERPT).collect();
            return Err(SpeechError::Transcode(format!(
                "ffmpeg exited with {}: {}",
                output.status, excerpt
            )));
        }

        let wav = tokio::fs::read(&output_path).await.map_err(|e| {
            SpeechError::Transcode(format!("failed to read transcoder output: {}", e))
        })?;

        let format = WavFormat::parse(&wav)?;
        if !format.is_recognizer_ready() {
            return Err(SpeechError::Transcode(format!(
                "unexpected output format: {} channel(s), {} Hz, {} bits",
                format.channels, format.sample_rate, format.bits_per_sample
            )));
        }

        tracing::debug!(
            input_bytes = input.len(),
            output_bytes = wav.len(),
            duration_ms = format.duration().as_millis() as u64,
            "transcoded client audio"
        );

        Ok(wav)
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn transcode(&self, input: &[u8]) -> Result<Vec<u8>, SpeechError> {
        if input.is_empty() {
            return Err(SpeechError::Validation("audio payload is empty".to_string()));
        }

        let scratch = self.scratch().await?;
        let result = self.run(scratch.path(), input).await;

        // Remove off the blocking path; dropping `scratch` afterwards retries
        // if this failed.
        if let Err(e) = tokio::fs::remove_dir_all(scratch.path()).await {
            tracing::warn!(path = ?scratch.path(), "failed to remove transcoder scratch directory: {}", e);
        }
        drop(scratch);

        result
    }
}

/// Header fields of a PCM WAV file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavFormat {
    pub audio_format: u16,
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    /// Length of the `data` chunk in bytes, clamped to what is present.
    pub data_len: u32,
}

impl WavFormat {
    /// Parses the RIFF/WAVE chunk list, skipping chunks other than `fmt ` and `data`.
    pub fn parse(bytes: &[u8]) -> Result<Self, SpeechError> {
        if bytes.len() < 12 || &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
            return Err(SpeechError::Transcode("output is not a WAV file".to_string()));
        }

        let mut fmt: Option<(u16, u16, u32, u16)> = None;
        let mut offset = 12;

        while offset + 8 <= bytes.len() {
            let id = &bytes[offset..offset + 4];
            let declared = u32::from_le_bytes([
                bytes[offset + 4],
                bytes[offset + 5],
                bytes[offset + 6],
                bytes[offset + 7],
            ]) as usize;
            let body = offset + 8;

            if id == b"fmt " {
                if body + 16 > bytes.len() {
                    break;
                }
                let le16 = |at: usize| u16::from_le_bytes([bytes[at], bytes[at + 1]]);
                let le32 = |at: usize| {
                    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
                };
                fmt = Some((le16(body), le16(body + 2), le32(body + 4), le16(body + 14)));
            } else if id == b"data" {
                let (audio_format, channels, sample_rate, bits_per_sample) =
                    fmt.ok_or_else(|| {
                        SpeechError::Transcode("WAV data chunk precedes fmt chunk".to_string())
                    })?;
                let available = bytes.len() - body;
                return Ok(Self {
                    audio_format,
                    channels,
                    sample_rate,
                    bits_per_sample,
                    data_len: declared.min(available) as u32,
                });
            }

            // Chunks are padded to an even length.
            offset = body.saturating_add(declared).saturating_add(declared & 1);
        }

        Err(SpeechError::Transcode(
            "WAV file has no fmt/data chunks".to_string(),
        ))
    }

    /// Mono, 16-bit, 16 kHz linear PCM.
    pub fn is_recognizer_ready(&self) -> bool {
        self.audio_format == 1
            && self.channels == TARGET_CHANNELS
            && self.sample_rate == TARGET_SAMPLE_RATE
            && self.bits_per_sample == TARGET_BITS_PER_SAMPLE
    }

    pub fn frame_count(&self) -> u64 {
        let frame_bytes = u64::from(self.channels) * u64::from(self.bits_per_sample / 8);
        if frame_bytes == 0 {
            return 0;
        }
        u64::from(self.data_len) / frame_bytes
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frame_count() as f64 / f64::from(self.sample_rate))
    }
}
