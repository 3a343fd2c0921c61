//! Speech task infrastructure for the voxbridge proxy.
//!
//! Brokers text-to-speech and speech-to-text requests to a remote speech
//! service that speaks a duplex, event-driven task protocol. Each request
//! becomes one [`TaskSession`] with its own outbound connection, driven to
//! exactly one terminal outcome by [`driver::drive`].
//!
//! Client recordings are normalized by a [`Transcoder`] before recognition;
//! the production implementation shells out to `ffmpeg`.

pub mod config;
pub mod connection;
pub mod driver;
pub mod error;
pub mod service;
pub mod session;
pub mod transcode;

#[cfg(test)]
mod testing;

pub use config::{
    RecognitionConfig, SpeechConfig, SynthesisConfig, TranscoderConfig, DEFAULT_ENDPOINT,
};
pub use connection::{Connector, DuplexConnection, Inbound, WsConnector};
pub use driver::ClientSink;
pub use error::SpeechError;
pub use service::{SpeechService, SynthesisRequest, PROSODY_RANGE};
pub use session::{Outbound, SessionInput, SessionUpdate, TaskSession, Transition};
pub use transcode::{FfmpegTranscoder, Transcoder, WavFormat};
