//! Outbound duplex connections to the remote speech service.
//!
//! `Connector` is the substitutable connection factory: production code uses
//! [`WsConnector`], tests inject scripted connections and count attempts.

use crate::config::SpeechConfig;
use crate::error::SpeechError;
use crate::session::Outbound;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{HeaderName, AUTHORIZATION};
use tokio_tungstenite::tungstenite::http::{HeaderValue, Request};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

const DATA_INSPECTION_HEADER: &str = "x-dashscope-datainspection";

/// A frame received from the remote service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Text(String),
    Binary(Vec<u8>),
}

/// One open duplex connection, owned by exactly one task session.
#[async_trait]
pub trait DuplexConnection: Send {
    async fn send(&mut self, frame: Outbound) -> Result<(), SpeechError>;

    /// Next data frame. `None` once the peer has closed the connection.
    async fn recv(&mut self) -> Option<Result<Inbound, SpeechError>>;

    async fn close(&mut self) -> Result<(), SpeechError>;
}

/// Opens authenticated connections to the remote service.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        config: &SpeechConfig,
    ) -> Result<Box<dyn DuplexConnection>, SpeechError>;
}

/// WebSocket connector authenticating with a bearer credential header.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

impl WsConnector {
    /// Builds the upgrade request for `config.endpoint` with auth headers.
    pub fn request(config: &SpeechConfig) -> Result<Request<()>, SpeechError> {
        let mut request = config.endpoint.as_str().into_client_request().map_err(|e| {
            SpeechError::Configuration(format!("invalid endpoint {:?}: {}", config.endpoint, e))
        })?;

        let auth = HeaderValue::from_str(&format!("bearer {}", config.api_key)).map_err(|_| {
            SpeechError::Configuration("credential is not a valid header value".to_string())
        })?;
        request.headers_mut().insert(AUTHORIZATION, auth);

        if config.data_inspection {
            request.headers_mut().insert(
                HeaderName::from_static(DATA_INSPECTION_HEADER),
                HeaderValue::from_static("enable"),
            );
        }

        Ok(request)
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(
        &self,
        config: &SpeechConfig,
    ) -> Result<Box<dyn DuplexConnection>, SpeechError> {
        let request = Self::request(config)?;
        let (stream, response) = connect_async(request).await?;
        tracing::debug!(
            endpoint = %config.endpoint,
            status = %response.status(),
            "connected to speech service"
        );
        Ok(Box::new(WsConnection { stream }))
    }
}

pub struct WsConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl DuplexConnection for WsConnection {
    async fn send(&mut self, frame: Outbound) -> Result<(), SpeechError> {
        let message = match frame {
            Outbound::Control(control) => {
                let json = serde_json::to_string(&control).map_err(|e| {
                    SpeechError::Protocol(format!("failed to encode control frame: {}", e))
                })?;
                Message::Text(json.into())
            }
            Outbound::Binary(bytes) => Message::Binary(bytes.into()),
        };
        self.stream.send(message).await?;
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<Inbound, SpeechError>> {
        while let Some(message) = self.stream.next().await {
            match message {
                Ok(Message::Text(text)) => {
                    return Some(Ok(Inbound::Text(text.as_str().to_owned())))
                }
                Ok(Message::Binary(bytes)) => return Some(Ok(Inbound::Binary(bytes.to_vec()))),
                Ok(Message::Close(frame)) => {
                    tracing::debug!(?frame, "speech service closed the connection");
                    return None;
                }
                // Pings are answered by tungstenite on the next read/flush.
                Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => continue,
                Err(e) => return Some(Err(e.into())),
            }
        }
        None
    }

    async fn close(&mut self) -> Result<(), SpeechError> {
        self.stream.close(None).await?;
        Ok(())
    }
}
