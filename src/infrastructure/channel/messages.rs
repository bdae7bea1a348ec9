//! Engine.IO v4 / Socket.IO v5 text packets.
//!
//! Each websocket text frame carries one Engine.IO packet: a type digit
//! followed by its payload. Type `4` wraps a Socket.IO packet, which has
//! its own type digit, an optional `/namespace,` prefix, an optional ack id
//! and a JSON body. Service events arrive as `42["<name>", {...}]`.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::domain::job::{ChannelEvent, JobResult};

/// Socket.IO connect request for the default namespace
pub const CONNECT: &str = "40";

/// Engine.IO reply to a server ping
pub const PONG: &str = "3";

/// Heartbeat settings from the Engine.IO open packet
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenData {
    pub sid: String,
    #[serde(default = "default_ping_interval")]
    pub ping_interval: u64,
    #[serde(default = "default_ping_timeout")]
    pub ping_timeout: u64,
}

fn default_ping_interval() -> u64 {
    25_000
}

fn default_ping_timeout() -> u64 {
    20_000
}

impl OpenData {
    /// Longest silence before the server counts as gone
    pub fn liveness(&self) -> Duration {
        Duration::from_millis(self.ping_interval + self.ping_timeout)
    }
}

/// One decoded inbound packet
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    /// Engine.IO session opened
    Open(OpenData),
    /// Engine.IO session closed by the server
    Close,
    /// Heartbeat; answer with [`PONG`]
    Ping,
    /// Namespace connect accepted
    Connected,
    /// Namespace connect refused
    ConnectError(String),
    /// Server dropped us from the namespace
    Disconnect,
    /// A service event
    Event(ServerMessage),
    /// Pongs, noops, acks and events this client has no use for
    Ignored,
}

/// Why a frame could not be decoded
#[derive(Debug, Error)]
pub enum PacketError {
    #[error("empty packet")]
    Empty,

    #[error("unknown packet type '{0}'")]
    UnknownType(char),

    #[error("event without a name")]
    Unnamed,

    #[error("bad payload: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Decode one websocket text frame
pub fn parse_packet(text: &str) -> Result<Packet, PacketError> {
    let (kind, body) = split_type(text)?;
    match kind {
        '0' => Ok(Packet::Open(serde_json::from_str(body)?)),
        '1' => Ok(Packet::Close),
        '2' => Ok(Packet::Ping),
        '3' | '5' | '6' => Ok(Packet::Ignored),
        '4' => parse_socket_packet(body),
        other => Err(PacketError::UnknownType(other)),
    }
}

fn parse_socket_packet(text: &str) -> Result<Packet, PacketError> {
    let (kind, rest) = split_type(text)?;
    let body = strip_namespace(rest);
    match kind {
        '0' => Ok(Packet::Connected),
        '1' => Ok(Packet::Disconnect),
        '2' => parse_event(body.trim_start_matches(|c: char| c.is_ascii_digit())),
        '4' => Ok(Packet::ConnectError(refusal_reason(body))),
        '3' | '5' | '6' => Ok(Packet::Ignored),
        other => Err(PacketError::UnknownType(other)),
    }
}

fn split_type(text: &str) -> Result<(char, &str), PacketError> {
    let mut chars = text.chars();
    let kind = chars.next().ok_or(PacketError::Empty)?;
    Ok((kind, chars.as_str()))
}

/// Drop a `/namespace,` prefix; a bare `/namespace` leaves no body
fn strip_namespace(text: &str) -> &str {
    if !text.starts_with('/') {
        return text;
    }
    text.split_once(',').map(|(_, body)| body).unwrap_or("")
}

fn parse_event(body: &str) -> Result<Packet, PacketError> {
    let mut args = serde_json::from_str::<Vec<Value>>(body)?.into_iter();
    let name = match args.next() {
        Some(Value::String(name)) => name,
        _ => return Err(PacketError::Unnamed),
    };
    let data = args.next().unwrap_or(Value::Null);

    Ok(match ServerMessage::from_event(&name, data)? {
        Some(message) => Packet::Event(message),
        None => {
            tracing::debug!(event = %name, "Skipping unknown event");
            Packet::Ignored
        }
    })
}

fn refusal_reason(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.to_string())
}

/// Encode the `start_processing` event
pub fn start_processing(url: &str) -> String {
    format!("42{}", json!(["start_processing", { "url": url }]))
}

/// Service events the client acts on
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    Progress(ProgressData),
    CaptionUpdate(CaptionData),
    Result(ResultData),
    Error(ErrorData),
}

/// Payload for `progress` events
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProgressData {
    /// Step description
    #[serde(default)]
    pub data: String,
    pub progress: f64,
}

/// Payload for `caption_update` events
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CaptionData {
    pub caption: String,
}

/// Payload for `result` events
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ResultData {
    pub structured_content: Value,
    #[serde(default)]
    pub images: Vec<String>,
    pub request_id: String,
    #[serde(default)]
    pub expires_in_seconds: Option<f64>,
    #[serde(default)]
    pub expiration_timestamp: Option<DateTime<Utc>>,
}

/// Payload for `error` events
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ErrorData {
    pub error: String,
}

impl ServerMessage {
    /// Decode the payload of a named event; `None` for names the client ignores
    pub fn from_event(name: &str, data: Value) -> Result<Option<Self>, serde_json::Error> {
        let message = match name {
            "progress" => Self::Progress(serde_json::from_value(data)?),
            "caption_update" => Self::CaptionUpdate(serde_json::from_value(data)?),
            "result" => Self::Result(serde_json::from_value(data)?),
            "error" => Self::Error(serde_json::from_value(data)?),
            _ => return Ok(None),
        };
        Ok(Some(message))
    }

    /// Map onto the domain event, relative to `now` for absolute expiry times
    pub fn into_event(self, now: DateTime<Utc>) -> ChannelEvent {
        match self {
            Self::Progress(data) => ChannelEvent::Progress {
                step: data.data,
                percent: percent(data.progress),
            },
            Self::CaptionUpdate(data) => ChannelEvent::Auxiliary { text: data.caption },
            Self::Result(data) => {
                let expires_in_seconds = data
                    .expires_in_seconds
                    .map(|secs| secs.max(0.0).round() as u64)
                    .or_else(|| {
                        data.expiration_timestamp
                            .map(|at| (at - now).num_seconds().max(0) as u64)
                    });
                ChannelEvent::Result(JobResult {
                    request_id: data.request_id,
                    content: data.structured_content,
                    assets: data.images,
                    expires_in_seconds,
                })
            }
            Self::Error(data) => ChannelEvent::Error { message: data.error },
        }
    }
}

fn percent(value: f64) -> u8 {
    if value.is_nan() {
        return 0;
    }
    value.round().clamp(0.0, 100.0) as u8
}
