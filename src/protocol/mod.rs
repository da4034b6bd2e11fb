//! Wire envelope data model
//!
//! Defines the discriminated envelope exchanged with the monitor server:
//! a header carrying a time-ordered UUID and a message kind, plus exactly
//! one payload variant matching that kind. Operation messages nest their
//! own header (direction + operation code) and carry their application
//! result as a typed status.

pub mod codec;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Discriminant for the envelope payload variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// An acquired image frame
    Image,
    /// A server-reported error
    Error,
    /// An operation request or response
    Op,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageKind::Image => write!(f, "image"),
            MessageKind::Error => write!(f, "error"),
            MessageKind::Op => write!(f, "op"),
        }
    }
}

/// Envelope header, common to every message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageHeader {
    /// Time-ordered message identifier (UUIDv7)
    pub uuid: Uuid,
    /// Payload discriminant
    pub kind: MessageKind,
}

/// An acquired image frame payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    /// Encoded image bytes
    pub raw: Vec<u8>,
    /// Media type of the encoded bytes, eg. "image/png"
    pub mime: String,
    /// Source device identifier, eg. a camera serial number
    pub source: String,
}

/// Application result/error codes carried by error payloads and
/// operation response statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// The operation completed successfully
    Success,
    /// The operation failed
    Fail,
    /// The request was not permitted
    Denied,
}

/// A server-reported error, or the result of an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Result code
    pub code: ErrorCode,
    /// Human-readable description
    pub description: String,
}

impl ErrorInfo {
    /// True if this result carries a success code.
    pub fn is_success(&self) -> bool {
        self.code == ErrorCode::Success
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {:?})", self.description, self.code)
    }
}

/// Direction of an operation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Client-issued request
    Request,
    /// Server-issued response
    Response,
}

/// Identifier for a class of request/response interaction.
///
/// Exactly one [`Service`](crate::engine::service::Service) is registered
/// per code for the lifetime of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpCode {
    /// Start the image acquisition process
    StartAcquisition,
    /// Stop the image acquisition process
    StopAcquisition,
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpCode::StartAcquisition => write!(f, "start-acquisition"),
            OpCode::StopAcquisition => write!(f, "stop-acquisition"),
        }
    }
}

/// Header of an operation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpHeader {
    /// Request or response
    pub direction: Direction,
    /// Operation being performed
    pub code: OpCode,
}

/// An operation request or response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Op {
    /// Operation header
    pub header: OpHeader,
    /// Application result, populated on responses
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ErrorInfo>,
    /// Operation-specific payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

impl Op {
    /// Create a request message for the given operation.
    pub fn request(code: OpCode, payload: Option<serde_json::Value>) -> Self {
        Self {
            header: OpHeader {
                direction: Direction::Request,
                code,
            },
            status: None,
            payload,
        }
    }

    /// Create a response message for the given operation.
    pub fn response(code: OpCode, status: ErrorInfo) -> Self {
        Self {
            header: OpHeader {
                direction: Direction::Response,
                code,
            },
            status: Some(status),
            payload: None,
        }
    }
}

/// Envelope payload, exactly one variant per message.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// An acquired image frame
    Image(Image),
    /// A server-reported error
    Error(ErrorInfo),
    /// An operation request or response
    Op(Op),
}

impl Payload {
    /// The message kind matching this payload variant.
    pub fn kind(&self) -> MessageKind {
        match self {
            Payload::Image(_) => MessageKind::Image,
            Payload::Error(_) => MessageKind::Error,
            Payload::Op(_) => MessageKind::Op,
        }
    }
}

/// The unit exchanged over the transport: header plus one payload variant.
///
/// Invariant: `header.kind` always matches the populated payload variant.
/// Construction goes through [`Envelope::new`] which derives the kind from
/// the payload; the codec enforces the invariant on decode.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Envelope header
    pub header: MessageHeader,
    /// Payload variant matching `header.kind`
    pub payload: Payload,
}

impl Envelope {
    /// Create an envelope with a fresh time-ordered UUID.
    pub fn new(payload: Payload) -> Self {
        Self {
            header: MessageHeader {
                uuid: Uuid::now_v7(),
                kind: payload.kind(),
            },
            payload,
        }
    }

    /// Create an operation request envelope.
    pub fn request(code: OpCode, payload: Option<serde_json::Value>) -> Self {
        Self::new(Payload::Op(Op::request(code, payload)))
    }
}

/// Extract the millisecond timestamp embedded in a UUIDv7.
///
/// The leading 48 bits of a v7 UUID encode the creation time as Unix
/// milliseconds. Returns `None` for UUIDs of any other version.
pub fn uuid_timestamp_millis(uuid: &Uuid) -> Option<u64> {
    if uuid.get_version_num() != 7 {
        return None;
    }
    let bytes = uuid.as_bytes();
    let mut millis: u64 = 0;
    for b in &bytes[..6] {
        millis = (millis << 8) | u64::from(*b);
    }
    Some(millis)
}

/// Extract the embedded UUIDv7 timestamp as a wall-clock instant.
pub fn uuid_timestamp(uuid: &Uuid) -> Option<DateTime<Utc>> {
    let millis = uuid_timestamp_millis(uuid)?;
    DateTime::<Utc>::from_timestamp_millis(millis as i64)
}
