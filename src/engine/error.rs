//! Error types for the request/response engine
//!
//! Domain errors use thiserror, layered per component, with a top-level
//! wrapper for the owner's control boundary. Service errors always imply
//! that the optimistic mutation has already been reverted by the time the
//! error surfaces.

use std::io;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::protocol::codec::CodecError;
use crate::protocol::{Direction, ErrorInfo, OpCode};

/// Errors raised by a [`Service`](crate::engine::service::Service) during a
/// request/response cycle.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The transport is not open, nothing was sent
    #[error("transport not ready, cannot send request")]
    TransportNotReady,

    /// A request is already pending on this service
    #[error("request {request} already pending for {code}")]
    Busy {
        /// Operation the service is bound to
        code: OpCode,
        /// UUID of the request currently in flight
        request: Uuid,
    },

    /// The response direction or operation code disagrees with the service
    #[error("response mismatch for {expected}: got direction={direction:?} code={code}")]
    ResponseMismatch {
        /// Operation the service is bound to
        expected: OpCode,
        /// Direction carried by the message
        direction: Direction,
        /// Operation code carried by the message
        code: OpCode,
    },

    /// A response arrived while no request was pending (eg. after a timeout
    /// already reverted the optimistic state)
    #[error("no request pending for {0}, response dropped")]
    NotPending(OpCode),

    /// A request was issued for an operation with no registered service
    #[error("no service registered for {0}")]
    Unregistered(OpCode),

    /// No response arrived within the configured window
    #[error("service {code} timed out after {timeout:?} (request {request})")]
    Timeout {
        /// Operation the service is bound to
        code: OpCode,
        /// Configured response window
        timeout: Duration,
        /// UUID of the request that timed out
        request: Uuid,
    },

    /// The response carried a non-success application result
    #[error("service {code} failed: {status}")]
    Failed {
        /// Operation the service is bound to
        code: OpCode,
        /// Application result carried by the response
        status: ErrorInfo,
    },

    /// A response arrived without an application result attached
    #[error("response for {0} carries no status")]
    MissingStatus(OpCode),

    /// The apply hook could not produce a request
    #[error("apply failed for {code}: {detail}")]
    Apply {
        /// Operation the service is bound to
        code: OpCode,
        /// Hook-provided description
        detail: String,
    },

    /// Encoding the request envelope failed
    #[error("encode error: {0}")]
    Encode(#[from] CodecError),

    /// Sending over the transport failed
    #[error("transport send failed: {0}")]
    Transport(#[from] io::Error),
}

/// Errors raised while dispatching a single inbound frame.
///
/// These are terminal for that frame only; the dispatch loop carries on.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The frame could not be decoded into an envelope
    #[error("decode error: {0}")]
    Decode(CodecError),

    /// The envelope kind is not supported by this client
    #[error("unsupported message kind: {0}")]
    UnsupportedKind(String),

    /// No service is registered for the operation code
    #[error("unsupported operation: {code} (message {uuid})")]
    UnsupportedOp {
        /// Operation code with no registered service
        code: OpCode,
        /// Envelope UUID, for tracing
        uuid: Uuid,
    },

    /// The matched service rejected the response
    #[error(transparent)]
    Service(#[from] ServiceError),
}

impl From<CodecError> for DispatchError {
    fn from(err: CodecError) -> Self {
        // Unknown kinds are protocol-level, not malformed bytes.
        match err {
            CodecError::UnknownKind(kind) => DispatchError::UnsupportedKind(kind),
            other => DispatchError::Decode(other),
        }
    }
}

/// Top-level engine error.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// Service request/response error
    #[error("service error: {0}")]
    Service(#[from] ServiceError),

    /// Frame dispatch error
    #[error("dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    /// Envelope codec error
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// A service was registered twice for the same operation code
    #[error("service already registered for {0}")]
    DuplicateService(OpCode),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error outside a service request cycle
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Result type using [`MonitorError`]
pub type Result<T> = std::result::Result<T, MonitorError>;
