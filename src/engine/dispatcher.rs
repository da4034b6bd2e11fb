//! Inbound message dispatcher
//!
//! Decodes every inbound frame through the codec and routes it by message
//! kind: errors and images go to the display sink, operation responses go
//! to the service registry. Frames are processed strictly in delivery
//! order, and a bad frame is terminal for that frame only; no service or
//! sink state is touched by a frame that fails to decode.
//!
//! The dispatcher also fronts the registry for the owner: issuing
//! requests, driving deadline polls, and fanning out shutdown, so the
//! owner holds a single value next to its transport.

use std::time::Instant;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::error::{DispatchError, ServiceError};
use super::registry::ServiceRegistry;
use super::transport::Transport;
use crate::protocol::codec::Codec;
use crate::protocol::{uuid_timestamp, ErrorInfo, Image, OpCode, Payload};

/// A decoded, displayable image frame handed to the sink.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageFrame {
    /// Envelope UUID of the frame
    pub uuid: Uuid,
    /// Source device identifier
    pub source: String,
    /// Media type of the raw bytes
    pub mime: String,
    /// Capture time extracted from the UUIDv7 high bits, when present
    pub captured_at: Option<DateTime<Utc>>,
    /// Encoded image bytes
    pub raw: Vec<u8>,
}

/// Rendering collaborator receiving images and server errors.
pub trait DisplaySink {
    /// Display an acquired image frame.
    fn show_image(&mut self, frame: ImageFrame);

    /// Display a server-reported error.
    fn show_error(&mut self, uuid: Uuid, error: &ErrorInfo);
}

/// Decodes inbound frames and routes them by message kind.
pub struct Dispatcher<C: Codec, S: DisplaySink> {
    codec: C,
    registry: ServiceRegistry,
    sink: S,
}

impl<C: Codec, S: DisplaySink> Dispatcher<C, S> {
    /// Create a dispatcher around a codec, a wired registry, and a sink.
    pub fn new(codec: C, registry: ServiceRegistry, sink: S) -> Self {
        Self {
            codec,
            registry,
            sink,
        }
    }

    /// Decode and route one inbound frame.
    pub fn handle_frame(&mut self, raw: &[u8], now: Instant) -> Result<(), DispatchError> {
        let envelope = self.codec.decode(raw)?;
        let uuid = envelope.header.uuid;
        match envelope.payload {
            Payload::Error(error) => {
                tracing::error!(%uuid, code = ?error.code, description = %error.description, "server error");
                self.sink.show_error(uuid, &error);
                Ok(())
            }
            Payload::Image(image) => {
                self.sink.show_image(image_frame(uuid, image));
                Ok(())
            }
            Payload::Op(op) => self.registry.dispatch_response(uuid, &op, now),
        }
    }

    /// Issue a request through the service registered for `code`.
    pub fn request(
        &mut self,
        code: OpCode,
        transport: &dyn Transport,
        now: Instant,
    ) -> Result<Uuid, ServiceError> {
        self.registry.request(code, transport, &self.codec, now)
    }

    /// Drive every service's response deadline; expired ones are returned.
    pub fn tick(&mut self, now: Instant) -> Vec<ServiceError> {
        self.registry.poll_timeouts(now)
    }

    /// Run every service's teardown hook.
    pub fn shutdown(
        &mut self,
        transport: &dyn Transport,
        now: Instant,
    ) -> Result<(), ServiceError> {
        self.registry.shutdown_all(transport, &self.codec, now)
    }

    /// The wired registry.
    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    /// The display sink.
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Mutable access to the display sink.
    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }
}

fn image_frame(uuid: Uuid, image: Image) -> ImageFrame {
    let captured_at = uuid_timestamp(&uuid);
    tracing::info!(
        %uuid,
        source = %image.source,
        mime = %image.mime,
        captured_at = ?captured_at,
        len = image.raw.len(),
        "image frame"
    );
    ImageFrame {
        uuid,
        source: image.source,
        mime: image.mime,
        captured_at,
        raw: image.raw,
    }
}
