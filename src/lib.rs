//! Spyglass – client protocol engine for a live image-acquisition monitor
//!
//! A monitor server streams binary frames (acquired images, errors, operation
//! responses) over a single ordered duplex channel. This crate implements the
//! client side of that protocol:
//! - A discriminated wire envelope and a pluggable codec
//! - Per-operation request/response services with optimistic local state,
//!   response deadlines, and rollback on failure or timeout
//! - A registry routing operation responses to the owning service
//! - A dispatcher decoding inbound frames and routing them by message kind
//!
//! The engine is single-threaded and event-driven: the owner feeds it inbound
//! frames and periodic deadline polls, and it never blocks.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

/// Wire envelope data model and codec
pub mod protocol;

/// Request/response engine: services, registry, dispatcher, transport
pub mod engine;

/// Concrete acquisition monitor services and wiring
pub mod monitor;

// Re-export key types for convenience
pub use engine::dispatcher::{Dispatcher, DisplaySink, ImageFrame};
pub use engine::error::{MonitorError, Result};
pub use engine::registry::ServiceRegistry;
pub use engine::service::{Operation, Service, DEFAULT_SERVICE_TIMEOUT};
pub use engine::transport::Transport;
pub use protocol::codec::{Codec, JsonCodec};
pub use protocol::Envelope;

/// Current version of the Spyglass engine
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
