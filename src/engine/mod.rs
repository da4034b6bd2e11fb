//! Request/response engine
//!
//! The engine turns the fire-and-forget duplex channel into reliable,
//! timeout-bounded, optimistically-applied operations. It is built from
//! three parts: per-operation [`Service`](service::Service) state machines,
//! the [`ServiceRegistry`](registry::ServiceRegistry) keying them by
//! operation code, and the [`Dispatcher`](dispatcher::Dispatcher) decoding
//! and routing inbound frames.

pub mod dispatcher;
pub mod error;
pub mod registry;
pub mod service;
pub mod transport;
