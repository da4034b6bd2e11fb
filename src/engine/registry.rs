//! Service registry
//!
//! Owns the set of active services, keyed by operation code, for the
//! lifetime of a session. The registry is an explicitly constructed value
//! handed to whatever owns the transport; there are no process-wide
//! singletons. One service per operation code, registered once at
//! startup.

use std::collections::HashMap;
use std::time::Instant;

use super::error::{DispatchError, MonitorError, ServiceError};
use super::service::Service;
use super::transport::Transport;
use crate::protocol::codec::Codec;
use crate::protocol::{Op, OpCode};
use uuid::Uuid;

/// Active services keyed by operation code.
#[derive(Default)]
pub struct ServiceRegistry {
    services: HashMap<OpCode, Service>,
    // registration order, for deterministic shutdown fan-out
    order: Vec<OpCode>,
}

impl ServiceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a service under its operation code.
    ///
    /// Registering two services for the same code is a wiring error and
    /// fails fast at construction time.
    pub fn register(&mut self, service: Service) -> Result<(), MonitorError> {
        let code = service.code();
        if self.services.contains_key(&code) {
            return Err(MonitorError::DuplicateService(code));
        }
        self.order.push(code);
        self.services.insert(code, service);
        Ok(())
    }

    /// Look up a registered service.
    pub fn get(&self, code: OpCode) -> Option<&Service> {
        self.services.get(&code)
    }

    /// Issue a request through the service registered for `code`.
    pub fn request(
        &mut self,
        code: OpCode,
        transport: &dyn Transport,
        codec: &dyn Codec,
        now: Instant,
    ) -> Result<Uuid, ServiceError> {
        let service = self
            .services
            .get_mut(&code)
            .ok_or(ServiceError::Unregistered(code))?;
        service.new_request(transport, codec, now)
    }

    /// Route an operation response to the owning service.
    ///
    /// An operation code with no registered service is reported and the
    /// message dropped.
    pub fn dispatch_response(
        &mut self,
        uuid: Uuid,
        op: &Op,
        now: Instant,
    ) -> Result<(), DispatchError> {
        let code = op.header.code;
        tracing::debug!(%uuid, %code, "routing operation response");
        let service = self
            .services
            .get_mut(&code)
            .ok_or(DispatchError::UnsupportedOp { code, uuid })?;
        service.handle_response(op, now)?;
        Ok(())
    }

    /// Drive every service's response deadline.
    ///
    /// Timeouts are logged by the service itself; the expired ones are
    /// returned for the owner to report further if it wants to.
    pub fn poll_timeouts(&mut self, now: Instant) -> Vec<ServiceError> {
        let mut expired = Vec::new();
        for service in self.services.values_mut() {
            if let Some(err) = service.poll_timeout(now) {
                expired.push(err);
            }
        }
        expired
    }

    /// Run every service's teardown hook, independently.
    ///
    /// A failing shutdown in one service never prevents the others from
    /// running; failures are logged and the first is returned.
    pub fn shutdown_all(
        &mut self,
        transport: &dyn Transport,
        codec: &dyn Codec,
        now: Instant,
    ) -> Result<(), ServiceError> {
        let mut first_err = None;
        for code in &self.order {
            let service = self
                .services
                .get_mut(code)
                .expect("registration order lists only registered codes");
            if let Err(err) = service.shutdown(transport, codec, now) {
                tracing::warn!(code = %code, error = %err, "service shutdown failed");
                first_err.get_or_insert(err);
            }
        }
        match first_err {
            None => Ok(()),
            Some(err) => Err(err),
        }
    }
}
