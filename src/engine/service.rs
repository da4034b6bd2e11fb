//! Per-operation request/response state machine
//!
//! A [`Service`] drives one class of request/response interaction against
//! the monitor server. Issuing a request applies an optimistic local
//! mutation first, then sends the envelope and arms a response deadline.
//! Exactly one of commit, revert, or timeout-revert happens per request:
//! the deadline is disarmed before a response is processed, and every
//! failure path reverts the optimistic mutation before surfacing.
//!
//! The deadline is data, not a callback: the owner's event loop calls
//! [`Service::poll_timeout`] between frames.

use std::time::{Duration, Instant};

use uuid::Uuid;

use super::error::ServiceError;
use super::transport::Transport;
use crate::protocol::codec::Codec;
use crate::protocol::{Direction, Envelope, Op, OpCode};

/// Default response window for a service request.
pub const DEFAULT_SERVICE_TIMEOUT: Duration = Duration::from_millis(5000);

/// Domain hooks implemented once per concrete operation.
///
/// `apply` runs before the round trip and must leave local state in the
/// optimistic target shape; `revert` must restore the pre-`apply` baseline
/// and may be called after a failed or partial `apply`; `finish` inspects
/// the validated response and commits or fails.
pub trait Operation {
    /// The operation code this implementation answers for.
    fn code(&self) -> OpCode;

    /// Optimistically mutate local state and produce the request payload.
    fn apply(&mut self) -> Result<Option<serde_json::Value>, ServiceError>;

    /// Undo the optimistic mutation, restoring the baseline.
    fn revert(&mut self);

    /// Commit the optimistic mutation from a validated response, or fail.
    ///
    /// The message is guaranteed to be a response carrying this
    /// operation's code; `finish` errors trigger a revert before they
    /// propagate.
    fn finish(&mut self, op: &Op) -> Result<(), ServiceError>;

    /// Whether to issue a final request during session teardown.
    ///
    /// Teardown requests bypass timeout bookkeeping: no response is
    /// awaited and no deadline stays armed.
    fn shutdown_request(&self) -> bool {
        false
    }
}

/// Request state of a service, one request pending at most.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    /// No request in flight
    Idle,
    /// A request has been sent and its response deadline is armed
    Pending {
        /// UUID of the in-flight request envelope
        request: Uuid,
        /// When the request was issued
        armed_at: Instant,
        /// When the pending request times out
        deadline: Instant,
    },
}

/// A request/response state machine bound to one operation code.
pub struct Service {
    code: OpCode,
    op: Box<dyn Operation>,
    timeout: Duration,
    state: ServiceState,
}

impl Service {
    /// Create a service around an operation with the given response window.
    pub fn new(op: Box<dyn Operation>, timeout: Duration) -> Self {
        Self {
            code: op.code(),
            op,
            timeout,
            state: ServiceState::Idle,
        }
    }

    /// Create a service with the default response window.
    pub fn with_default_timeout(op: Box<dyn Operation>) -> Self {
        Self::new(op, DEFAULT_SERVICE_TIMEOUT)
    }

    /// The operation code this service answers for.
    pub fn code(&self) -> OpCode {
        self.code
    }

    /// Current request state.
    pub fn state(&self) -> ServiceState {
        self.state
    }

    /// UUID of the in-flight request, if any.
    pub fn pending_request(&self) -> Option<Uuid> {
        match self.state {
            ServiceState::Pending { request, .. } => Some(request),
            ServiceState::Idle => None,
        }
    }

    /// Issue a new request.
    ///
    /// Applies the optimistic mutation, arms the response deadline, and
    /// sends the encoded envelope. Any failure along the way disarms the
    /// deadline and reverts before the error is returned, so local state
    /// is never left partially mutated.
    pub fn new_request(
        &mut self,
        transport: &dyn Transport,
        codec: &dyn Codec,
        now: Instant,
    ) -> Result<Uuid, ServiceError> {
        if let ServiceState::Pending { request, .. } = self.state {
            return Err(ServiceError::Busy {
                code: self.code,
                request,
            });
        }

        let payload = match self.op.apply() {
            Ok(payload) => payload,
            Err(err) => {
                self.op.revert();
                return Err(err);
            }
        };

        let envelope = Envelope::request(self.code, payload);
        let request = envelope.header.uuid;
        self.state = ServiceState::Pending {
            request,
            armed_at: now,
            deadline: now + self.timeout,
        };

        match self.try_send(transport, codec, &envelope) {
            Ok(()) => {
                tracing::info!(code = %self.code, %request, "request sent");
                Ok(request)
            }
            Err(err) => {
                self.state = ServiceState::Idle;
                self.op.revert();
                Err(err)
            }
        }
    }

    fn try_send(
        &self,
        transport: &dyn Transport,
        codec: &dyn Codec,
        envelope: &Envelope,
    ) -> Result<(), ServiceError> {
        let raw = codec.encode(envelope)?;
        if !transport.is_ready() {
            return Err(ServiceError::TransportNotReady);
        }
        transport.send(&raw)?;
        Ok(())
    }

    /// Process an operation response routed here by the registry.
    ///
    /// Disarms the deadline before anything else, so a timeout can never
    /// fire after a response has been accepted. A response arriving while
    /// idle (eg. after the timeout already reverted) is rejected without
    /// touching local state.
    pub fn handle_response(&mut self, op: &Op, now: Instant) -> Result<(), ServiceError> {
        match std::mem::replace(&mut self.state, ServiceState::Idle) {
            ServiceState::Idle => Err(ServiceError::NotPending(self.code)),
            ServiceState::Pending {
                request, armed_at, ..
            } => {
                if op.header.direction != Direction::Response || op.header.code != self.code {
                    self.op.revert();
                    return Err(ServiceError::ResponseMismatch {
                        expected: self.code,
                        direction: op.header.direction,
                        code: op.header.code,
                    });
                }
                match self.op.finish(op) {
                    Ok(()) => {
                        tracing::info!(
                            code = %self.code,
                            %request,
                            elapsed = ?now.saturating_duration_since(armed_at),
                            "request finished"
                        );
                        Ok(())
                    }
                    Err(err) => {
                        self.op.revert();
                        Err(err)
                    }
                }
            }
        }
    }

    /// Revert the pending request if its deadline has elapsed.
    ///
    /// Returns the timeout error for reporting; `None` when idle or still
    /// within the window.
    pub fn poll_timeout(&mut self, now: Instant) -> Option<ServiceError> {
        if let ServiceState::Pending {
            request, deadline, ..
        } = self.state
        {
            if now >= deadline {
                self.state = ServiceState::Idle;
                self.op.revert();
                tracing::warn!(code = %self.code, %request, timeout = ?self.timeout, "service timed out");
                return Some(ServiceError::Timeout {
                    code: self.code,
                    timeout: self.timeout,
                    request,
                });
            }
        }
        None
    }

    /// Session teardown hook.
    ///
    /// No-op unless the operation opts in to a teardown request. The
    /// teardown request suppresses timeout bookkeeping: any armed deadline
    /// is cleared without reverting, and none stays armed afterwards.
    pub fn shutdown(
        &mut self,
        transport: &dyn Transport,
        codec: &dyn Codec,
        now: Instant,
    ) -> Result<(), ServiceError> {
        if !self.op.shutdown_request() {
            return Ok(());
        }
        self.state = ServiceState::Idle;
        let result = self.new_request(transport, codec, now).map(|_| ());
        self.state = ServiceState::Idle;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::codec::JsonCodec;
    use crate::protocol::{ErrorCode, ErrorInfo};
    use std::cell::RefCell;
    use std::io;
    use std::rc::Rc;

    #[derive(Default)]
    struct Flag {
        applied: bool,
        committed: bool,
        reverts: usize,
    }

    struct FlagOp(Rc<RefCell<Flag>>);

    impl FlagOp {
        fn new() -> (Self, Rc<RefCell<Flag>>) {
            let flag = Rc::new(RefCell::new(Flag::default()));
            (Self(flag.clone()), flag)
        }
    }

    impl Operation for FlagOp {
        fn code(&self) -> OpCode {
            OpCode::StartAcquisition
        }
        fn apply(&mut self) -> Result<Option<serde_json::Value>, ServiceError> {
            self.0.borrow_mut().applied = true;
            Ok(None)
        }
        fn revert(&mut self) {
            let mut flag = self.0.borrow_mut();
            flag.applied = false;
            flag.reverts += 1;
        }
        fn finish(&mut self, _op: &Op) -> Result<(), ServiceError> {
            self.0.borrow_mut().committed = true;
            Ok(())
        }
    }

    struct StubTransport {
        ready: bool,
        sent: RefCell<Vec<Vec<u8>>>,
    }

    impl StubTransport {
        fn open() -> Self {
            Self {
                ready: true,
                sent: RefCell::new(Vec::new()),
            }
        }
        fn closed() -> Self {
            Self {
                ready: false,
                sent: RefCell::new(Vec::new()),
            }
        }
    }

    impl Transport for StubTransport {
        fn is_ready(&self) -> bool {
            self.ready
        }
        fn send(&self, frame: &[u8]) -> io::Result<()> {
            self.sent.borrow_mut().push(frame.to_vec());
            Ok(())
        }
    }

    fn success_response(code: OpCode) -> Op {
        Op::response(
            code,
            ErrorInfo {
                code: ErrorCode::Success,
                description: "ok".into(),
            },
        )
    }

    #[test]
    fn second_request_while_pending_is_rejected() {
        let transport = StubTransport::open();
        let (op, flag) = FlagOp::new();
        let mut service = Service::with_default_timeout(Box::new(op));
        let now = Instant::now();
        let first = service.new_request(&transport, &JsonCodec, now).unwrap();
        let err = service.new_request(&transport, &JsonCodec, now).unwrap_err();
        match err {
            ServiceError::Busy { request, .. } => assert_eq!(request, first),
            other => panic!("expected Busy, got {other:?}"),
        }
        // The pending request and its optimistic state are untouched.
        assert_eq!(service.pending_request(), Some(first));
        assert_eq!(transport.sent.borrow().len(), 1);
        assert!(flag.borrow().applied);
        assert_eq!(flag.borrow().reverts, 0);
    }

    #[test]
    fn response_while_idle_is_rejected_without_revert() {
        let (op, flag) = FlagOp::new();
        let mut service = Service::with_default_timeout(Box::new(op));
        let err = service
            .handle_response(&success_response(OpCode::StartAcquisition), Instant::now())
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotPending(_)));
        assert_eq!(flag.borrow().reverts, 0);
        assert!(!flag.borrow().committed);
    }

    #[test]
    fn closed_transport_reverts_synchronously() {
        let transport = StubTransport::closed();
        let (op, flag) = FlagOp::new();
        let mut service = Service::with_default_timeout(Box::new(op));
        let err = service
            .new_request(&transport, &JsonCodec, Instant::now())
            .unwrap_err();
        assert!(matches!(err, ServiceError::TransportNotReady));
        assert_eq!(service.state(), ServiceState::Idle);
        assert!(transport.sent.borrow().is_empty());
        assert!(!flag.borrow().applied);
        assert_eq!(flag.borrow().reverts, 1);
    }

    #[test]
    fn success_response_commits_exactly_once() {
        let transport = StubTransport::open();
        let (op, flag) = FlagOp::new();
        let mut service = Service::with_default_timeout(Box::new(op));
        let now = Instant::now();
        service.new_request(&transport, &JsonCodec, now).unwrap();
        service
            .handle_response(&success_response(OpCode::StartAcquisition), now)
            .unwrap();
        assert!(flag.borrow().committed);
        assert_eq!(flag.borrow().reverts, 0);
        assert_eq!(service.state(), ServiceState::Idle);
    }

    #[test]
    fn timeout_fires_only_after_the_deadline() {
        let transport = StubTransport::open();
        let (op, flag) = FlagOp::new();
        let mut service = Service::new(Box::new(op), Duration::from_millis(100));
        let start = Instant::now();
        service.new_request(&transport, &JsonCodec, start).unwrap();

        assert!(service.poll_timeout(start + Duration::from_millis(99)).is_none());
        let err = service
            .poll_timeout(start + Duration::from_millis(100))
            .unwrap();
        assert!(matches!(err, ServiceError::Timeout { .. }));
        assert_eq!(service.state(), ServiceState::Idle);
        assert_eq!(flag.borrow().reverts, 1);
        // Once reverted, further polls are no-ops.
        assert!(service.poll_timeout(start + Duration::from_secs(10)).is_none());
        assert_eq!(flag.borrow().reverts, 1);
    }
}
