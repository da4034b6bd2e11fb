//! Acquisition start/stop operations
//!
//! Both operations follow the same optimistic pattern: lock the panel and
//! flip the toggle before the round trip, restore the old toggle state on
//! failure or timeout, and unlock once the server confirms. The server
//! answers every operation request with a status payload; anything but a
//! success code fails the cycle.

use super::PanelHandle;
use crate::engine::error::ServiceError;
use crate::engine::service::Operation;
use crate::protocol::{ErrorInfo, Op, OpCode};

fn expect_success(code: OpCode, op: &Op) -> Result<&ErrorInfo, ServiceError> {
    let status = op.status.as_ref().ok_or(ServiceError::MissingStatus(code))?;
    if !status.is_success() {
        return Err(ServiceError::Failed {
            code,
            status: status.clone(),
        });
    }
    Ok(status)
}

/// Requests an acquisition start from the server.
pub struct StartAcquisition {
    panel: PanelHandle,
}

impl StartAcquisition {
    /// Create the operation around the shared panel.
    pub fn new(panel: PanelHandle) -> Self {
        Self { panel }
    }
}

impl Operation for StartAcquisition {
    fn code(&self) -> OpCode {
        OpCode::StartAcquisition
    }

    fn apply(&mut self) -> Result<Option<serde_json::Value>, ServiceError> {
        self.panel.lock().begin(true);
        Ok(None)
    }

    fn revert(&mut self) {
        self.panel.lock().restore(false);
    }

    fn finish(&mut self, op: &Op) -> Result<(), ServiceError> {
        let status = expect_success(self.code(), op)?;
        self.panel.lock().settle(true);
        tracing::info!(status = %status.description, "acquisition started");
        Ok(())
    }
}

/// Requests an acquisition stop from the server.
///
/// Also issued once more during session teardown, so the server is not
/// left acquiring for a client that went away.
pub struct StopAcquisition {
    panel: PanelHandle,
}

impl StopAcquisition {
    /// Create the operation around the shared panel.
    pub fn new(panel: PanelHandle) -> Self {
        Self { panel }
    }
}

impl Operation for StopAcquisition {
    fn code(&self) -> OpCode {
        OpCode::StopAcquisition
    }

    fn apply(&mut self) -> Result<Option<serde_json::Value>, ServiceError> {
        self.panel.lock().begin(false);
        Ok(None)
    }

    fn revert(&mut self) {
        self.panel.lock().restore(true);
    }

    fn finish(&mut self, op: &Op) -> Result<(), ServiceError> {
        let status = expect_success(self.code(), op)?;
        self.panel.lock().settle(false);
        tracing::info!(status = %status.description, "acquisition stopped");
        Ok(())
    }

    fn shutdown_request(&self) -> bool {
        true
    }
}
