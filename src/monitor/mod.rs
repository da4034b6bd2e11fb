//! Acquisition monitor wiring
//!
//! The concrete services the monitor client exposes: starting and
//! stopping image acquisition, both driving a shared [`AcquisitionPanel`]
//! (the local stand-in for the acquisition toggle control). [`install`]
//! wires them into a registry ready to hand to a dispatcher.

pub mod ops;
pub mod sink;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::engine::error::MonitorError;
use crate::engine::registry::ServiceRegistry;
use crate::engine::service::Service;
use ops::{StartAcquisition, StopAcquisition};

/// Local acquisition control state.
///
/// `acquiring` is the toggle itself; `locked` disables the control while
/// a request is in flight, which is what prevents concurrent requests on
/// the same service.
#[derive(Debug, Default)]
pub struct AcquisitionPanel {
    acquiring: bool,
    locked: bool,
}

impl AcquisitionPanel {
    /// Whether acquisition is currently on, as far as the client knows.
    pub fn acquiring(&self) -> bool {
        self.acquiring
    }

    /// Whether the control is locked pending a response.
    pub fn locked(&self) -> bool {
        self.locked
    }

    /// Optimistically set the toggle and lock the control.
    ///
    /// Called from an operation's `apply` hook.
    pub fn begin(&mut self, target: bool) {
        self.locked = true;
        self.acquiring = target;
    }

    /// Restore the pre-request baseline and unlock.
    ///
    /// Called from an operation's `revert` hook.
    pub fn restore(&mut self, baseline: bool) {
        self.acquiring = baseline;
        self.locked = false;
    }

    /// Commit the confirmed state and unlock.
    ///
    /// Called from an operation's `finish` hook.
    pub fn settle(&mut self, target: bool) {
        self.acquiring = target;
        self.locked = false;
    }
}

/// Shared handle to the panel, held by the services and the owner.
pub type PanelHandle = Arc<Mutex<AcquisitionPanel>>;

/// Create a fresh panel handle.
pub fn new_panel() -> PanelHandle {
    Arc::new(Mutex::new(AcquisitionPanel::default()))
}

/// Monitor client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Monitor server address
    pub endpoint: String,
    /// Response window for service requests, in milliseconds
    pub service_timeout_ms: u64,
    /// Directory to persist received frames to, if any
    pub save_dir: Option<PathBuf>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            endpoint: "127.0.0.1:7700".to_string(),
            service_timeout_ms: 5000,
            save_dir: None,
        }
    }
}

impl MonitorConfig {
    /// The configured response window.
    pub fn service_timeout(&self) -> Duration {
        Duration::from_millis(self.service_timeout_ms)
    }
}

/// Build the registry with both acquisition services installed.
pub fn install(panel: &PanelHandle, timeout: Duration) -> Result<ServiceRegistry, MonitorError> {
    let mut registry = ServiceRegistry::new();
    registry.register(Service::new(
        Box::new(StartAcquisition::new(panel.clone())),
        timeout,
    ))?;
    registry.register(Service::new(
        Box::new(StopAcquisition::new(panel.clone())),
        timeout,
    ))?;
    Ok(registry)
}
