// src/service/mod.rs
//! Driver service lifecycle.
//!
//! Owns the device handle and drives the open/install/retry state machine:
//!
//! ```text
//! Closed ──open_driver──▶ Opening ──▶ Open
//!                            │
//!                            ├──▶ InstallFailed   (elevation required)
//!                            └──▶ StartFailed     (anything else)
//! ```
//!
//! A warm start (service installed and running) never touches the SCM.
//! Otherwise one start attempt is made; if the service is missing or will not
//! start, the image is deployed, the service registered, and the start
//! retried exactly once.

pub mod scm;

use log::Level;

use crate::comms::{DeviceChannel, DeviceOpener};
use crate::deploy::Deployer;
use crate::error::{PortIoError, Result};
use crate::platform::{Bitness, DriverIdentity};
use crate::portio_log;

pub use scm::{
    ManagerAccess, ManagerHandle, NoServices, ScmError, ServiceControl, ServiceHandle,
    ServiceRegistration, ServiceRights,
};

/// Outcome of a service start, numbered as callers have always seen it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum StartCode {
    Started = 0,
    /// Service missing or SCM unavailable.
    NotStarted = 1,
    /// Full access, but the start itself failed.
    StartFailed = 3,
    /// Read-only access; the service opened but would not start.
    ReducedStartFailed = 4,
    /// Read-only access and the service could not even be opened.
    AccessDenied = 5,
}

impl StartCode {
    pub fn as_u32(self) -> u32 {
        self as u32
    }

    pub fn is_started(self) -> bool {
        self == StartCode::Started
    }

    /// Codes that no amount of deploying will fix without elevation.
    pub fn is_access_denied(self) -> bool {
        matches!(self, StartCode::ReducedStartFailed | StartCode::AccessDenied)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Closed,
    Opening,
    Open,
    InstallFailed,
    StartFailed,
}

pub struct DriverLifecycle {
    scm: Box<dyn ServiceControl>,
    opener: Box<dyn DeviceOpener>,
    identity: DriverIdentity,
    install: bool,
    state: DriverState,
    handle: Option<Box<dyn DeviceChannel>>,
}

impl DriverLifecycle {
    pub fn new(
        scm: Box<dyn ServiceControl>,
        opener: Box<dyn DeviceOpener>,
        identity: DriverIdentity,
        install: bool,
    ) -> Self {
        Self { scm, opener, identity, install, state: DriverState::Closed, handle: None }
    }

    pub fn identity(&self) -> &DriverIdentity {
        &self.identity
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    /// The handle is only ever present in state `Open`.
    pub fn is_open(&self) -> bool {
        self.state == DriverState::Open && self.handle.is_some()
    }

    pub fn channel(&self) -> Option<&dyn DeviceChannel> {
        self.handle.as_deref()
    }

    /// Run the state machine. A no-op when already open.
    pub fn open_driver(&mut self, deployer: &Deployer<'_>, bitness: Bitness) -> Result<()> {
        if self.is_open() {
            return Ok(());
        }
        self.state = DriverState::Opening;
        portio_log!(Level::Debug, "service", "Attempting to open {} driver", self.identity.name());

        if self.try_open_device().is_ok() {
            return Ok(());
        }

        let mut code = self.start_service();
        if !code.is_started() {
            if code.is_access_denied() {
                return self.fail_install(code);
            }
            if !self.install {
                portio_log!(Level::Warn, "service", "{} not running and installation is disabled", self.identity.name());
                return self.fail_start(code);
            }

            // Deployment failure surfaces as the retry below failing.
            deployer.deploy(bitness, &self.identity);
            if let Err(ScmError::AccessDenied) = self.register_service() {
                return self.fail_install(StartCode::AccessDenied);
            }

            code = self.start_service();
            if code.is_access_denied() {
                return self.fail_install(code);
            }
            if !code.is_started() {
                return self.fail_start(code);
            }
        }

        match self.try_open_device() {
            Ok(()) => Ok(()),
            Err(e) => {
                self.state = DriverState::StartFailed;
                portio_log!(Level::Warn, "service", "{} started but device did not open", self.identity.name());
                Err(e)
            }
        }
    }

    fn try_open_device(&mut self) -> Result<()> {
        let path = self.identity.device_path();
        match self.opener.open(&path) {
            Ok(handle) => {
                self.handle = Some(handle);
                self.state = DriverState::Open;
                portio_log!(Level::Info, "service", "Successfully opened {} driver", self.identity.name());
                Ok(())
            }
            Err(source) => {
                portio_log!(Level::Debug, "service", "Cannot open {}: {}", path, source);
                Err(PortIoError::DeviceOpenFailed { path, source })
            }
        }
    }

    fn fail_install(&mut self, code: StartCode) -> Result<()> {
        self.state = DriverState::InstallFailed;
        portio_log!(
            Level::Warn,
            "service",
            "Unable to open {} driver: access denied (code {}); run elevated",
            self.identity.name(),
            code.as_u32()
        );
        Err(PortIoError::AccessDenied { code })
    }

    fn fail_start(&mut self, code: StartCode) -> Result<()> {
        self.state = DriverState::StartFailed;
        portio_log!(
            Level::Warn,
            "service",
            "Unable to open {} driver. Error code {}",
            self.identity.name(),
            code.as_u32()
        );
        Err(PortIoError::ServiceStartFailed { code })
    }

    /// Start the driver service, falling back to start-only rights when the
    /// SCM refuses full access.
    pub fn start_service(&self) -> StartCode {
        let name = self.identity.name();
        let manager = match self.scm.open_manager(ManagerAccess::Full) {
            Ok(manager) => manager,
            Err(ScmError::AccessDenied) => return self.start_reduced(),
            Err(e) => {
                portio_log!(Level::Debug, "service", "Cannot open service manager: {}", e);
                return StartCode::NotStarted;
            }
        };

        let service = match manager.open_service(name, ServiceRights::Full) {
            Ok(service) => service,
            Err(e) => {
                portio_log!(Level::Debug, "service", "Cannot open service {}: {}", name, e);
                return StartCode::NotStarted;
            }
        };
        match service.start() {
            Ok(()) | Err(ScmError::AlreadyRunning) => StartCode::Started,
            Err(e) => {
                portio_log!(Level::Debug, "service", "Cannot start {}: {}", name, e);
                StartCode::StartFailed
            }
        }
    }

    fn start_reduced(&self) -> StartCode {
        let name = self.identity.name();
        portio_log!(Level::Debug, "service", "Full SCM access denied, trying start-only rights for {}", name);

        let service = self
            .scm
            .open_manager(ManagerAccess::ReadOnly)
            .and_then(|manager| manager.open_service(name, ServiceRights::ExecuteOnly));
        let service = match service {
            Ok(service) => service,
            Err(e) => {
                portio_log!(Level::Debug, "service", "Service lookup for {} denied: {}", name, e);
                return StartCode::AccessDenied;
            }
        };
        match service.start() {
            Ok(()) | Err(ScmError::AlreadyRunning) => StartCode::Started,
            Err(e) => {
                portio_log!(Level::Debug, "service", "Reduced start of {} failed: {}", name, e);
                StartCode::ReducedStartFailed
            }
        }
    }

    /// Create the kernel-driver service unless it already exists.
    pub fn register_service(&self) -> std::result::Result<(), ScmError> {
        let registration = ServiceRegistration {
            name: self.identity.name().to_owned(),
            display_name: self.identity.name().to_owned(),
            binary_path: self.identity.service_binary_path(),
        };
        let manager = self.scm.open_manager(ManagerAccess::Full)?;
        match manager.create_service(&registration) {
            Ok(_) => {
                portio_log!(Level::Info, "service", "Registered service {}", registration.name);
                Ok(())
            }
            Err(ScmError::AlreadyExists) => Ok(()),
            Err(e) => {
                portio_log!(Level::Debug, "service", "Cannot register {}: {}", registration.name, e);
                Err(e)
            }
        }
    }

    /// Release the handle, if any. Safe to call repeatedly.
    pub fn close_driver(&mut self) {
        if let Some(handle) = self.handle.take() {
            drop(handle);
            portio_log!(Level::Debug, "service", "Closed {} driver handle", self.identity.name());
        }
        self.state = DriverState::Closed;
    }
}

impl Drop for DriverLifecycle {
    fn drop(&mut self) {
        self.close_driver();
    }
}
