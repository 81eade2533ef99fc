//! Service Control Manager primitives.
//!
//! The lifecycle only ever needs four things from the SCM: open the manager,
//! open a service, create a service, start it. Handles close on drop.

use std::{io, path::PathBuf, sync::Arc};

use thiserror::Error;

/// `ERROR_ACCESS_DENIED`
pub const ERROR_ACCESS_DENIED: i32 = 5;
/// `ERROR_SERVICE_ALREADY_RUNNING`
pub const ERROR_SERVICE_ALREADY_RUNNING: i32 = 1056;
/// `ERROR_SERVICE_DOES_NOT_EXIST`
pub const ERROR_SERVICE_DOES_NOT_EXIST: i32 = 1060;
/// `ERROR_SERVICE_EXISTS`
pub const ERROR_SERVICE_EXISTS: i32 = 1073;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerAccess {
    /// Connect and create services (`SC_MANAGER_ALL_ACCESS` in practice).
    Full,
    /// Connect and enumerate only (`GENERIC_READ`).
    ReadOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceRights {
    Full,
    /// Start only (`GENERIC_EXECUTE`).
    ExecuteOnly,
}

/// Kernel driver, auto start, normal error control: the only kind of
/// service this library registers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRegistration {
    pub name: String,
    pub display_name: String,
    /// Relative to the Windows directory, e.g. `System32\Drivers\inpoutx64.sys`.
    pub binary_path: PathBuf,
}

#[derive(Debug, Error)]
pub enum ScmError {
    #[error("access denied")]
    AccessDenied,
    #[error("service does not exist")]
    NotFound,
    #[error("service already exists")]
    AlreadyExists,
    #[error("service already running")]
    AlreadyRunning,
    #[error(transparent)]
    Os(io::Error),
}

impl From<io::Error> for ScmError {
    fn from(e: io::Error) -> Self {
        match e.raw_os_error() {
            Some(ERROR_ACCESS_DENIED) => ScmError::AccessDenied,
            Some(ERROR_SERVICE_DOES_NOT_EXIST) => ScmError::NotFound,
            Some(ERROR_SERVICE_EXISTS) => ScmError::AlreadyExists,
            Some(ERROR_SERVICE_ALREADY_RUNNING) => ScmError::AlreadyRunning,
            _ => ScmError::Os(e),
        }
    }
}

pub trait ServiceControl: Send + Sync {
    fn open_manager(&self, access: ManagerAccess) -> Result<Box<dyn ManagerHandle>, ScmError>;
}

pub trait ManagerHandle {
    fn open_service(&self, name: &str, rights: ServiceRights) -> Result<Box<dyn ServiceHandle>, ScmError>;
    fn create_service(&self, registration: &ServiceRegistration) -> Result<Box<dyn ServiceHandle>, ScmError>;
}

pub trait ServiceHandle {
    fn start(&self) -> Result<(), ScmError>;
}

impl<T: ServiceControl + ?Sized> ServiceControl for Arc<T> {
    fn open_manager(&self, access: ManagerAccess) -> Result<Box<dyn ManagerHandle>, ScmError> {
        (**self).open_manager(access)
    }
}

/// SCM stand-in for platforms that have none.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoServices;

impl ServiceControl for NoServices {
    fn open_manager(&self, _access: ManagerAccess) -> Result<Box<dyn ManagerHandle>, ScmError> {
        Err(ScmError::Os(io::Error::new(
            io::ErrorKind::Unsupported,
            "no service control manager on this platform",
        )))
    }
}

/// SCM backend for the running OS.
pub fn native() -> Box<dyn ServiceControl> {
    #[cfg(windows)]
    {
        Box::new(windows::WindowsServices)
    }
    #[cfg(not(windows))]
    {
        Box::new(NoServices)
    }
}

/*──────────────────────────── windows-service backend ───────────────────*/

#[cfg(windows)]
pub mod windows {
    use std::ffi::{OsStr, OsString};

    use windows_service::{
        service::{
            Service, ServiceAccess, ServiceErrorControl, ServiceInfo, ServiceStartType,
            ServiceType,
        },
        service_manager::{ServiceManager, ServiceManagerAccess},
    };

    use super::*;

    impl From<windows_service::Error> for ScmError {
        fn from(e: windows_service::Error) -> Self {
            match e {
                windows_service::Error::Winapi(io) => ScmError::from(io),
                other => ScmError::Os(io::Error::other(other.to_string())),
            }
        }
    }

    #[derive(Debug, Default, Clone, Copy)]
    pub struct WindowsServices;

    impl ServiceControl for WindowsServices {
        fn open_manager(&self, access: ManagerAccess) -> Result<Box<dyn ManagerHandle>, ScmError> {
            let access = match access {
                ManagerAccess::Full => {
                    ServiceManagerAccess::CONNECT | ServiceManagerAccess::CREATE_SERVICE
                }
                ManagerAccess::ReadOnly => {
                    ServiceManagerAccess::CONNECT | ServiceManagerAccess::ENUMERATE_SERVICE
                }
            };
            let manager = ServiceManager::local_computer(None::<&str>, access)?;
            Ok(Box::new(manager))
        }
    }

    impl ManagerHandle for ServiceManager {
        fn open_service(&self, name: &str, rights: ServiceRights) -> Result<Box<dyn ServiceHandle>, ScmError> {
            let access = match rights {
                ServiceRights::Full => ServiceAccess::all(),
                ServiceRights::ExecuteOnly => ServiceAccess::START,
            };
            let service = ServiceManager::open_service(self, name, access)?;
            Ok(Box::new(service))
        }

        fn create_service(&self, registration: &ServiceRegistration) -> Result<Box<dyn ServiceHandle>, ScmError> {
            let info = ServiceInfo {
                name: OsString::from(&registration.name),
                display_name: OsString::from(&registration.display_name),
                service_type: ServiceType::KERNEL_DRIVER,
                start_type: ServiceStartType::AutoStart,
                error_control: ServiceErrorControl::Normal,
                executable_path: registration.binary_path.clone(),
                launch_arguments: vec![],
                dependencies: vec![],
                account_name: None,
                account_password: None,
            };
            let service = ServiceManager::create_service(self, &info, ServiceAccess::all())?;
            Ok(Box::new(service))
        }
    }

    impl ServiceHandle for Service {
        fn start(&self) -> Result<(), ScmError> {
            Service::start::<&OsStr>(self, &[])?;
            Ok(())
        }
    }
}
