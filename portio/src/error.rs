//! Error taxonomy for the port I/O library.
//!
//! These errors exist for the `try_*` API and for logging. The compatibility
//! surface (`read_port_byte` and friends, and the C exports) reduces every
//! one of them to a zero value, `false`, or a dropped write.

use std::io;
use std::path::PathBuf;

use shared::wire::WireError;
use thiserror::Error;

use crate::config::ConfigError;
use crate::service::StartCode;

#[derive(Debug, Error)]
pub enum PortIoError {
    /// Elevation is required; never retried automatically.
    #[error("access denied by the service control manager (code {})", .code.as_u32())]
    AccessDenied { code: StartCode },

    #[error("driver service failed to start (code {})", .code.as_u32())]
    ServiceStartFailed { code: StartCode },

    #[error("driver image for `{0}` is not available")]
    ResourceMissing(String),

    #[error("cannot write driver image {}: {source}", .path.display())]
    ImageWriteFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot open driver device {path}: {source}")]
    DeviceOpenFailed {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("device control {request} failed: {source}")]
    DeviceIoFailed {
        request: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("malformed driver response: {0}")]
    Protocol(#[from] WireError),

    #[error("driver device is not open")]
    DriverNotOpen,

    #[error("operation not supported on this platform")]
    Unsupported,

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl PortIoError {
    /// Numeric start code carried by lifecycle failures.
    pub fn start_code(&self) -> Option<StartCode> {
        match self {
            PortIoError::AccessDenied { code } | PortIoError::ServiceStartFailed { code } => {
                Some(*code)
            }
            _ => None,
        }
    }

    /// `true` when re-running with administrator rights may succeed.
    pub fn requires_elevation(&self) -> bool {
        matches!(self, PortIoError::AccessDenied { .. })
    }
}

pub type Result<T> = std::result::Result<T, PortIoError>;
