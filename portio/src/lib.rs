// src/lib.rs
// ────────────────────────────────────────────────────────────────────────────
// Public library entry point.  Re-export everything for the C-ABI surface and
// integration tests.

pub mod macros;

pub mod comms;
pub mod compat;
pub mod config;
pub mod deploy;
pub mod direct;
pub mod error;
pub mod logging;
pub mod physical;
pub mod platform;
pub mod port_io;
pub mod service;

#[cfg(all(windows, feature = "exports"))]
pub mod exports;

pub use error::{PortIoError, Result};
pub use physical::PhysicalMapping;
pub use platform::{Bitness, OsClassification};
pub use port_io::{PortIo, PortIoBuilder};
pub use service::{DriverState, StartCode};
