// src/port_io.rs
//! Port I/O façade.
//!
//! [`PortIo`] is the process context: OS classification and bitness are
//! probed once when it is built, and the driver lifecycle lives inside it.
//! Every operation dispatches on the cached classification:
//!
//! | OS         | byte ports        | word / ulong ports | physical memory |
//! |------------|-------------------|--------------------|-----------------|
//! | Legacy9x   | `in` / `out`      | `Unsupported`      | `Unsupported`   |
//! | ModernNt   | driver IOCTL      | driver IOCTL       | driver IOCTL    |
//! | Unknown    | `Unsupported`     | `Unsupported`      | `Unsupported`   |
//!
//! The `try_*` methods report why something failed. The plain methods are
//! the long-standing contract: reads yield 0 and writes are dropped.

use std::path::Path;

use anyhow::Context;
use log::Level;

use crate::comms::{self, DeviceOpener, DriverClient};
use crate::config::{self, Config, DriverConfig};
use crate::deploy::{Deployer, DirectoryImages, EmbeddedImages, ImageSource};
use crate::direct::{self, PortInstructions};
use crate::error::{PortIoError, Result};
use crate::logging;
use crate::platform::{self, classify_os, Bitness, DriverIdentity, OsClassification, PlatformApi};
use crate::portio_log;
use crate::service::{scm, DriverLifecycle, DriverState, ServiceControl};

/*──────────────────────────── builder ───────────────────────────────────*/

/// Collects the OS backends; anything left unset uses the native one.
pub struct PortIoBuilder {
    config: DriverConfig,
    platform: Option<Box<dyn PlatformApi>>,
    services: Option<Box<dyn ServiceControl>>,
    devices: Option<Box<dyn DeviceOpener>>,
    images: Option<Box<dyn ImageSource>>,
    direct: Option<Option<Box<dyn PortInstructions>>>,
    bitness: Option<Bitness>,
}

impl PortIoBuilder {
    pub fn new(config: DriverConfig) -> Self {
        Self {
            config,
            platform: None,
            services: None,
            devices: None,
            images: None,
            direct: None,
            bitness: None,
        }
    }

    pub fn platform(mut self, api: impl PlatformApi + 'static) -> Self {
        self.platform = Some(Box::new(api));
        self
    }

    pub fn services(mut self, scm: impl ServiceControl + 'static) -> Self {
        self.services = Some(Box::new(scm));
        self
    }

    pub fn devices(mut self, opener: impl DeviceOpener + 'static) -> Self {
        self.devices = Some(Box::new(opener));
        self
    }

    pub fn images(mut self, images: impl ImageSource + 'static) -> Self {
        self.images = Some(Box::new(images));
        self
    }

    /// Port instructions for the Legacy9x path; `None` disables it.
    pub fn direct_ports(mut self, ports: Option<Box<dyn PortInstructions>>) -> Self {
        self.direct = Some(ports);
        self
    }

    /// Skip bitness detection.
    pub fn bitness(mut self, bitness: Bitness) -> Self {
        self.bitness = Some(bitness);
        self
    }

    /// Probe the platform and assemble the context without opening anything.
    pub fn build(self) -> PortIo {
        let platform = self.platform.unwrap_or_else(platform::native);
        let os = classify_os(platform.as_ref());
        let bitness = self.bitness.unwrap_or_else(|| Bitness::detect(platform.as_ref()));
        let identity = bitness.identity(&self.config);

        let images: Box<dyn ImageSource> = match (self.images, &self.config.image_dir) {
            (Some(images), _) => images,
            (None, Some(dir)) => Box::new(DirectoryImages::new(dir)),
            (None, None) => Box::new(EmbeddedImages::new()),
        };
        let direct = match self.direct {
            Some(ports) => ports,
            None if os == OsClassification::Legacy9x => direct::detect(),
            None => None,
        };

        let lifecycle = DriverLifecycle::new(
            self.services.unwrap_or_else(scm::native),
            self.devices.unwrap_or_else(comms::ioctl::native),
            identity,
            self.config.install,
        );

        portio_log!(
            Level::Debug,
            "port_io",
            "OS {:?}, bitness {:?}, driver {}",
            os,
            bitness,
            lifecycle.identity().name()
        );

        PortIo { os, bitness, platform, images, lifecycle, direct }
    }

    /// Build, then open the driver on NT. Failure is logged and leaves the
    /// context usable; I/O then returns the silent sentinels.
    pub fn attach(self) -> PortIo {
        let mut io = self.build();
        if io.os == OsClassification::ModernNt {
            if let Err(e) = io.open_driver() {
                portio_log!(Level::Warn, "port_io", "Driver not available: {}", e);
            }
        }
        io
    }
}

/*──────────────────────────── context ───────────────────────────────────*/

pub struct PortIo {
    os: OsClassification,
    bitness: Bitness,
    platform: Box<dyn PlatformApi>,
    images: Box<dyn ImageSource>,
    lifecycle: DriverLifecycle,
    direct: Option<Box<dyn PortInstructions>>,
}

impl PortIo {
    pub fn builder(config: DriverConfig) -> PortIoBuilder {
        PortIoBuilder::new(config)
    }

    /// Native backends, configured from the TOML file at `path` (defaults
    /// when it does not exist), with logging installed and the driver opened.
    pub fn from_config_path(path: &Path) -> anyhow::Result<Self> {
        let cfg = config::load_or_default(path)
            .with_context(|| format!("loading config from {}", path.display()))?;
        Ok(Self::from_config(path, cfg))
    }

    /// As [`PortIo::from_config_path`], but a bad file only costs the
    /// settings in it: the error is logged and the defaults are used.
    pub fn from_config_path_or_default(path: &Path) -> Self {
        match Self::from_config_path(path) {
            Ok(io) => io,
            Err(e) => {
                let io = Self::from_config(path, Config::default());
                portio_log!(Level::Error, "port_io", "{:#}; using defaults", e);
                io
            }
        }
    }

    fn from_config(path: &Path, cfg: Config) -> Self {
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        if let Err(e) = logging::init(base_dir, &cfg.logging) {
            // Host already installed a logger.
            portio_log!(Level::Debug, "port_io", "Logger not installed: {}", e);
        }
        PortIoBuilder::new(cfg.driver).attach()
    }

    pub fn os(&self) -> OsClassification {
        self.os
    }

    pub fn bitness(&self) -> Bitness {
        self.bitness
    }

    pub fn driver_state(&self) -> DriverState {
        self.lifecycle.state()
    }

    pub fn identity(&self) -> &DriverIdentity {
        self.lifecycle.identity()
    }

    /// Run the open/install/retry state machine. Legacy9x needs no driver.
    pub fn open_driver(&mut self) -> Result<()> {
        match self.os {
            OsClassification::ModernNt => {
                let deployer = Deployer::new(self.platform.as_ref(), self.images.as_ref());
                self.lifecycle.open_driver(&deployer, self.bitness)
            }
            OsClassification::Legacy9x => Ok(()),
            OsClassification::Unknown => Err(PortIoError::Unsupported),
        }
    }

    pub fn close(&mut self) {
        self.lifecycle.close_driver();
    }

    pub fn is_driver_open(&self) -> bool {
        match self.os {
            OsClassification::Legacy9x => true,
            OsClassification::ModernNt => self.lifecycle.is_open(),
            OsClassification::Unknown => false,
        }
    }

    pub fn is_64bit_os(&self) -> bool {
        self.bitness.is_64bit_os()
    }

    /// Client for the open driver; NT only.
    pub(crate) fn driver(&self) -> Result<DriverClient<'_>> {
        match self.os {
            OsClassification::ModernNt => self
                .lifecycle
                .channel()
                .map(DriverClient::new)
                .ok_or(PortIoError::DriverNotOpen),
            _ => Err(PortIoError::Unsupported),
        }
    }

    fn direct(&self) -> Result<&dyn PortInstructions> {
        self.direct.as_deref().ok_or(PortIoError::Unsupported)
    }

    /*──────────────── try_* ────────────────*/

    pub fn try_read_port_byte(&self, port: u16) -> Result<u8> {
        match self.os {
            OsClassification::Legacy9x => Ok(self.direct()?.read_byte(port)),
            OsClassification::ModernNt => self.driver()?.read_byte(port),
            OsClassification::Unknown => Err(PortIoError::Unsupported),
        }
    }

    pub fn try_write_port_byte(&self, port: u16, value: u8) -> Result<()> {
        match self.os {
            OsClassification::Legacy9x => {
                self.direct()?.write_byte(port, value);
                Ok(())
            }
            OsClassification::ModernNt => self.driver()?.write_byte(port, value),
            OsClassification::Unknown => Err(PortIoError::Unsupported),
        }
    }

    pub fn try_read_port_word(&self, port: u16) -> Result<u16> {
        self.driver()?.read_word(port)
    }

    pub fn try_write_port_word(&self, port: u16, value: u16) -> Result<()> {
        self.driver()?.write_word(port, value)
    }

    pub fn try_read_port_ulong(&self, port: u16) -> Result<u32> {
        self.driver()?.read_ulong(port)
    }

    pub fn try_write_port_ulong(&self, port: u16, value: u32) -> Result<()> {
        self.driver()?.write_ulong(port, value)
    }

    /*──────────────── compatibility ────────────────*/

    pub fn read_port_byte(&self, port: u16) -> u8 {
        silent("read_port_byte", self.try_read_port_byte(port))
    }

    pub fn write_port_byte(&self, port: u16, value: u8) {
        silent("write_port_byte", self.try_write_port_byte(port, value))
    }

    pub fn read_port_word(&self, port: u16) -> u16 {
        silent("read_port_word", self.try_read_port_word(port))
    }

    pub fn write_port_word(&self, port: u16, value: u16) {
        silent("write_port_word", self.try_write_port_word(port, value))
    }

    pub fn read_port_ulong(&self, port: u16) -> u32 {
        silent("read_port_ulong", self.try_read_port_ulong(port))
    }

    pub fn write_port_ulong(&self, port: u16, value: u32) {
        silent("write_port_ulong", self.try_write_port_ulong(port, value))
    }
}

impl Drop for PortIo {
    fn drop(&mut self) {
        self.close();
    }
}

/// Reduce a failure to the type's zero value.
pub(crate) fn silent<T: Default>(op: &str, result: Result<T>) -> T {
    result.unwrap_or_else(|e| {
        portio_log!(Level::Trace, "port_io", "{} failed: {}", op, e);
        T::default()
    })
}
