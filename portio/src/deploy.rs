//! Driver image deployment.
//!
//! Copies the driver binary matching the OS bitness to
//! `<system dir>\Drivers\<name>.sys`, replacing whatever is there. Failure is
//! logged and otherwise ignored: a missing or unwritable image shows up as
//! the subsequent service start failing.

use std::{
    borrow::Cow,
    fs,
    path::PathBuf,
    sync::Arc,
};

use log::Level;
use shared::constants::DRIVERS_SUBDIR;

use crate::compat::CompatShim;
use crate::error::{PortIoError, Result};
use crate::platform::{Bitness, DriverIdentity, PlatformApi};
use crate::portio_log;

/*──────────────────────────── image sources ─────────────────────────────*/

/// Where driver binaries come from, keyed by file name (`inpoutx64.sys`).
pub trait ImageSource: Send + Sync {
    fn image(&self, file_name: &str) -> Option<Cow<'_, [u8]>>;
}

impl<T: ImageSource + ?Sized> ImageSource for Arc<T> {
    fn image(&self, file_name: &str) -> Option<Cow<'_, [u8]>> {
        (**self).image(file_name)
    }
}

/// Images compiled into the host binary with `include_bytes!`.
#[derive(Debug, Default, Clone)]
pub struct EmbeddedImages {
    images: Vec<(String, &'static [u8])>,
}

impl EmbeddedImages {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, file_name: impl Into<String>, bytes: &'static [u8]) -> Self {
        self.images.push((file_name.into(), bytes));
        self
    }
}

impl ImageSource for EmbeddedImages {
    fn image(&self, file_name: &str) -> Option<Cow<'_, [u8]>> {
        self.images
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(file_name))
            .map(|(_, bytes)| Cow::Borrowed(*bytes))
    }
}

/// Images read from a directory at deployment time.
#[derive(Debug, Clone)]
pub struct DirectoryImages {
    dir: PathBuf,
}

impl DirectoryImages {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl ImageSource for DirectoryImages {
    fn image(&self, file_name: &str) -> Option<Cow<'_, [u8]>> {
        let path = self.dir.join(file_name);
        match fs::read(&path) {
            Ok(bytes) => Some(Cow::Owned(bytes)),
            Err(e) => {
                portio_log!(Level::Debug, "deploy", "Cannot read {:?}: {}", path, e);
                None
            }
        }
    }
}

/*──────────────────────────── deployer ──────────────────────────────────*/

pub struct Deployer<'a> {
    api: &'a dyn PlatformApi,
    images: &'a dyn ImageSource,
}

impl<'a> Deployer<'a> {
    pub fn new(api: &'a dyn PlatformApi, images: &'a dyn ImageSource) -> Self {
        Self { api, images }
    }

    /// `<system dir>\Drivers\<name>.sys`
    pub fn target_path(&self, identity: &DriverIdentity) -> Option<PathBuf> {
        self.api
            .system_directory()
            .map(|dir| dir.join(DRIVERS_SUBDIR).join(identity.image_file_name()))
    }

    /// Write the image; returns `false` on any failure.
    pub fn deploy(&self, bitness: Bitness, identity: &DriverIdentity) -> bool {
        match self.try_deploy(bitness, identity) {
            Ok(path) => {
                portio_log!(Level::Info, "deploy", "Driver image written to {:?}", path);
                true
            }
            Err(e) => {
                portio_log!(Level::Warn, "deploy", "Driver image for {} not deployed: {}", identity.name(), e);
                false
            }
        }
    }

    pub fn try_deploy(&self, bitness: Bitness, identity: &DriverIdentity) -> Result<PathBuf> {
        let file_name = identity.image_file_name();
        let bytes = self
            .images
            .image(&file_name)
            .ok_or_else(|| PortIoError::ResourceMissing(file_name.clone()))?;
        let target = self
            .target_path(identity)
            .ok_or(PortIoError::Unsupported)?;

        let shim = CompatShim::new(self.api, bitness);
        let guard = shim.enter();
        let written = fs::write(&target, &bytes);
        guard.leave();

        written.map_err(|source| PortIoError::ImageWriteFailed { path: target.clone(), source })?;
        Ok(target)
    }
}
