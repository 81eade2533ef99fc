//! Platform probe: OS family, process bitness, and the optional OS entry
//! points the rest of the library needs.
//!
//! Every OS capability sits behind [`PlatformApi`]. The default
//! implementation answers "not available" to everything, so code paths can
//! be exercised without touching the real OS.

#[cfg(windows)]
pub mod win32;

use std::path::PathBuf;
use std::sync::Arc;

use shared::constants::{
    DEVICE_PATH_PREFIX, DRIVER_IMAGE_EXT, SERVICE_BINARY_PREFIX,
};

use crate::config::DriverConfig;

/// `dwPlatformId` values reported by the version query.
pub const VER_PLATFORM_WIN32_WINDOWS: u32 = 1;
pub const VER_PLATFORM_WIN32_NT: u32 = 2;

/// True when this library was built for a 64-bit target.
pub const NATIVE_64: bool = cfg!(target_pointer_width = "64");

/*──────────────────────────── capabilities ──────────────────────────────*/

/// Saved file-system redirection state, handed back on revert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedirectionToken(pub usize);

/// OS entry points, each of which may be absent at runtime.
pub trait PlatformApi: Send + Sync {
    /// `dwPlatformId` from the version query.
    fn platform_id(&self) -> Option<u32> {
        None
    }

    /// `IsWow64Process` for the current process.
    fn is_wow64_process(&self) -> Option<bool> {
        None
    }

    /// `Wow64DisableWow64FsRedirection`.
    fn disable_fs_redirection(&self) -> Option<RedirectionToken> {
        None
    }

    /// `Wow64RevertWow64FsRedirection`; `true` on success.
    fn revert_fs_redirection(&self, _token: RedirectionToken) -> bool {
        false
    }

    /// `GetSystemDirectory`, e.g. `C:\Windows\System32`.
    fn system_directory(&self) -> Option<PathBuf> {
        None
    }
}

/// Every capability absent.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullPlatform;

impl PlatformApi for NullPlatform {}

impl<T: PlatformApi + ?Sized> PlatformApi for Arc<T> {
    fn platform_id(&self) -> Option<u32> {
        (**self).platform_id()
    }
    fn is_wow64_process(&self) -> Option<bool> {
        (**self).is_wow64_process()
    }
    fn disable_fs_redirection(&self) -> Option<RedirectionToken> {
        (**self).disable_fs_redirection()
    }
    fn revert_fs_redirection(&self, token: RedirectionToken) -> bool {
        (**self).revert_fs_redirection(token)
    }
    fn system_directory(&self) -> Option<PathBuf> {
        (**self).system_directory()
    }
}

/// Platform backend for the running OS.
pub fn native() -> Box<dyn PlatformApi> {
    #[cfg(windows)]
    {
        Box::new(win32::Win32Platform::resolve())
    }
    #[cfg(not(windows))]
    {
        Box::new(NullPlatform)
    }
}

/*──────────────────────────── classification ────────────────────────────*/

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsClassification {
    /// Windows 95/98/ME: port instructions run directly.
    Legacy9x,
    /// NT family: everything goes through the driver.
    ModernNt,
    /// No privileged path available.
    Unknown,
}

pub fn classify_os(api: &dyn PlatformApi) -> OsClassification {
    match api.platform_id() {
        Some(VER_PLATFORM_WIN32_NT) => OsClassification::ModernNt,
        Some(VER_PLATFORM_WIN32_WINDOWS) => OsClassification::Legacy9x,
        _ => OsClassification::Unknown,
    }
}

/// True on a 64-bit OS as seen from this process.
///
/// A 64-bit build answers true without asking: it can only be running
/// natively on a 64-bit OS. The name is historical; callers use it as
/// "is the OS 64-bit".
pub fn is_wow64_emulated(api: &dyn PlatformApi) -> bool {
    wow64_for(NATIVE_64, api)
}

pub(crate) fn wow64_for(native_64: bool, api: &dyn PlatformApi) -> bool {
    native_64 || api.is_wow64_process().unwrap_or(false)
}

/*──────────────────────────── bitness ───────────────────────────────────*/

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bitness {
    X86,
    X64,
    /// 32-bit process on a 64-bit OS.
    Wow64,
}

impl Bitness {
    pub fn detect(api: &dyn PlatformApi) -> Self {
        Self::resolve(NATIVE_64, wow64_for(NATIVE_64, api))
    }

    pub fn resolve(native_64: bool, wow64: bool) -> Self {
        match (native_64, wow64) {
            (true, _) => Bitness::X64,
            (false, true) => Bitness::Wow64,
            (false, false) => Bitness::X86,
        }
    }

    pub fn is_64bit_os(self) -> bool {
        matches!(self, Bitness::X64 | Bitness::Wow64)
    }

    /// File writes into System32 must bypass WOW64 redirection.
    pub fn needs_redirection_bypass(self) -> bool {
        self == Bitness::Wow64
    }

    /// A 64-bit OS always gets the 64-bit driver, whatever our own width.
    pub fn identity(self, cfg: &DriverConfig) -> DriverIdentity {
        let name = if self.is_64bit_os() { &cfg.name_x64 } else { &cfg.name_x86 };
        DriverIdentity::new(name.clone())
    }
}

/*──────────────────────────── identity ──────────────────────────────────*/

/// Service name, device name and image name all derive from one string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverIdentity {
    name: String,
}

impl DriverIdentity {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `\\.\<name>`
    pub fn device_path(&self) -> String {
        format!("{DEVICE_PATH_PREFIX}{}", self.name)
    }

    /// `<name>.sys`
    pub fn image_file_name(&self) -> String {
        format!("{}.{DRIVER_IMAGE_EXT}", self.name)
    }

    /// `System32\Drivers\<name>.sys`, as registered with the SCM.
    pub fn service_binary_path(&self) -> PathBuf {
        PathBuf::from(format!("{SERVICE_BINARY_PREFIX}{}", self.image_file_name()))
    }
}
