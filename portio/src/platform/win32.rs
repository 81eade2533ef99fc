//! Win32 implementation of [`PlatformApi`].
//!
//! The WOW64 entry points are looked up in kernel32 at runtime: they do not
//! exist on every Windows release this library may load on.

use std::{
    ffi::{OsStr, OsString, c_void},
    mem,
    os::windows::prelude::{OsStrExt, OsStringExt},
    path::PathBuf,
};
use windows_sys::Win32::{
    Foundation::{BOOL, HANDLE, MAX_PATH},
    System::{
        LibraryLoader::{GetModuleHandleW, GetProcAddress},
        SystemInformation::{GetSystemDirectoryW, GetVersionExW, OSVERSIONINFOW},
        Threading::GetCurrentProcess,
    },
};

use super::{PlatformApi, RedirectionToken};

type IsWow64ProcessFn = unsafe extern "system" fn(HANDLE, *mut BOOL) -> BOOL;
type Wow64DisableFn = unsafe extern "system" fn(*mut *mut c_void) -> BOOL;
type Wow64RevertFn = unsafe extern "system" fn(*mut c_void) -> BOOL;

/// Null-terminated UTF-16 copy of `s` for Win32 calls.
pub(crate) fn to_wide(s: impl AsRef<OsStr>) -> Vec<u16> {
    s.as_ref().encode_wide().chain(Some(0)).collect()
}

pub struct Win32Platform {
    is_wow64: Option<IsWow64ProcessFn>,
    disable: Option<Wow64DisableFn>,
    revert: Option<Wow64RevertFn>,
}

impl Win32Platform {
    /// Resolve the optional kernel32 exports once.
    pub fn resolve() -> Self {
        let kernel32 = to_wide("kernel32");
        let module = unsafe { GetModuleHandleW(kernel32.as_ptr()) };
        if module.is_null() {
            return Self { is_wow64: None, disable: None, revert: None };
        }

        // SAFETY: each symbol is transmuted to the signature documented for it.
        unsafe {
            Self {
                is_wow64: GetProcAddress(module, b"IsWow64Process\0".as_ptr())
                    .map(|f| mem::transmute::<_, IsWow64ProcessFn>(f)),
                disable: GetProcAddress(module, b"Wow64DisableWow64FsRedirection\0".as_ptr())
                    .map(|f| mem::transmute::<_, Wow64DisableFn>(f)),
                revert: GetProcAddress(module, b"Wow64RevertWow64FsRedirection\0".as_ptr())
                    .map(|f| mem::transmute::<_, Wow64RevertFn>(f)),
            }
        }
    }
}

impl PlatformApi for Win32Platform {
    fn platform_id(&self) -> Option<u32> {
        let mut info: OSVERSIONINFOW = unsafe { mem::zeroed() };
        info.dwOSVersionInfoSize = mem::size_of::<OSVERSIONINFOW>() as u32;
        if unsafe { GetVersionExW(&mut info) } == 0 {
            return None;
        }
        Some(info.dwPlatformId)
    }

    fn is_wow64_process(&self) -> Option<bool> {
        let f = self.is_wow64?;
        let mut wow64: BOOL = 0;
        if unsafe { f(GetCurrentProcess(), &mut wow64) } == 0 {
            return None;
        }
        Some(wow64 != 0)
    }

    fn disable_fs_redirection(&self) -> Option<RedirectionToken> {
        let f = self.disable?;
        let mut old: *mut c_void = std::ptr::null_mut();
        if unsafe { f(&mut old) } == 0 {
            return None;
        }
        Some(RedirectionToken(old as usize))
    }

    fn revert_fs_redirection(&self, token: RedirectionToken) -> bool {
        match self.revert {
            Some(f) => unsafe { f(token.0 as *mut c_void) != 0 },
            None => false,
        }
    }

    fn system_directory(&self) -> Option<PathBuf> {
        let mut buf = vec![0u16; MAX_PATH as usize];
        let len = unsafe { GetSystemDirectoryW(buf.as_mut_ptr(), buf.len() as u32) } as usize;
        if len == 0 || len > buf.len() {
            return None;
        }
        buf.truncate(len);
        Some(PathBuf::from(OsString::from_wide(&buf)))
    }
}
