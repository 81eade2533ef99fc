// src/exports.rs
//! C ABI of the drop-in `inpout32.dll` / `inpoutx64.dll` replacement.
//!
//! The one process-wide [`PortIo`] lives here, created on process attach and
//! dropped on detach. Everything below reads it under a shared lock; only
//! attach and detach take the write lock.

use std::ffi::c_void;
use std::path::PathBuf;
use std::sync::{PoisonError, RwLock};

use windows_sys::Win32::{
    Foundation::{BOOL, FALSE, HANDLE, HINSTANCE, HMODULE, MAX_PATH, TRUE},
    System::{
        LibraryLoader::GetModuleFileNameW,
        SystemServices::{DLL_PROCESS_ATTACH, DLL_PROCESS_DETACH},
    },
};

use crate::port_io::PortIo;

const CONFIG_FILE: &str = "portio.toml";

static CONTEXT: RwLock<Option<PortIo>> = RwLock::new(None);

fn with_context<T: Default>(f: impl FnOnce(&PortIo) -> T) -> T {
    let guard = CONTEXT.read().unwrap_or_else(PoisonError::into_inner);
    guard.as_ref().map(f).unwrap_or_default()
}

fn to_bool(b: bool) -> BOOL {
    if b { TRUE } else { FALSE }
}

/// Directory holding this DLL.
fn module_dir(module: HMODULE) -> Option<PathBuf> {
    let mut buf = vec![0u16; MAX_PATH as usize];
    let len = unsafe { GetModuleFileNameW(module, buf.as_mut_ptr(), buf.len() as u32) } as usize;
    if len == 0 || len >= buf.len() {
        return None;
    }
    let path = PathBuf::from(String::from_utf16_lossy(&buf[..len]));
    path.parent().map(PathBuf::from)
}

fn attach(module: HMODULE) {
    let dir = module_dir(module).unwrap_or_else(|| PathBuf::from("."));
    let context = PortIo::from_config_path_or_default(&dir.join(CONFIG_FILE));
    *CONTEXT.write().unwrap_or_else(PoisonError::into_inner) = Some(context);
}

fn detach() {
    let context = CONTEXT.write().unwrap_or_else(PoisonError::into_inner).take();
    drop(context);
}

#[unsafe(no_mangle)]
pub extern "system" fn DllMain(module: HINSTANCE, reason: u32, _reserved: *mut c_void) -> BOOL {
    match reason {
        DLL_PROCESS_ATTACH => attach(module),
        DLL_PROCESS_DETACH => detach(),
        _ => {}
    }
    TRUE
}

/*──────────────────────────── classic entry points ──────────────────────*/

#[unsafe(no_mangle)]
pub extern "system" fn Out32(port: i16, data: i16) {
    with_context(|io| io.write_port_byte(port as u16, data as u8))
}

#[unsafe(no_mangle)]
pub extern "system" fn Inp32(port: i16) -> i16 {
    with_context(|io| io.read_port_byte(port as u16) as i16)
}

#[unsafe(no_mangle)]
pub extern "system" fn IsInpOutDriverOpen() -> BOOL {
    to_bool(with_context(PortIo::is_driver_open))
}

#[unsafe(no_mangle)]
pub extern "system" fn IsXP64Bit() -> BOOL {
    to_bool(with_context(PortIo::is_64bit_os))
}

/*──────────────────────────── DLPortIO compatible ───────────────────────*/

#[unsafe(no_mangle)]
pub extern "system" fn DlPortReadPortUchar(port: u16) -> u8 {
    with_context(|io| io.read_port_byte(port))
}

#[unsafe(no_mangle)]
pub extern "system" fn DlPortWritePortUchar(port: u16, value: u8) {
    with_context(|io| io.write_port_byte(port, value))
}

#[unsafe(no_mangle)]
pub extern "system" fn DlPortReadPortUshort(port: u16) -> u16 {
    with_context(|io| io.read_port_word(port))
}

#[unsafe(no_mangle)]
pub extern "system" fn DlPortWritePortUshort(port: u16, value: u16) {
    with_context(|io| io.write_port_word(port, value))
}

/// The port space is 16 bits wide; the upper half of `port` is ignored.
#[unsafe(no_mangle)]
pub extern "system" fn DlPortReadPortUlong(port: u32) -> u32 {
    with_context(|io| io.read_port_ulong(port as u16))
}

#[unsafe(no_mangle)]
pub extern "system" fn DlPortWritePortUlong(port: u32, value: u32) {
    with_context(|io| io.write_port_ulong(port as u16, value))
}

/*──────────────────────────── WinIo compatible ──────────────────────────*/

/// # Safety
/// `handle_out` must be null or valid for a `HANDLE` write.
#[unsafe(no_mangle)]
pub unsafe extern "system" fn MapPhysToLin(physical: *mut u8, size: u32, handle_out: *mut HANDLE) -> *mut u8 {
    let mapping = with_context(|io| io.map_physical_to_linear(physical as usize, size as usize));
    if mapping.is_null() {
        return std::ptr::null_mut();
    }
    if !handle_out.is_null() {
        unsafe { handle_out.write(mapping.handle as HANDLE) };
    }
    mapping.linear as *mut u8
}

#[unsafe(no_mangle)]
pub extern "system" fn UnmapPhysicalMemory(handle: HANDLE, linear: *mut u8) -> BOOL {
    to_bool(with_context(|io| io.unmap_physical(handle as usize, linear as usize)))
}

/// # Safety
/// `value_out` must be null or valid for a `u32` write.
#[unsafe(no_mangle)]
pub unsafe extern "system" fn GetPhysLong(physical: *mut u8, value_out: *mut u32) -> BOOL {
    match with_context(|io| io.get_physical_long(physical as usize)) {
        Some(value) if !value_out.is_null() => {
            unsafe { value_out.write(value) };
            TRUE
        }
        _ => FALSE,
    }
}

#[unsafe(no_mangle)]
pub extern "system" fn SetPhysLong(physical: *mut u8, value: u32) -> BOOL {
    to_bool(with_context(|io| io.set_physical_long(physical as usize, value)))
}
