//! IOCTL communication interface with the kernel driver.
//!
//! This module wraps low-level Windows DeviceIoControl operations,
//! providing a safe Rust interface to the InpOut driver protocol.
//!
//! Key responsibilities:
//! - Open a handle to the driver device (`\\.\<name>`).
//! - Encode typed requests into the frozen byte layouts from `shared::wire`.
//! - Decode the single value each response carries.
//! - Turn OS failures into `PortIoError::DeviceIoFailed`.
//!
//! No locking happens here: concurrent callers each get their own exchange
//! with the driver, and ordering across ports is theirs to arrange.

use std::{io, sync::Arc};

use log::Level;
use shared::ioctl::{self, *};
use shared::wire::{self, *};

use crate::error::{PortIoError, Result};
use crate::portio_log;

/*──────────────────────────── transport ─────────────────────────────────*/

/// An open handle to the driver's device object.
///
/// Dropping it releases the handle.
///
/// # Safety
///
/// Physical memory access dereferences the linear address a map reply hands
/// back. An implementation whose `IOCTL_WINIO_MAPPHYSTOLIN` reply has a
/// non-null `linear_address` and a `physical_address`/`size` range covering
/// the requested one must back that whole range with readable and writable
/// memory at `linear_address` until the matching unmap. Replies that do not
/// cover the request are rejected before any access.
pub unsafe trait DeviceChannel: Send + Sync {
    /// One synchronous device-control exchange; returns bytes written to
    /// `output`.
    fn control(&self, code: u32, input: &[u8], output: &mut [u8]) -> io::Result<usize>;
}

/// Opens device objects by path.
pub trait DeviceOpener: Send + Sync {
    fn open(&self, device_path: &str) -> io::Result<Box<dyn DeviceChannel>>;
}

impl<T: DeviceOpener + ?Sized> DeviceOpener for Arc<T> {
    fn open(&self, device_path: &str) -> io::Result<Box<dyn DeviceChannel>> {
        (**self).open(device_path)
    }
}

/// Opener for platforms without device objects.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDevices;

impl DeviceOpener for NoDevices {
    fn open(&self, device_path: &str) -> io::Result<Box<dyn DeviceChannel>> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            format!("{device_path}: device objects are not available on this platform"),
        ))
    }
}

/// Device opener for the running OS.
pub fn native() -> Box<dyn DeviceOpener> {
    #[cfg(windows)]
    {
        Box::new(win32::Win32Devices)
    }
    #[cfg(not(windows))]
    {
        Box::new(NoDevices)
    }
}

/*──────────────────────────── protocol client ───────────────────────────*/

/// Typed requests over an open channel.
pub struct DriverClient<'a> {
    channel: &'a dyn DeviceChannel,
}

impl<'a> DriverClient<'a> {
    pub fn new(channel: &'a dyn DeviceChannel) -> Self {
        Self { channel }
    }

    fn exchange(&self, code: u32, input: &[u8], output: &mut [u8]) -> Result<usize> {
        self.channel.control(code, input, output).map_err(|source| {
            portio_log!(Level::Debug, "ioctl", "{} failed: {}", ioctl::name(code), source);
            PortIoError::DeviceIoFailed { request: ioctl::name(code), source }
        })
    }

    pub fn read_byte(&self, port: u16) -> Result<u8> {
        let mut out = [0u8; BYTE_RESPONSE_LEN];
        self.exchange(IOCTL_READ_PORT_UCHAR, &ReadPortRequest { port }.encode(), &mut out)?;
        Ok(wire::decode_byte(&out)?)
    }

    pub fn write_byte(&self, port: u16, value: u8) -> Result<()> {
        let req = WriteByteRequest { port, value };
        self.exchange(IOCTL_WRITE_PORT_UCHAR, &req.encode(), &mut [])?;
        Ok(())
    }

    pub fn read_word(&self, port: u16) -> Result<u16> {
        let mut out = [0u8; WORD_RESPONSE_LEN];
        self.exchange(IOCTL_READ_PORT_USHORT, &ReadPortRequest { port }.encode(), &mut out)?;
        Ok(wire::decode_word(&out)?)
    }

    pub fn write_word(&self, port: u16, value: u16) -> Result<()> {
        let req = WriteWordRequest { port, value };
        self.exchange(IOCTL_WRITE_PORT_USHORT, &req.encode(), &mut [])?;
        Ok(())
    }

    pub fn read_ulong(&self, port: u16) -> Result<u32> {
        let mut out = [0u8; ULONG_RESPONSE_LEN];
        self.exchange(IOCTL_READ_PORT_ULONG, &ReadPortRequest { port }.encode_wide(), &mut out)?;
        Ok(wire::decode_ulong(&out)?)
    }

    pub fn write_ulong(&self, port: u16, value: u32) -> Result<()> {
        let req = WriteUlongRequest { port, value };
        self.exchange(IOCTL_WRITE_PORT_ULONG, &req.encode(), &mut [])?;
        Ok(())
    }

    /// Ask the driver to map `request.size` bytes at `request.physical_address`.
    pub fn map_physical(&self, request: &PhysicalMemoryRequest) -> Result<PhysicalMemoryRequest> {
        let mut out = [0u8; PHYSICAL_MEMORY_LEN];
        let n = self.exchange(IOCTL_WINIO_MAPPHYSTOLIN, &request.encode(), &mut out)?;
        Ok(PhysicalMemoryRequest::decode(&out[..n.min(out.len())])?)
    }

    pub fn unmap_physical(&self, request: &PhysicalMemoryRequest) -> Result<()> {
        self.exchange(IOCTL_WINIO_UNMAPPHYSADDR, &request.encode(), &mut [])?;
        Ok(())
    }
}

/*──────────────────────────── Win32 backend ─────────────────────────────*/

#[cfg(windows)]
pub mod win32 {
    use std::{io, ptr};
    use windows_sys::Win32::{
        Foundation::{CloseHandle, GENERIC_READ, GENERIC_WRITE, HANDLE, INVALID_HANDLE_VALUE},
        Storage::FileSystem::{CreateFileW, FILE_ATTRIBUTE_NORMAL, OPEN_EXISTING},
        System::IO::DeviceIoControl,
    };

    use super::{DeviceChannel, DeviceOpener};
    use crate::platform::win32::to_wide;

    /// Opens `\\.\<name>` with `CreateFileW`.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct Win32Devices;

    impl DeviceOpener for Win32Devices {
        fn open(&self, device_path: &str) -> io::Result<Box<dyn DeviceChannel>> {
            let wide = to_wide(device_path);
            let handle = unsafe {
                CreateFileW(
                    wide.as_ptr(),
                    GENERIC_READ | GENERIC_WRITE,
                    0,
                    ptr::null(),
                    OPEN_EXISTING,
                    FILE_ATTRIBUTE_NORMAL,
                    ptr::null_mut(),
                )
            };
            if handle == INVALID_HANDLE_VALUE || handle.is_null() {
                return Err(io::Error::last_os_error());
            }
            Ok(Box::new(Win32Device { handle }))
        }
    }

    /// Thin RAII wrapper: the handle is closed on drop.
    pub struct Win32Device {
        handle: HANDLE,
    }

    // The handle is written once at open and only read afterwards.
    unsafe impl Send for Win32Device {}
    unsafe impl Sync for Win32Device {}

    // SAFETY: the reply comes from the InpOut driver, which maps the section
    // into this process before answering and keeps it until unmap.
    unsafe impl DeviceChannel for Win32Device {
        fn control(&self, code: u32, input: &[u8], output: &mut [u8]) -> io::Result<usize> {
            let mut returned = 0u32;
            let out_ptr = if output.is_empty() {
                ptr::null_mut()
            } else {
                output.as_mut_ptr().cast()
            };
            let ok = unsafe {
                DeviceIoControl(
                    self.handle,
                    code,
                    input.as_ptr().cast(),
                    input.len() as u32,
                    out_ptr,
                    output.len() as u32,
                    &mut returned,
                    ptr::null_mut(),
                )
            };
            if ok == 0 {
                return Err(io::Error::last_os_error());
            }
            Ok(returned as usize)
        }
    }

    impl Drop for Win32Device {
        fn drop(&mut self) {
            unsafe { CloseHandle(self.handle) };
        }
    }
}
