//! Physical memory access through the driver's WinIo-compatible mapper.
//!
//! A mapping is requested for a physical range; the driver answers with the
//! physical base it actually mapped, a linear base in this process, and a
//! section handle. The caller's linear address is the linear base plus the
//! offset of the requested address inside the mapped range. A reply that is
//! null or does not span the requested range is refused before any access.

use log::Level;
use shared::wire::PhysicalMemoryRequest;

use crate::error::{PortIoError, Result};
use crate::port_io::{silent, PortIo};
use crate::portio_log;

const ULONG_SIZE: usize = core::mem::size_of::<u32>();

/// Linear address and section handle returned by a successful map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PhysicalMapping {
    pub linear: usize,
    pub handle: usize,
}

impl PhysicalMapping {
    pub const NULL: PhysicalMapping = PhysicalMapping { linear: 0, handle: 0 };

    pub fn is_null(&self) -> bool {
        self.linear == 0
    }
}

impl PortIo {
    pub fn try_map_physical_to_linear(&self, physical_address: usize, size: usize) -> Result<PhysicalMapping> {
        let request = PhysicalMemoryRequest { physical_address, size, ..Default::default() };
        let mapped = self.driver()?.map_physical(&request)?;
        if mapped.linear_address == 0 {
            return Err(bad_reply("driver returned a null linear address"));
        }
        if !covers(&mapped, physical_address, size) {
            // Nothing to dereference; hand the section back if there is one.
            if mapped.handle != 0 {
                let _ = self.try_unmap_physical(mapped.handle, mapped.linear_address);
            }
            return Err(bad_reply("driver mapped a range that misses the request"));
        }
        let linear = mapped.linear_for(physical_address);
        portio_log!(
            Level::Trace,
            "physical",
            "Mapped {:#x}+{:#x} at {:#x} (handle {:#x})",
            physical_address,
            size,
            linear,
            mapped.handle
        );
        Ok(PhysicalMapping { linear, handle: mapped.handle })
    }

    /// [`PhysicalMapping::NULL`] on any failure.
    pub fn map_physical_to_linear(&self, physical_address: usize, size: usize) -> PhysicalMapping {
        silent("map_physical_to_linear", self.try_map_physical_to_linear(physical_address, size))
    }

    pub fn try_unmap_physical(&self, handle: usize, linear: usize) -> Result<()> {
        let request = PhysicalMemoryRequest { handle, linear_address: linear, ..Default::default() };
        self.driver()?.unmap_physical(&request)
    }

    pub fn unmap_physical(&self, handle: usize, linear: usize) -> bool {
        silent("unmap_physical", self.try_unmap_physical(handle, linear).map(|()| true))
    }

    /// Map four bytes, read them, unmap.
    pub fn try_get_physical_long(&self, physical_address: usize) -> Result<u32> {
        let mapping = self.try_map_physical_to_linear(physical_address, ULONG_SIZE)?;
        // SAFETY: the driver mapped at least ULONG_SIZE bytes at `linear`, and
        // the mapping stays live until the unmap below.
        let value = unsafe { read_u32(mapping.linear as *const u32) };
        self.try_unmap_physical(mapping.handle, mapping.linear)?;
        Ok(value)
    }

    pub fn get_physical_long(&self, physical_address: usize) -> Option<u32> {
        self.try_get_physical_long(physical_address)
            .map_err(|e| portio_log!(Level::Trace, "physical", "get_physical_long failed: {}", e))
            .ok()
    }

    /// Map four bytes, write them, unmap.
    pub fn try_set_physical_long(&self, physical_address: usize, value: u32) -> Result<()> {
        let mapping = self.try_map_physical_to_linear(physical_address, ULONG_SIZE)?;
        // SAFETY: as in `try_get_physical_long`.
        unsafe { write_u32(mapping.linear as *mut u32, value) };
        self.try_unmap_physical(mapping.handle, mapping.linear)
    }

    pub fn set_physical_long(&self, physical_address: usize, value: u32) -> bool {
        silent("set_physical_long", self.try_set_physical_long(physical_address, value).map(|()| true))
    }

    /// Copy `len` bytes starting at `physical_address`, one volatile byte
    /// read at a time.
    pub fn try_read_physical(&self, physical_address: usize, len: usize) -> Result<Vec<u8>> {
        if len == 0 {
            return Ok(Vec::new());
        }
        let mapping = self.try_map_physical_to_linear(physical_address, len)?;
        let base = mapping.linear as *const u8;
        // SAFETY: `len` bytes at `base` are covered by the live mapping.
        let bytes = (0..len).map(|i| unsafe { base.add(i).read_volatile() }).collect();
        self.try_unmap_physical(mapping.handle, mapping.linear)?;
        Ok(bytes)
    }

    pub fn read_physical(&self, physical_address: usize, len: usize) -> Option<Vec<u8>> {
        self.try_read_physical(physical_address, len)
            .map_err(|e| portio_log!(Level::Trace, "physical", "read_physical failed: {}", e))
            .ok()
    }

    pub fn try_write_physical_byte(&self, physical_address: usize, value: u8) -> Result<()> {
        let mapping = self.try_map_physical_to_linear(physical_address, 1)?;
        // SAFETY: one byte at `linear` is covered by the live mapping.
        unsafe { (mapping.linear as *mut u8).write_volatile(value) };
        self.try_unmap_physical(mapping.handle, mapping.linear)
    }

    pub fn write_physical_byte(&self, physical_address: usize, value: u8) -> bool {
        silent("write_physical_byte", self.try_write_physical_byte(physical_address, value).map(|()| true))
    }
}

/// Whether the driver's reply spans `[requested, requested + size)`.
fn covers(mapped: &PhysicalMemoryRequest, requested: usize, size: usize) -> bool {
    let Some(offset) = requested.checked_sub(mapped.physical_address) else {
        return false;
    };
    offset.checked_add(size).is_some_and(|end| end <= mapped.size)
}

fn bad_reply(reason: &str) -> PortIoError {
    PortIoError::DeviceIoFailed {
        request: "WINIO_MAPPHYSTOLIN",
        source: std::io::Error::other(reason.to_owned()),
    }
}

/// Device memory wants a single volatile access; fall back to an unaligned
/// read when the physical address is not dword aligned.
unsafe fn read_u32(ptr: *const u32) -> u32 {
    if ptr.is_aligned() {
        unsafe { ptr.read_volatile() }
    } else {
        unsafe { ptr.read_unaligned() }
    }
}

unsafe fn write_u32(ptr: *mut u32, value: u32) {
    if ptr.is_aligned() {
        unsafe { ptr.write_volatile(value) }
    } else {
        unsafe { ptr.write_unaligned(value) }
    }
}
