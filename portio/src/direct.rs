//! Direct port instructions for the Windows 9x path.
//!
//! On 9x user code may execute `in`/`out` itself. The opcodes are only
//! emitted for x86 targets; everywhere else the capability is absent and the
//! legacy path reports `Unsupported`.

use std::sync::Arc;

/// Byte-wide port access without a driver.
pub trait PortInstructions: Send + Sync {
    fn read_byte(&self, port: u16) -> u8;
    fn write_byte(&self, port: u16, value: u8);
}

impl<T: PortInstructions + ?Sized> PortInstructions for Arc<T> {
    fn read_byte(&self, port: u16) -> u8 {
        (**self).read_byte(port)
    }
    fn write_byte(&self, port: u16, value: u8) {
        (**self).write_byte(port, value)
    }
}

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
pub struct X86Ports(());

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
impl X86Ports {
    /// # Safety
    /// The process must have I/O privilege (IOPL) for every port it touches;
    /// otherwise the first access faults. On NT this is never the case.
    pub unsafe fn new() -> Self {
        X86Ports(())
    }
}

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
impl PortInstructions for X86Ports {
    fn read_byte(&self, port: u16) -> u8 {
        let value: u8;
        // SAFETY: privilege was asserted when constructing `X86Ports`.
        unsafe {
            core::arch::asm!(
                "in al, dx",
                out("al") value,
                in("dx") port,
                options(nomem, nostack, preserves_flags)
            );
        }
        value
    }

    fn write_byte(&self, port: u16, value: u8) {
        // SAFETY: privilege was asserted when constructing `X86Ports`.
        unsafe {
            core::arch::asm!(
                "out dx, al",
                in("dx") port,
                in("al") value,
                options(nomem, nostack, preserves_flags)
            );
        }
    }
}

/// Resolve the capability once at startup.
pub fn detect() -> Option<Box<dyn PortInstructions>> {
    #[cfg(target_arch = "x86")]
    {
        // SAFETY: only reached when the OS is classified Legacy9x, where
        // user-mode port access is permitted.
        Some(Box::new(unsafe { X86Ports::new() }))
    }
    #[cfg(not(target_arch = "x86"))]
    {
        None
    }
}
