//! IOCTL codes understood by the InpOut driver.
//!
//! All codes are `METHOD_BUFFERED` / `FILE_ANY_ACCESS` in device type 40000,
//! so the driver copies input and output through one system buffer.

/// Device type the driver registers its device object with.
pub const FILE_DEVICE_INPOUT: u32 = 40_000;

pub const METHOD_BUFFERED: u32 = 0;
pub const FILE_ANY_ACCESS: u32 = 0;

/// Rust equivalent of the `CTL_CODE` macro.
pub const fn ctl_code(device_type: u32, function: u32, method: u32, access: u32) -> u32 {
    (device_type << 16) | (access << 14) | (function << 2) | method
}

const fn inpout_code(function: u32) -> u32 {
    ctl_code(FILE_DEVICE_INPOUT, function, METHOD_BUFFERED, FILE_ANY_ACCESS)
}

pub const IOCTL_READ_PORT_UCHAR: u32 = inpout_code(0x801);
pub const IOCTL_WRITE_PORT_UCHAR: u32 = inpout_code(0x802);
pub const IOCTL_READ_PORT_USHORT: u32 = inpout_code(0x803);
pub const IOCTL_WRITE_PORT_USHORT: u32 = inpout_code(0x804);
pub const IOCTL_READ_PORT_ULONG: u32 = inpout_code(0x805);
pub const IOCTL_WRITE_PORT_ULONG: u32 = inpout_code(0x806);
pub const IOCTL_WINIO_MAPPHYSTOLIN: u32 = inpout_code(0x80A);
pub const IOCTL_WINIO_UNMAPPHYSADDR: u32 = inpout_code(0x80B);

/// Human-readable name of a control code, for log lines.
pub const fn name(code: u32) -> &'static str {
    match code {
        IOCTL_READ_PORT_UCHAR => "READ_PORT_UCHAR",
        IOCTL_WRITE_PORT_UCHAR => "WRITE_PORT_UCHAR",
        IOCTL_READ_PORT_USHORT => "READ_PORT_USHORT",
        IOCTL_WRITE_PORT_USHORT => "WRITE_PORT_USHORT",
        IOCTL_READ_PORT_ULONG => "READ_PORT_ULONG",
        IOCTL_WRITE_PORT_ULONG => "WRITE_PORT_ULONG",
        IOCTL_WINIO_MAPPHYSTOLIN => "WINIO_MAPPHYSTOLIN",
        IOCTL_WINIO_UNMAPPHYSADDR => "WINIO_UNMAPPHYSADDR",
        _ => "UNKNOWN",
    }
}
