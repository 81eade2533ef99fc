/// Service and device name of the 32-bit driver.
pub const DRIVER_NAME_X86: &str = "inpout32";
/// Service and device name of the 64-bit driver (also used from WOW64).
pub const DRIVER_NAME_X64: &str = "inpoutx64";

/// Win32 device namespace prefix; the device object is `\\.\<name>`.
pub const DEVICE_PATH_PREFIX: &str = r"\\.\";
/// Directory below the system directory that holds driver images.
pub const DRIVERS_SUBDIR: &str = "Drivers";
/// Extension of a driver image on disk.
pub const DRIVER_IMAGE_EXT: &str = "sys";
/// Service binary path prefix, relative to the Windows directory.
pub const SERVICE_BINARY_PREFIX: &str = r"System32\Drivers\";
