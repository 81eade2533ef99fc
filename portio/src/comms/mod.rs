//! Communication with the kernel driver.

pub mod ioctl;

pub use ioctl::{DeviceChannel, DeviceOpener, DriverClient};
