#![cfg_attr(not(feature = "std"), no_std)]

//! Wire contract between the user-mode port I/O library and the privileged
//! InpOut driver. Nothing in here talks to the OS; it only names things and
//! lays bytes out the way the driver expects them.

pub mod constants;
pub mod ioctl;
pub mod wire;
