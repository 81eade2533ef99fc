//! WOW64 file-system redirection shim.
//!
//! A 32-bit process on a 64-bit OS sees `System32` redirected to `SysWOW64`.
//! Writing the 64-bit driver image therefore has to suspend redirection for
//! the duration of the write and restore it afterwards, on every path out.

use log::Level;

use crate::platform::{Bitness, PlatformApi, RedirectionToken};
use crate::portio_log;

pub struct CompatShim<'a> {
    api: &'a dyn PlatformApi,
    active: bool,
}

impl<'a> CompatShim<'a> {
    /// Identity unless `bitness` is [`Bitness::Wow64`].
    pub fn new(api: &'a dyn PlatformApi, bitness: Bitness) -> Self {
        Self { api, active: bitness.needs_redirection_bypass() }
    }

    /// Suspend redirection until the returned guard is left or dropped.
    pub fn enter(&self) -> RedirectionGuard<'a> {
        let token = if self.active {
            let token = self.api.disable_fs_redirection();
            if token.is_none() {
                portio_log!(Level::Warn, "compat", "Could not disable WOW64 file-system redirection");
            }
            token
        } else {
            None
        };
        RedirectionGuard { api: self.api, token }
    }
}

/// Restores the saved redirection state exactly once.
#[must_use = "redirection is restored as soon as the guard is dropped"]
pub struct RedirectionGuard<'a> {
    api: &'a dyn PlatformApi,
    token: Option<RedirectionToken>,
}

impl RedirectionGuard<'_> {
    /// `true` while redirection is actually suspended.
    pub fn is_engaged(&self) -> bool {
        self.token.is_some()
    }

    pub fn leave(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(token) = self.token.take() {
            if !self.api.revert_fs_redirection(token) {
                portio_log!(Level::Warn, "compat", "Could not restore WOW64 file-system redirection");
            }
        }
    }
}

impl Drop for RedirectionGuard<'_> {
    fn drop(&mut self) {
        self.release();
    }
}
