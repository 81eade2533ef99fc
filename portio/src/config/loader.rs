// src/config/loader.rs

//! # Configuration Loader
//!
//! Reads the TOML file, deserializes into `Config`, and validates driver
//! names before anything is written to the system driver directory.

use crate::config::model::{Config, ConfigError};
use crate::portio_log;
use log::Level;
use std::{fs, io, path::Path};

/// Load, parse and validate the configuration at `path`.
pub fn load(path: &Path) -> Result<Config, ConfigError> {
    portio_log!(Level::Debug, "config", "Reading config from {:?}", path);
    let txt = fs::read_to_string(path)?;
    let cfg: Config = toml::from_str(&txt)?;
    cfg.driver.validate()?;
    portio_log!(Level::Info, "config", "Loaded config from {:?}", path);
    Ok(cfg)
}

/// Like [`load`], but a missing file yields the defaults.
pub fn load_or_default(path: &Path) -> Result<Config, ConfigError> {
    match load(path) {
        Err(ConfigError::Io(e)) if e.kind() == io::ErrorKind::NotFound => {
            portio_log!(Level::Debug, "config", "No config at {:?}; using defaults", path);
            Ok(Config::default())
        }
        other => other,
    }
}
