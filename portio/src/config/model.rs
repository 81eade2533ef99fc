// src/config/model.rs

use log::LevelFilter;
use serde::Deserialize;
use shared::constants::{DRIVER_NAME_X64, DRIVER_NAME_X86};
use std::path::PathBuf;
use thiserror::Error;

/// Top-level runtime config; every table is optional in TOML.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub driver:  DriverConfig,
    pub logging: LoggingConfig,
}

/// Mirror of the `[driver]` table
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Service/device name for the 32-bit driver.
    pub name_x86:  String,
    /// Service/device name for the 64-bit driver.
    pub name_x64:  String,
    /// Directory holding `<name>.sys` images; overrides embedded images.
    pub image_dir: Option<PathBuf>,
    /// When false the driver is only opened or started, never deployed or registered.
    pub install:   bool,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            name_x86:  DRIVER_NAME_X86.into(),
            name_x64:  DRIVER_NAME_X64.into(),
            image_dir: None,
            install:   true,
        }
    }
}

/// Mirror of the `[logging]` table
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub enable:       bool,
    pub file:         Option<String>,
    pub level:        String,
    /// Also send every line to the debugger output channel (Windows only).
    pub debug_output: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enable:       false,
            file:         None,
            level:        "INFO".into(),
            debug_output: true,
        }
    }
}

impl LoggingConfig {
    /// Unknown levels fall back to INFO.
    pub fn level_filter(&self) -> LevelFilter {
        match self.level.to_uppercase().as_str() {
            "OFF"   => LevelFilter::Off,
            "ERROR" => LevelFilter::Error,
            "WARN"  => LevelFilter::Warn,
            "DEBUG" => LevelFilter::Debug,
            "TRACE" => LevelFilter::Trace,
            _       => LevelFilter::Info,
        }
    }
}

/// All the ways config loading can go wrong
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid driver name '{0}'")]
    InvalidDriverName(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl DriverConfig {
    /// Names end up in `\\.\<name>` and `<name>.sys`, so they must be plain
    /// file-name components.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for name in [&self.name_x86, &self.name_x64] {
            let bad = name.is_empty()
                || name.contains(['\\', '/', ':', '.'])
                || name.chars().any(char::is_whitespace);
            if bad {
                return Err(ConfigError::InvalidDriverName(name.clone()));
            }
        }
        Ok(())
    }
}
