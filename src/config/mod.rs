//! Configuration module for simcom-mux.
//!
//! This module provides TOML-based configuration with environment variable overrides.
//!
//! # Configuration Resolution
//!
//! Configuration is loaded from the following locations (in order of priority):
//!
//! 1. `SIMCOM_MUX_CONFIG` environment variable (explicit path)
//! 2. `./simcom-mux.toml` (current directory)
//! 3. `simcom-mux.toml` in the platform config directory
//!    (`~/.config/simcom-mux/` on Linux, `%APPDATA%\simcom-mux\config\` on Windows)
//! 4. Built-in defaults (no file required)
//!
//! # Environment Overrides
//!
//! Selected values can be overridden via environment variables.
//! The pattern is: `SIMCOM_MUX_<SECTION>_<KEY>`
//!
//! Examples:
//! - `SIMCOM_MUX_SERIAL_DEVICE=/dev/ttyS0`
//! - `SIMCOM_MUX_MODEM_APN=internet`
//! - `SIMCOM_MUX_MODEM_STATUS_CACHE_POLICY=all`
//!
//! # Example
//!
//! ```rust,ignore
//! use simcom_mux::config::ConfigLoader;
//!
//! let loader = ConfigLoader::load()?;
//! let config = loader.config();
//!
//! println!("Device: {}", config.serial.device);
//! println!("APN: {}", config.modem.apn);
//! ```

mod error;
mod loader;
mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{
    get_default_config_dir, get_default_config_path, resolve_config_path, validate, ConfigLoader,
};
pub use schema::{
    Config, LogFormat, LoggingConfig, ModemConfig, PortsConfig, ReceiveConfig, SerialConfig,
};
