//! Errors from loading, validating and saving `simcom-mux.toml`.

use std::path::PathBuf;
use thiserror::Error;

/// Why a configuration could not be loaded or saved.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An explicit path (`--config` or `SIMCOM_MUX_CONFIG`) does not exist.
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read configuration file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML or does not match the schema.
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Failed to serialize configuration: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("Failed to write configuration file '{path}': {source}")]
    WriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A value the modem cannot run with, e.g. a zero `serial.baud_rate`
    /// or `ports.transmit_buffer_size`. `key` is the dotted TOML path.
    #[error("Invalid configuration value for '{key}': {message}")]
    ValidationError { key: String, message: String },

    /// A `SIMCOM_MUX_<SECTION>_<KEY>` override did not parse.
    #[error("Failed to parse environment variable '{var}': {message}")]
    EnvParseError { var: String, message: String },

    /// `save()` on a loader built from defaults, with no file behind it.
    #[error("No configuration file to save to; use save_to()")]
    NoSavePath,
}

impl ConfigError {
    pub fn validation<K: Into<String>, M: Into<String>>(key: K, message: M) -> Self {
        Self::ValidationError {
            key: key.into(),
            message: message.into(),
        }
    }

    pub fn env_parse<V: Into<String>, M: Into<String>>(var: V, message: M) -> Self {
        Self::EnvParseError {
            var: var.into(),
            message: message.into(),
        }
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;
