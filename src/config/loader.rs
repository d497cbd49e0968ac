//! Configuration loader with file resolution and environment override support.

use super::error::{ConfigError, ConfigResult};
use super::schema::{Config, LogFormat};
use crate::mux::StatusCachePolicy;
use directories::ProjectDirs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Environment variable prefix for overrides
const ENV_PREFIX: &str = "SIMCOM_MUX";

/// Config file name
const CONFIG_FILE_NAME: &str = "simcom-mux.toml";

/// Environment variable for explicit config path
const CONFIG_PATH_ENV: &str = "SIMCOM_MUX_CONFIG";

/// Application name used for the platform config directory
const APP_NAME: &str = "simcom-mux";

/// Configuration loader with resolution and override logic.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Resolved config file path (if any)
    pub config_path: Option<PathBuf>,
    /// The loaded configuration
    pub config: Config,
}

impl ConfigLoader {
    /// Load configuration using standard resolution order.
    ///
    /// Resolution priority (highest to lowest):
    /// 1. `SIMCOM_MUX_CONFIG` environment variable (explicit path)
    /// 2. `./simcom-mux.toml` (current directory)
    /// 3. `simcom-mux.toml` in the platform config directory
    /// 4. Built-in defaults (no file required)
    ///
    /// Environment variables can override any config file values.
    pub fn load() -> ConfigResult<Self> {
        let config_path = resolve_config_path();

        let mut config = if let Some(ref path) = config_path {
            load_from_file(path)?
        } else {
            Config::default()
        };

        apply_env_overrides(&mut config)?;
        validate(&config)?;

        Ok(Self {
            config_path,
            config,
        })
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Err(ConfigError::NotFound(path));
        }
        let mut config = load_from_file(&path)?;
        apply_env_overrides(&mut config)?;
        validate(&config)?;

        Ok(Self {
            config_path: Some(path),
            config,
        })
    }

    /// Create a loader with default configuration (no file).
    pub fn with_defaults() -> Self {
        let mut config = Config::default();
        // Still apply env overrides even with defaults
        if apply_env_overrides(&mut config).is_err() || validate(&config).is_err() {
            config = Config::default();
        }

        Self {
            config_path: None,
            config,
        }
    }

    /// Get the loaded configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get a mutable reference to the configuration.
    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    /// Consume the loader and return the configuration.
    pub fn into_config(self) -> Config {
        self.config
    }

    /// Save the current configuration to file.
    pub fn save(&self) -> ConfigResult<()> {
        let path = self.config_path.as_ref().ok_or(ConfigError::NoSavePath)?;

        save_to_file(&self.config, path)
    }

    /// Save the current configuration to a specific file.
    pub fn save_to(&self, path: impl AsRef<Path>) -> ConfigResult<()> {
        save_to_file(&self.config, path.as_ref())
    }

    /// Reload configuration from file (if path is set).
    pub fn reload(&mut self) -> ConfigResult<()> {
        if let Some(ref path) = self.config_path {
            let mut config = load_from_file(path)?;
            apply_env_overrides(&mut config)?;
            validate(&config)?;
            self.config = config;
        }
        Ok(())
    }
}

/// Resolve the configuration file path using standard locations.
pub fn resolve_config_path() -> Option<PathBuf> {
    // 1. Explicit environment variable
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(path);
        if path.exists() {
            return Some(path);
        }
    }

    // 2. Current directory
    let cwd_config = PathBuf::from(CONFIG_FILE_NAME);
    if cwd_config.exists() {
        return Some(cwd_config);
    }

    // 3. Platform config directory
    if let Some(app_config) = get_default_config_path() {
        if app_config.exists() {
            return Some(app_config);
        }
    }

    // 4. No config file found - will use defaults
    None
}

/// Load configuration from a file.
fn load_from_file(path: &Path) -> ConfigResult<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_path_buf(),
        source: e,
    })?;

    toml::from_str(&content).map_err(ConfigError::ParseError)
}

/// Save configuration to a file.
fn save_to_file(config: &Config, path: &Path) -> ConfigResult<()> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError {
            path: path.to_path_buf(),
            source: e,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|e| ConfigError::WriteError {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Read `<ENV_PREFIX>_<suffix>` and parse it, if set.
fn env_value<T: FromStr>(suffix: &str, what: &str) -> ConfigResult<Option<T>> {
    let var = format!("{}_{}", ENV_PREFIX, suffix);
    match std::env::var(&var) {
        Ok(val) => val
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::env_parse(var, format!("Invalid {}", what))),
        Err(_) => Ok(None),
    }
}

/// Apply environment variable overrides to the configuration.
///
/// Environment variables follow the pattern: `SIMCOM_MUX_<SECTION>_<KEY>`
/// For example:
/// - `SIMCOM_MUX_SERIAL_DEVICE=/dev/ttyS0`
/// - `SIMCOM_MUX_MODEM_APN=internet`
/// - `SIMCOM_MUX_PORTS_TRANSMIT_BUFFER_SIZE=256`
fn apply_env_overrides(config: &mut Config) -> ConfigResult<()> {
    // Serial overrides
    if let Some(val) = env_value("SERIAL_DEVICE", "device")? {
        config.serial.device = val;
    }
    if let Some(val) = env_value("SERIAL_BAUD_RATE", "baud rate")? {
        config.serial.baud_rate = val;
    }

    // Modem overrides
    if let Some(val) = env_value("MODEM_APN", "APN")? {
        config.modem.apn = val;
    }
    if let Some(val) = env_value("MODEM_USER", "user")? {
        config.modem.user = val;
    }
    if let Some(val) = env_value("MODEM_PASSWORD", "password")? {
        config.modem.password = val;
    }
    if let Some(val) = env_value("MODEM_COMMAND_TIMEOUT_MS", "timeout")? {
        config.modem.command_timeout_ms = val;
    }
    if let Some(val) = env_value("MODEM_CONNECT_TIMEOUT_MS", "timeout")? {
        config.modem.connect_timeout_ms = val;
    }
    if let Some(val) = env_value("MODEM_SEND_TIMEOUT_MS", "timeout")? {
        config.modem.send_timeout_ms = val;
    }
    if let Some(val) = env_value("MODEM_STATUS_CACHE_MS", "cache window")? {
        config.modem.status_cache_ms = val;
    }
    if let Some(val) = env_value("MODEM_RECEIVE_BAUD_RATE", "baud rate")? {
        config.modem.receive.baud_rate = Some(val);
    }
    if let Some(val) = env_value("MODEM_RECEIVE_MARGIN_MS", "margin")? {
        config.modem.receive.margin_ms = val;
    }
    if let Some(val) = env_value("MODEM_RECEIVE_MAX_PAYLOAD_LEN", "payload length")? {
        config.modem.receive.max_payload_len = val;
    }
    if let Some(val) = env_value::<String>("MODEM_STATUS_CACHE_POLICY", "cache policy")? {
        config.modem.status_cache_policy = match val.to_lowercase().as_str() {
            "connected_only" => StatusCachePolicy::ConnectedOnly,
            "all" => StatusCachePolicy::All,
            _ => {
                return Err(ConfigError::env_parse(
                    format!("{}_MODEM_STATUS_CACHE_POLICY", ENV_PREFIX),
                    "Expected 'connected_only' or 'all'",
                ))
            }
        };
    }

    // Port defaults
    if let Some(val) = env_value("PORTS_TRANSMIT_BUFFER_SIZE", "buffer size")? {
        config.ports.transmit_buffer_size = val;
    }
    if let Some(val) = env_value::<String>("PORTS_WAIT_FOR_TRANSMISSION", "flag")? {
        config.ports.wait_for_transmission = val.to_lowercase() == "true" || val == "1";
    }

    // Logging overrides
    if let Some(val) = env_value("LOGGING_LEVEL", "level")? {
        config.logging.level = val;
    }
    if let Some(val) = env_value::<String>("LOGGING_FORMAT", "format")? {
        config.logging.format = match val.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            "compact" => LogFormat::Compact,
            "pretty" => LogFormat::Pretty,
            _ => {
                return Err(ConfigError::env_parse(
                    format!("{}_LOGGING_FORMAT", ENV_PREFIX),
                    "Expected 'json', 'pretty' or 'compact'",
                ))
            }
        };
    }

    Ok(())
}

/// Reject values the multiplexer cannot run with.
pub fn validate(config: &Config) -> ConfigResult<()> {
    if config.serial.baud_rate == 0 {
        return Err(ConfigError::validation(
            "serial.baud_rate",
            "must be greater than zero",
        ));
    }
    if config.modem.receive.baud_rate == Some(0) {
        return Err(ConfigError::validation(
            "modem.receive.baud_rate",
            "must be greater than zero",
        ));
    }
    if config.modem.receive.max_payload_len == 0 {
        return Err(ConfigError::validation(
            "modem.receive.max_payload_len",
            "must be at least 1",
        ));
    }
    if config.ports.transmit_buffer_size == 0 {
        return Err(ConfigError::validation(
            "ports.transmit_buffer_size",
            "must be at least 1",
        ));
    }
    Ok(())
}

/// Get the default config directory for creating new config files.
pub fn get_default_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the default config file path for creating new config files.
pub fn get_default_config_path() -> Option<PathBuf> {
    get_default_config_dir().map(|d| d.join(CONFIG_FILE_NAME))
}
