//! Configuration schema definitions.
//!
//! This module defines the structure of the configuration file using serde.
//! All configuration sections are defined here with appropriate defaults.

use crate::mux::payload::DEFAULT_MAX_PAYLOAD;
use crate::mux::{PortOptions, ReceiveTiming, StatusCachePolicy};
use crate::serial::{FlowControl, LineSettings};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Serial link to the modem
    pub serial: SerialConfig,
    /// Modem command timing and data context
    pub modem: ModemConfig,
    /// Defaults for newly acquired ports
    pub ports: PortsConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Serial port configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Device path, e.g. `/dev/ttyUSB0` or `COM3`
    pub device: String,
    /// Link baud rate
    pub baud_rate: u32,
    /// Flow control on the link
    pub flow_control: FlowControl,
    /// Single read timeout in milliseconds
    pub read_timeout_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            device: "/dev/ttyUSB0".to_string(),
            baud_rate: 9600,
            flow_control: FlowControl::None,
            read_timeout_ms: 10,
        }
    }
}

impl SerialConfig {
    /// Line settings used to open the device.
    pub fn line_settings(&self) -> LineSettings {
        LineSettings {
            baud_rate: self.baud_rate,
            flow_control: self.flow_control,
            read_timeout: Duration::from_millis(self.read_timeout_ms),
        }
    }
}

/// Modem configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModemConfig {
    /// Access point name for the data context
    pub apn: String,
    /// APN user name
    pub user: String,
    /// APN password
    pub password: String,
    /// Plain command reply timeout in milliseconds
    pub command_timeout_ms: u64,
    /// Timeout for context commands (`+CGATT`, `+CIICR`, `+CIPSHUT`)
    pub context_timeout_ms: u64,
    /// Time allowed for `<i>, CONNECT OK` after `+CIPSTART`
    pub connect_timeout_ms: u64,
    /// Time allowed for the `>` prompt after `+CIPSEND`
    pub prompt_timeout_ms: u64,
    /// Time allowed for `<i>, SEND OK` when waiting for transmission
    pub send_timeout_ms: u64,
    /// How long a polled status stays valid
    pub status_cache_ms: u64,
    /// Which statuses may be served from the cache
    pub status_cache_policy: StatusCachePolicy,
    /// Window `available(true)` polls the link for
    pub available_wait_ms: u64,
    /// Sleep between empty polls of the link
    pub poll_interval_ms: u64,
    /// Payload capture timing
    pub receive: ReceiveConfig,
}

impl Default for ModemConfig {
    fn default() -> Self {
        Self {
            apn: String::new(),
            user: String::new(),
            password: String::new(),
            command_timeout_ms: 1000,
            context_timeout_ms: 30_000,
            connect_timeout_ms: 10_000,
            prompt_timeout_ms: 1000,
            send_timeout_ms: 10_000,
            status_cache_ms: 100,
            status_cache_policy: StatusCachePolicy::ConnectedOnly,
            available_wait_ms: 10,
            poll_interval_ms: 1,
            receive: ReceiveConfig::default(),
        }
    }
}

impl ModemConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn context_timeout(&self) -> Duration {
        Duration::from_millis(self.context_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn prompt_timeout(&self) -> Duration {
        Duration::from_millis(self.prompt_timeout_ms)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn status_cache_window(&self) -> Duration {
        Duration::from_millis(self.status_cache_ms)
    }

    pub fn available_wait(&self) -> Duration {
        Duration::from_millis(self.available_wait_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Payload capture timing section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiveConfig {
    /// Rate the capture budget is computed for; the serial line rate if unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baud_rate: Option<u32>,
    /// Fixed allowance added to every capture
    pub margin_ms: u64,
    /// Largest `+RECEIVE` announcement accepted
    pub max_payload_len: usize,
}

impl Default for ReceiveConfig {
    fn default() -> Self {
        Self {
            baud_rate: None,
            margin_ms: 500,
            max_payload_len: DEFAULT_MAX_PAYLOAD,
        }
    }
}

impl ReceiveConfig {
    /// Capture limits for a link running at `line_baud`.
    pub fn timing(&self, line_baud: u32) -> ReceiveTiming {
        ReceiveTiming {
            baud_rate: self.baud_rate.unwrap_or(line_baud),
            margin: Duration::from_millis(self.margin_ms),
            max_length: self.max_payload_len,
        }
    }
}

/// Defaults applied to newly acquired ports.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PortsConfig {
    /// Transmit queue length that triggers a flush
    pub transmit_buffer_size: usize,
    /// Block on `<i>, SEND OK` after every flush
    pub wait_for_transmission: bool,
    /// Default `wait` argument of `available()`
    pub wait_for_available: bool,
}

impl Default for PortsConfig {
    fn default() -> Self {
        let options = PortOptions::default();
        Self {
            transmit_buffer_size: options.transmit_buffer_size,
            wait_for_transmission: options.wait_for_transmission,
            wait_for_available: options.wait_for_available,
        }
    }
}

impl PortsConfig {
    pub fn options(&self) -> PortOptions {
        PortOptions {
            transmit_buffer_size: self.transmit_buffer_size,
            wait_for_transmission: self.wait_for_transmission,
            wait_for_available: self.wait_for_available,
        }
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    pub level: String,
    /// Log format: "json", "pretty", "compact"
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON format
    Json,
    /// Pretty format with colors
    #[default]
    Pretty,
    /// Compact format
    Compact,
}
