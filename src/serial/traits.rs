//! Core traits for the serial link.
//!
//! Defines the `SerialPortAdapter` trait that lets the AT channel run over
//! either a real device or the scripted mock.

use super::error::SerialError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Line settings for the modem link.
///
/// SIMCom modules only speak 8N1, so only the knobs that actually vary
/// between boards are exposed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineSettings {
    /// Baud rate (bits per second).
    pub baud_rate: u32,

    /// Flow control mode.
    pub flow_control: FlowControl,

    /// How long a single read may block before reporting "nothing yet".
    pub read_timeout: Duration,
}

impl Default for LineSettings {
    fn default() -> Self {
        Self {
            baud_rate: 9600,
            flow_control: FlowControl::None,
            read_timeout: Duration::from_millis(10),
        }
    }
}

/// Flow control modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowControl {
    None,
    Software,
    Hardware,
}

impl From<FlowControl> for serialport::FlowControl {
    fn from(flow: FlowControl) -> Self {
        match flow {
            FlowControl::None => serialport::FlowControl::None,
            FlowControl::Software => serialport::FlowControl::Software,
            FlowControl::Hardware => serialport::FlowControl::Hardware,
        }
    }
}

/// Trait for serial link I/O.
pub trait SerialPortAdapter: Send + std::fmt::Debug {
    /// Write bytes to the link.
    ///
    /// Returns the number of bytes actually written.
    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, SerialError>;

    /// Read whatever is available into `buffer`.
    ///
    /// Returns the number of bytes read. "Nothing available yet" is reported
    /// as an error for which [`SerialError::is_idle`] is true.
    fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<usize, SerialError>;

    /// Get the name/path of this device.
    fn name(&self) -> &str;

    /// Set the per-read timeout.
    fn set_timeout(&mut self, timeout: Duration) -> Result<(), SerialError>;

    /// Discard everything buffered in both directions.
    fn clear_buffers(&mut self) -> Result<(), SerialError>;

    /// Bytes waiting to be read, if the backend can tell.
    fn bytes_to_read(&self) -> Option<usize> {
        None
    }
}
