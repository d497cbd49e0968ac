//! Serial transport errors.
//!
//! Kept separate from the multiplexer errors: these describe the physical link,
//! not the AT dialogue running over it.

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while talking to the serial device.
#[derive(Debug, Error)]
pub enum SerialError {
    /// The serial device does not exist on this system.
    #[error("Serial device not found: {0}")]
    NotFound(String),

    /// An I/O error occurred on the link.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The device rejected the requested line settings.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A read or write did not complete in time.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// A serialport-specific error occurred.
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),
}

impl SerialError {
    /// Create a NotFound error from a device path.
    pub fn not_found(device: impl Into<String>) -> Self {
        Self::NotFound(device.into())
    }

    /// Create a Config error from a message.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a Timeout error from a duration.
    pub fn timeout(duration: Duration) -> Self {
        Self::Timeout(duration)
    }

    /// Whether this error only means "nothing arrived yet".
    ///
    /// Read timeouts are part of normal polling and must not abort a wait loop.
    pub fn is_idle(&self) -> bool {
        match self {
            Self::Timeout(_) => true,
            Self::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
            ),
            _ => false,
        }
    }
}
