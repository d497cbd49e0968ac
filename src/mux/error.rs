//! Multiplexer error types.

use crate::serial::SerialError;
use std::time::Duration;
use thiserror::Error;

/// Why opening a connection failed.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// The modem answered the open command with `ERROR`.
    #[error("Port {index}: open command rejected")]
    Rejected { index: u8 },

    /// The modem reported `<index>, CONNECT FAIL`.
    #[error("Port {index}: remote connection failed")]
    Failed { index: u8 },

    /// No confirmation arrived in time.
    #[error("Port {index}: no connect confirmation after {after:?}")]
    Timeout { index: u8, after: Duration },

    /// The port has no session.
    #[error("Port {0} has not been acquired")]
    NoSession(u8),

    #[error("Channel error: {0}")]
    Channel(#[from] SerialError),
}

/// Why a write (or the flush it triggered) failed.
///
/// Every variant leaves the port disconnected.
#[derive(Debug, Error)]
pub enum WriteError {
    /// The modem answered the send command with `ERROR`.
    #[error("Port {index}: send command rejected")]
    Rejected { index: u8 },

    /// The `>` prompt never arrived.
    #[error("Port {index}: no transmit prompt after {after:?}")]
    PromptTimeout { index: u8, after: Duration },

    /// The modem reported the send as failed.
    #[error("Port {index}: transmission reported ERROR")]
    ConfirmationFailed { index: u8 },

    /// No confirmation arrived in time.
    #[error("Port {index}: no send confirmation after {after:?}")]
    ConfirmationTimeout { index: u8, after: Duration },

    /// The port has no session.
    #[error("Port {0} has not been acquired")]
    NoSession(u8),

    #[error("Channel error: {0}")]
    Channel(#[from] SerialError),
}

impl WriteError {
    /// Port the failure belongs to, when known.
    pub fn index(&self) -> Option<u8> {
        match self {
            Self::Rejected { index }
            | Self::PromptTimeout { index, .. }
            | Self::ConfirmationFailed { index }
            | Self::ConfirmationTimeout { index, .. } => Some(*index),
            Self::NoSession(index) => Some(*index),
            Self::Channel(_) => None,
        }
    }
}

/// Top-level multiplexer errors.
#[derive(Debug, Error)]
pub enum MuxError {
    /// Every port slot is taken.
    #[error("No free port")]
    NoFreePort,

    /// Index outside `0..PORTS`.
    #[error("Port index {0} out of range")]
    PortOutOfRange(usize),

    /// The port was never acquired.
    #[error("Port {0} has not been acquired")]
    NotAcquired(u8),

    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error(transparent)]
    Write(#[from] WriteError),

    /// A payload capture stalled before all announced bytes arrived.
    #[error("Port {index}: receive timed out after {received} of {expected} bytes")]
    ReceiveTimeout {
        index: u8,
        expected: usize,
        received: usize,
    },

    /// A notification referenced a missing port or could not be parsed.
    #[error("Protocol anomaly: {0}")]
    ProtocolAnomaly(String),

    /// The status reply was missing or unparsable.
    #[error("Port {0}: status unknown")]
    StatusUnknown(u8),

    /// A data-context bring-up step failed.
    #[error("Context setup failed at {step}")]
    ContextSetup { step: &'static str },

    #[error("Channel error: {0}")]
    Channel(#[from] SerialError),
}

impl MuxError {
    pub fn anomaly(message: impl Into<String>) -> Self {
        Self::ProtocolAnomaly(message.into())
    }
}

/// Result type for multiplexer operations.
pub type MuxResult<T> = Result<T, MuxError>;
