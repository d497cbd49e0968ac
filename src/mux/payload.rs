//! Raw payload capture.
//!
//! After a `+RECEIVE` header the modem sends exactly the announced number of
//! bytes with no framing at all. They are read verbatim; CR, LF, `>` or
//! anything resembling a notification is just data here.

use crate::at::AtChannel;
use crate::serial::{SerialError, SerialPortAdapter};
use crate::wait::Deadline;
use std::time::Duration;

/// Bits on the wire per byte with 8N1 framing.
const BITS_PER_BYTE: u64 = 10;

/// Largest announcement accepted by default. The modem never sends more
/// than 1460 bytes per frame.
pub const DEFAULT_MAX_PAYLOAD: usize = 2048;

/// How long a capture may take, and how large it may be.
///
/// The budget is the transfer time at `baud_rate` plus a fixed `margin`
/// for modem-side latency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiveTiming {
    pub baud_rate: u32,
    pub margin: Duration,
    pub max_length: usize,
}

impl Default for ReceiveTiming {
    fn default() -> Self {
        Self {
            baud_rate: 9600,
            margin: Duration::from_millis(500),
            max_length: DEFAULT_MAX_PAYLOAD,
        }
    }
}

impl ReceiveTiming {
    /// Whether an announcement of `length` bytes is plausible.
    pub fn admits(&self, length: usize) -> bool {
        length <= self.max_length
    }

    /// Time budget for `length` bytes.
    pub fn timeout_for(&self, length: usize) -> Duration {
        let baud = u64::from(self.baud_rate.max(1));
        let micros = (length as u64).saturating_mul(BITS_PER_BYTE * 1_000_000) / baud;
        Duration::from_micros(micros) + self.margin
    }
}

/// Result of one capture.
#[derive(Debug, PartialEq, Eq)]
pub enum Capture {
    /// All announced bytes arrived.
    Complete(Vec<u8>),
    /// The deadline passed after `received` bytes; they were discarded.
    Stalled { received: usize },
    /// `length` exceeds the configured maximum; nothing was read.
    Oversized,
}

/// Read exactly `length` raw bytes from `channel`, bounded by `timing`.
pub fn capture<P: SerialPortAdapter>(
    channel: &mut AtChannel<P>,
    length: usize,
    timing: &ReceiveTiming,
) -> Result<Capture, SerialError> {
    if !timing.admits(length) {
        return Ok(Capture::Oversized);
    }
    let mut chunk = vec![0u8; length];
    let deadline = Deadline::after(timing.timeout_for(length));
    let received = channel.read_exact_bytes(&mut chunk, deadline)?;
    if received == length {
        Ok(Capture::Complete(chunk))
    } else {
        Ok(Capture::Stalled { received })
    }
}
