//! Per-port state.

use super::registry::PortIndex;
use super::status::TcpStatus;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Instant;

/// Transport requested when the port was acquired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Transport {
    Tcp,
    Udp,
}

impl Transport {
    /// Keyword used in `+CIPSTART`.
    pub fn keyword(self) -> &'static str {
        match self {
            Self::Tcp => "TCP",
            Self::Udp => "UDP",
        }
    }
}

/// Outcome of the sends issued on a port since the last reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransmissionState {
    #[default]
    None,
    InProgress,
    Success,
    Error,
}

/// Caller-tunable behaviour of one port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortOptions {
    /// Transmit queue length that triggers a flush.
    pub transmit_buffer_size: usize,
    /// Whether a flush blocks until the modem confirms it.
    pub wait_for_transmission: bool,
    /// Default `wait` argument of `available()`.
    pub wait_for_available: bool,
}

impl Default for PortOptions {
    fn default() -> Self {
        Self {
            transmit_buffer_size: 512,
            wait_for_transmission: true,
            wait_for_available: false,
        }
    }
}

/// Inbound bytes, kept as the chunks they arrived in.
///
/// Reading advances an offset into the front chunk; a chunk is dropped once
/// consumed, so large payloads are never shifted in memory.
#[derive(Debug, Default)]
pub struct ReceiveQueue {
    chunks: VecDeque<Vec<u8>>,
    offset: usize,
}

impl ReceiveQueue {
    pub fn push(&mut self, chunk: Vec<u8>) {
        if !chunk.is_empty() {
            self.chunks.push_back(chunk);
        }
    }

    /// Total unread bytes.
    pub fn len(&self) -> usize {
        self.chunks.iter().map(Vec::len).sum::<usize>() - self.offset
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn peek(&self) -> Option<u8> {
        self.chunks.front().map(|chunk| chunk[self.offset])
    }

    pub fn read_byte(&mut self) -> Option<u8> {
        let byte = self.peek()?;
        self.advance(1);
        Some(byte)
    }

    /// Copy as many bytes as fit into `buf`, returning the count.
    pub fn read(&mut self, buf: &mut [u8]) -> usize {
        let mut copied = 0;
        while copied < buf.len() {
            let Some(front) = self.chunks.front() else {
                break;
            };
            let take = (front.len() - self.offset).min(buf.len() - copied);
            buf[copied..copied + take].copy_from_slice(&front[self.offset..self.offset + take]);
            copied += take;
            self.advance(take);
        }
        copied
    }

    fn advance(&mut self, n: usize) {
        self.offset += n;
        if self
            .chunks
            .front()
            .is_some_and(|front| self.offset == front.len())
        {
            self.chunks.pop_front();
            self.offset = 0;
        }
    }

    pub fn clear(&mut self) {
        self.chunks.clear();
        self.offset = 0;
    }

    /// Number of chunks still (partly) unread.
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }
}

/// Last polled status and when it was read.
#[derive(Debug, Clone, Copy)]
pub struct CachedStatus {
    pub status: TcpStatus,
    pub at: Instant,
}

/// State of one logical port.
#[derive(Debug)]
pub struct PortSession {
    index: PortIndex,
    transport: Transport,
    pub(crate) connected: bool,
    pub(crate) transmit_queue: Vec<u8>,
    pub(crate) receive_queue: ReceiveQueue,
    pub(crate) pending_confirmations: u32,
    pub(crate) transmission_state: TransmissionState,
    pub(crate) status_cache: Option<CachedStatus>,
    pub(crate) options: PortOptions,
}

impl PortSession {
    pub fn new(index: PortIndex, transport: Transport, options: PortOptions) -> Self {
        Self {
            index,
            transport,
            connected: false,
            transmit_queue: Vec::with_capacity(options.transmit_buffer_size),
            receive_queue: ReceiveQueue::default(),
            pending_confirmations: 0,
            transmission_state: TransmissionState::None,
            status_cache: None,
            options,
        }
    }

    pub fn index(&self) -> PortIndex {
        self.index
    }

    pub fn transport(&self) -> Transport {
        self.transport
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn pending_confirmations(&self) -> u32 {
        self.pending_confirmations
    }

    pub fn transmission_state(&self) -> TransmissionState {
        self.transmission_state
    }

    pub fn receive_queue(&self) -> &ReceiveQueue {
        &self.receive_queue
    }

    pub fn options(&self) -> PortOptions {
        self.options
    }

    /// A `<i>, CLOSED` or `<i>, CLOSE OK` arrived.
    pub(crate) fn mark_closed(&mut self) {
        self.connected = false;
        self.transmission_state = TransmissionState::None;
        self.status_cache = None;
    }

    /// A `<i>, SEND OK` arrived. Returns true when this settled the last
    /// outstanding send.
    pub(crate) fn confirm_send(&mut self) -> bool {
        if self.pending_confirmations == 0 {
            return false;
        }
        self.pending_confirmations -= 1;
        if self.pending_confirmations == 0 {
            self.transmission_state = TransmissionState::Success;
            return true;
        }
        false
    }

    /// A send was handed to the modem.
    pub(crate) fn begin_send(&mut self) {
        self.pending_confirmations += 1;
        self.transmission_state = TransmissionState::InProgress;
    }

    /// Drop to disconnected with nothing in flight, keeping buffered data.
    pub(crate) fn force_disconnect(&mut self) {
        self.connected = false;
        self.pending_confirmations = 0;
        self.transmission_state = TransmissionState::None;
        self.status_cache = None;
    }

    /// Back to the state of a freshly acquired port.
    pub(crate) fn reset(&mut self) {
        self.force_disconnect();
        self.transmit_queue.clear();
        self.receive_queue.clear();
    }
}
