//! Operations on one logical port.
//!
//! A [`PortHandle`] borrows the modem exclusively for as long as it lives,
//! which is what keeps the shared link single-threaded: only one port
//! operation can be in flight at a time.

use super::error::{ConnectError, MuxError, MuxResult, WriteError};
use super::registry::PortIndex;
use super::session::{CachedStatus, PortSession, TransmissionState, Transport};
use super::status::{parse_ack_line, parse_status_line, TcpStatus};
use crate::modem::Modem;
use crate::serial::SerialPortAdapter;
use serde::Serialize;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Returned by [`PortHandle::outstanding_unacked_bytes`] when the count
/// could not be read.
pub const UNACKED_UNKNOWN: i32 = -1;

/// Snapshot of a port for reporting.
#[derive(Debug, Clone, Serialize)]
pub struct PortReport {
    pub index: PortIndex,
    pub transport: Transport,
    pub connected: bool,
    pub pending_confirmations: u32,
    pub transmission_state: TransmissionState,
    pub buffered: usize,
    pub queued: usize,
}

/// Borrowed handle to an acquired port.
#[derive(Debug)]
pub struct PortHandle<'m, P: SerialPortAdapter> {
    modem: &'m mut Modem<P>,
    index: PortIndex,
}

impl<'m, P: SerialPortAdapter> PortHandle<'m, P> {
    pub(crate) fn new(modem: &'m mut Modem<P>, index: PortIndex) -> Self {
        Self { modem, index }
    }

    fn session(&self) -> Option<&PortSession> {
        self.modem.registry.get(self.index)
    }

    fn session_mut(&mut self) -> Option<&mut PortSession> {
        self.modem.registry.get_mut(self.index)
    }

    pub fn index(&self) -> PortIndex {
        self.index
    }

    pub fn transport(&self) -> Option<Transport> {
        self.session().map(PortSession::transport)
    }

    pub fn transmission_state(&self) -> TransmissionState {
        self.session()
            .map_or(TransmissionState::None, PortSession::transmission_state)
    }

    pub fn reset_transmission_state(&mut self) {
        if let Some(session) = self.session_mut() {
            session.transmission_state = TransmissionState::None;
        }
    }

    pub fn pending_confirmations(&self) -> u32 {
        self.session()
            .map_or(0, PortSession::pending_confirmations)
    }

    pub fn set_transmit_buffer_size(&mut self, size: usize) {
        if let Some(session) = self.session_mut() {
            session.options.transmit_buffer_size = size.max(1);
        }
    }

    pub fn set_wait_for_transmission(&mut self, wait: bool) {
        if let Some(session) = self.session_mut() {
            session.options.wait_for_transmission = wait;
        }
    }

    pub fn set_default_wait_for_available(&mut self, wait: bool) {
        if let Some(session) = self.session_mut() {
            session.options.wait_for_available = wait;
        }
    }

    /// Open a connection to `host:port` with the port's transport.
    ///
    /// Returns immediately if the port is already connected.
    pub fn connect(&mut self, host: &str, port: u16) -> Result<(), ConnectError> {
        let index = self.index.get();
        let session = self.session_mut().ok_or(ConnectError::NoSession(index))?;
        session.pending_confirmations = 0;
        if session.connected {
            return Ok(());
        }
        session.transmission_state = TransmissionState::None;
        let transport = session.transport();

        let result = self.open(host, port, transport);
        if let Err(e) = &result {
            warn!("{}", e);
            if let Some(session) = self.session_mut() {
                session.force_disconnect();
            }
        }
        self.modem.run_deferred();
        result
    }

    fn open(&mut self, host: &str, port: u16, transport: Transport) -> Result<(), ConnectError> {
        let index = self.index.get();
        info!(
            "Port {} connecting to {}:{} over {}",
            index,
            host,
            port,
            transport.keyword()
        );
        self.modem.channel.send(&format!(
            "+CIPSTART={index},\"{}\",\"{host}\",\"{port}\"",
            transport.keyword()
        ))?;

        let connected = format!("{index}, CONNECT OK");
        let already = format!("{index}, ALREADY CONNECT");
        let failed = format!("{index}, CONNECT FAIL");
        let timeout = self.modem.config.connect_timeout();
        let reply = self.modem.terminal(
            timeout,
            &[connected.as_str(), already.as_str(), failed.as_str(), "ERROR"],
        )?;

        match reply {
            Some(0) | Some(1) => {
                if let Some(session) = self.session_mut() {
                    session.connected = true;
                    session.status_cache = Some(CachedStatus {
                        status: TcpStatus::Connected,
                        at: Instant::now(),
                    });
                }
                info!("Port {} connected", index);
                Ok(())
            }
            Some(2) => Err(ConnectError::Failed { index }),
            Some(_) => Err(ConnectError::Rejected { index }),
            None => Err(ConnectError::Timeout {
                index,
                after: timeout,
            }),
        }
    }

    /// Queue `data` for sending, flushing whenever the queue fills up.
    ///
    /// Returns the number of bytes accepted. Bytes flushed before a failure
    /// stay sent.
    pub fn write(&mut self, data: &[u8]) -> Result<usize, WriteError> {
        let index = self.index.get();
        let mut accepted = 0;
        loop {
            let session = self.session_mut().ok_or(WriteError::NoSession(index))?;
            let capacity = session.options.transmit_buffer_size.max(1);
            if session.transmit_queue.len() >= capacity {
                self.flush()?;
                continue;
            }
            if accepted == data.len() {
                return Ok(accepted);
            }
            let take = (capacity - session.transmit_queue.len()).min(data.len() - accepted);
            session
                .transmit_queue
                .extend_from_slice(&data[accepted..accepted + take]);
            accepted += take;
        }
    }

    pub fn write_byte(&mut self, byte: u8) -> Result<usize, WriteError> {
        self.write(&[byte])
    }

    /// Send whatever is queued.
    ///
    /// Any failure leaves the port disconnected.
    pub fn flush(&mut self) -> Result<(), WriteError> {
        let index = self.index.get();
        let session = self.session_mut().ok_or(WriteError::NoSession(index))?;
        if session.transmit_queue.is_empty() {
            return Ok(());
        }
        let payload = std::mem::take(&mut session.transmit_queue);
        let wait = session.options.wait_for_transmission;

        let result = self.transmit(&payload, wait);
        if let Err(e) = &result {
            warn!("{}", e);
            if let Some(session) = self.session_mut() {
                session.force_disconnect();
            }
        }
        self.modem.run_deferred();
        result
    }

    fn transmit(&mut self, payload: &[u8], wait: bool) -> Result<(), WriteError> {
        let index = self.index.get();
        self.modem
            .channel
            .send(&format!("+CIPSEND={index},{}", payload.len()))?;

        let prompt_timeout = self.modem.config.prompt_timeout();
        match self.modem.await_prompt(prompt_timeout)? {
            Some(true) => {}
            Some(false) => return Err(WriteError::Rejected { index }),
            None => {
                return Err(WriteError::PromptTimeout {
                    index,
                    after: prompt_timeout,
                })
            }
        }

        self.modem.channel.write_raw(payload)?;
        if let Some(session) = self.session_mut() {
            session.begin_send();
        }
        debug!("Port {} handed {} bytes to the modem", index, payload.len());

        if !wait {
            return Ok(());
        }

        let send_timeout = self.modem.config.send_timeout();
        match self.modem.await_transmission(self.index, send_timeout)? {
            Some(TransmissionState::Success) => Ok(()),
            Some(_) => Err(WriteError::ConfirmationFailed { index }),
            None => Err(WriteError::ConfirmationTimeout {
                index,
                after: send_timeout,
            }),
        }
    }

    /// Copy buffered inbound bytes into `buf`. Never touches the link.
    pub fn read(&mut self, buf: &mut [u8]) -> usize {
        self.session_mut()
            .map_or(0, |session| session.receive_queue.read(buf))
    }

    pub fn read_byte(&mut self) -> Option<u8> {
        self.session_mut()?.receive_queue.read_byte()
    }

    pub fn peek(&self) -> Option<u8> {
        self.session()?.receive_queue().peek()
    }

    fn buffered(&self) -> usize {
        self.session().map_or(0, |session| session.receive_queue().len())
    }

    /// Unread inbound bytes.
    ///
    /// With `wait` and nothing buffered, the link is polled for a short
    /// window first.
    pub fn available(&mut self, wait: bool) -> usize {
        let count = self.buffered();
        if count > 0 || !wait {
            return count;
        }
        let window = self.modem.config.available_wait();
        if let Err(e) = self.modem.poll(window) {
            warn!("Port {}: polling for data failed: {}", self.index, e);
        }
        self.buffered()
    }

    /// [`available`](Self::available) with the port's default wait flag.
    pub fn available_default(&mut self) -> usize {
        let wait = self
            .session()
            .is_some_and(|session| session.options().wait_for_available);
        self.available(wait)
    }

    /// Ask the modem for the connection state.
    ///
    /// Failures read as `Unknown` and leave the port disconnected.
    pub fn status(&mut self) -> TcpStatus {
        let result = self.query_status();
        if let Err(e) = &result {
            warn!("{}", e);
            self.drop_connection();
        }
        self.modem.run_deferred();
        result.unwrap_or(TcpStatus::Unknown)
    }

    fn query_status(&mut self) -> MuxResult<TcpStatus> {
        let index = self.index.get();
        if self.session().is_none() {
            return Err(MuxError::NotAcquired(index));
        }
        self.modem.channel.send(&format!("+CIPSTATUS={index}"))?;

        let timeout = self.modem.config.command_timeout();
        let reply = self.modem.await_reply(timeout, |line| {
            if line.starts_with("+CIPSTATUS:") {
                Some(parse_status_line(line))
            } else if line.starts_with("ERROR") {
                Some(None)
            } else {
                None
            }
        })?;
        let Some(status) = reply.flatten() else {
            return Err(MuxError::StatusUnknown(index));
        };
        self.modem.terminal(timeout, &["OK"])?;

        if let Some(session) = self.session_mut() {
            session.status_cache = Some(CachedStatus {
                status,
                at: Instant::now(),
            });
            session.connected = status == TcpStatus::Connected;
        }
        debug!("Port {} status {}", index, status);
        Ok(status)
    }

    /// Whether the connection is up, answered from a recent status poll
    /// when the cache policy allows it.
    pub fn connected(&mut self) -> bool {
        let window = self.modem.config.status_cache_window();
        let policy = self.modem.config.status_cache_policy;
        let cached = self
            .session()
            .and_then(|session| session.status_cache)
            .filter(|cached| cached.at.elapsed() < window && policy.admits(cached.status));
        match cached {
            Some(cached) => cached.status == TcpStatus::Connected,
            None => self.status() == TcpStatus::Connected,
        }
    }

    /// Close the connection and reset the port, discarding unread data.
    pub fn close(&mut self) {
        let index = self.index.get();
        if self.session().is_none() {
            return;
        }
        let closed = format!("{index}, CLOSE OK");
        let timeout = self.modem.config.command_timeout();
        let outcome = self
            .modem
            .channel
            .send(&format!("+CIPCLOSE={index},0"))
            .and_then(|()| self.modem.terminal(timeout, &[closed.as_str(), "ERROR"]));
        match outcome {
            Ok(Some(0)) => info!("Port {} closed", index),
            Ok(_) => debug!("Port {}: close not confirmed", index),
            Err(e) => warn!("Port {}: close failed: {}", index, e),
        }
        if let Some(session) = self.session_mut() {
            session.reset();
        }
        self.modem.run_deferred();
    }

    /// Bytes sent on this connection the remote side has not acknowledged,
    /// or [`UNACKED_UNKNOWN`].
    pub fn outstanding_unacked_bytes(&mut self) -> i32 {
        let result = self.query_unacked();
        self.modem.run_deferred();
        match result {
            Ok(count) => i32::try_from(count).unwrap_or(i32::MAX),
            Err(e) => {
                warn!("Port {}: acknowledgement query failed: {}", self.index, e);
                self.drop_connection();
                UNACKED_UNKNOWN
            }
        }
    }

    /// A query on this port went unanswered.
    fn drop_connection(&mut self) {
        let index = self.index;
        if let Some(session) = self.session_mut() {
            if session.is_connected() {
                warn!("Port {}: no usable reply, treating as disconnected", index);
            }
            session.force_disconnect();
        }
    }

    fn query_unacked(&mut self) -> MuxResult<u32> {
        let index = self.index.get();
        self.modem.channel.send(&format!("+CIPACK={index}"))?;
        let timeout = self.modem.config.command_timeout();
        let reply = self.modem.await_reply(timeout, |line| {
            if line.starts_with("+CIPACK:") {
                Some(parse_ack_line(line))
            } else if line.starts_with("ERROR") {
                Some(None)
            } else {
                None
            }
        })?;
        let count = reply
            .flatten()
            .ok_or_else(|| MuxError::anomaly(format!("no acknowledgement count for port {index}")))?;
        self.modem.terminal(timeout, &["OK"])?;
        Ok(count)
    }

    /// Snapshot for reporting. `None` if the port was never acquired.
    pub fn report(&self) -> Option<PortReport> {
        let session = self.session()?;
        Some(PortReport {
            index: self.index,
            transport: session.transport(),
            connected: session.is_connected(),
            pending_confirmations: session.pending_confirmations(),
            transmission_state: session.transmission_state(),
            buffered: session.receive_queue().len(),
            queued: session.transmit_queue.len(),
        })
    }
}
