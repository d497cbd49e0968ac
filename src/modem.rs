//! The modem: one serial link shared by every port.
//!
//! [`Modem`] is the single execution context of the multiplexer. It owns the
//! AT channel and the port registry, and every wait for a command reply goes
//! through it so unsolicited lines arriving in between are dispatched on the
//! spot. Work that would need a second command while one is still in flight
//! (shutting the data context down after `+PDP: DEACT`) is deferred until the
//! current operation has finished.

use crate::at::AtChannel;
use crate::config::{Config, ModemConfig};
use crate::mux::dispatch::{dispatch, Notification};
use crate::mux::payload::{self, Capture, ReceiveTiming};
use crate::mux::{MuxError, MuxResult, PortHandle, PortIndex, PortOptions, PortRegistry};
use crate::mux::{TransmissionState, Transport};
use crate::serial::{LineSettings, SerialError, SerialPortAdapter};
use crate::wait::{self, Deadline, Step};
use std::net::Ipv4Addr;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const OK: &str = "OK";
const ERROR: &str = "ERROR";
const SHUT_OK: &str = "SHUT OK";

/// SIMCom modem driving up to six multiplexed connections.
#[derive(Debug)]
pub struct Modem<P: SerialPortAdapter> {
    pub(crate) channel: AtChannel<P>,
    pub(crate) registry: PortRegistry,
    pub(crate) config: ModemConfig,
    timing: ReceiveTiming,
    context_up: bool,
    /// `+PDP: DEACT` seen; `+CIPSHUT` still owed.
    shutdown_pending: bool,
}

impl<P: SerialPortAdapter> Modem<P> {
    pub fn new(port: P, config: ModemConfig, defaults: PortOptions) -> Self {
        let channel = AtChannel::new(port, config.poll_interval());
        let timing = config.receive.timing(LineSettings::default().baud_rate);
        Self {
            channel,
            registry: PortRegistry::new(defaults),
            config,
            timing,
            context_up: false,
            shutdown_pending: false,
        }
    }

    /// Build a modem from a loaded configuration.
    ///
    /// Payload capture budgets follow the serial line rate unless
    /// `modem.receive.baud_rate` is set.
    pub fn from_config(port: P, config: &Config) -> Self {
        let mut modem = Self::new(port, config.modem.clone(), config.ports.options());
        modem.timing = config.modem.receive.timing(config.serial.baud_rate);
        modem
    }

    pub fn config(&self) -> &ModemConfig {
        &self.config
    }

    pub fn registry(&self) -> &PortRegistry {
        &self.registry
    }

    /// The underlying link.
    pub fn link(&self) -> &P {
        self.channel.port()
    }

    pub fn link_mut(&mut self) -> &mut P {
        self.channel.port_mut()
    }

    /// Whether the data context is believed to be up.
    pub fn context_up(&self) -> bool {
        self.context_up
    }

    /// Claim a port and return a handle to it.
    ///
    /// See [`PortRegistry::acquire`] for how `index` is resolved.
    pub fn acquire(
        &mut self,
        index: Option<usize>,
        transport: Transport,
    ) -> MuxResult<PortHandle<'_, P>> {
        let index = self.registry.acquire(index, transport)?;
        Ok(PortHandle::new(self, index))
    }

    /// Handle to a port acquired earlier.
    pub fn port(&mut self, index: usize) -> MuxResult<PortHandle<'_, P>> {
        let index = PortIndex::new(index)?;
        if self.registry.get(index).is_none() {
            return Err(MuxError::NotAcquired(index.get()));
        }
        Ok(PortHandle::new(self, index))
    }

    /// Attach to GPRS and bring up the packet data context.
    ///
    /// Returns the local address the network assigned.
    pub fn bring_up(&mut self, apn: &str, user: &str, password: &str) -> MuxResult<Ipv4Addr> {
        info!("Bringing up data context on APN '{}'", apn);
        let quick = self.config.command_timeout();
        let slow = self.config.context_timeout();

        // Boot chatter such as RDY or +CPIN is of no interest.
        self.channel.discard_input()?;
        self.expect_ok("+CIPMUX=1", quick, "CIPMUX")?;
        self.expect_ok("+CGATT=1", slow, "CGATT")?;
        self.expect_ok(
            &format!("+CSTT=\"{apn}\",\"{user}\",\"{password}\""),
            quick,
            "CSTT",
        )?;
        self.expect_ok("+CIICR", slow, "CIICR")?;

        self.channel.send("+CIFSR")?;
        let reply = self.await_reply(quick, |line| {
            if line.starts_with(ERROR) {
                Some(None)
            } else {
                line.parse::<Ipv4Addr>().ok().map(Some)
            }
        })?;
        let address = reply
            .flatten()
            .ok_or(MuxError::ContextSetup { step: "CIFSR" })?;

        self.context_up = true;
        info!("Data context up, local address {}", address);
        self.run_deferred();
        Ok(address)
    }

    /// Shut the data context down. Every port ends up disconnected.
    pub fn shutdown_context(&mut self) -> MuxResult<()> {
        self.shutdown_pending = false;
        let result = self.cipshut();
        self.run_deferred();
        result
    }

    fn cipshut(&mut self) -> MuxResult<()> {
        info!("Shutting down data context");
        self.channel.send("+CIPSHUT")?;
        let reply = self.terminal(self.config.context_timeout(), &[SHUT_OK, ERROR])?;

        self.context_up = false;
        for session in self.registry.sessions_mut() {
            session.force_disconnect();
        }

        match reply {
            Some(0) => Ok(()),
            _ => Err(MuxError::ContextSetup { step: "CIPSHUT" }),
        }
    }

    /// Process unsolicited traffic for up to `window`.
    ///
    /// Returns the number of lines handled.
    pub fn poll(&mut self, window: Duration) -> MuxResult<usize> {
        let mut handled = 0;
        let idle = self.channel.idle();
        wait::until(
            Deadline::after(window),
            idle,
            || -> Result<Step<()>, SerialError> {
                let Some(line) = self.channel.next_line()? else {
                    return Ok(Step::Idle);
                };
                self.note_unsolicited(&line)?;
                handled += 1;
                Ok(Step::Progress)
            },
        )?;
        self.run_deferred();
        Ok(handled)
    }

    /// Apply one unsolicited line.
    ///
    /// A data announcement is followed by capturing its payload from the
    /// link, so this must only be called with a line just taken from it.
    pub fn handle_unsolicited(&mut self, line: &str) -> MuxResult<Notification> {
        let mut notification = dispatch(line, &mut self.registry);
        if let Notification::Incoming { index, length } = notification {
            if !self.timing.admits(length) {
                notification = self.refuse_payload(index, length);
            }
        }
        match &notification {
            Notification::Incoming { index, length } => self.receive_payload(*index, *length)?,
            Notification::ContextDeactivated => {
                self.context_up = false;
                self.shutdown_pending = true;
                for session in self.registry.sessions_mut() {
                    session.force_disconnect();
                }
            }
            Notification::Anomaly(message) => return Err(MuxError::anomaly(message.clone())),
            _ => {}
        }
        Ok(notification)
    }

    /// An announcement too large to be real. The framing is lost, so the
    /// port it names cannot be trusted any more.
    fn refuse_payload(&mut self, index: usize, length: usize) -> Notification {
        error!(
            "Port {} announced {} bytes, limit is {}",
            index, length, self.timing.max_length
        );
        if let Some(session) = self.registry.lookup(index) {
            session.force_disconnect();
        }
        Notification::Anomaly(format!(
            "port {index} announced {length} bytes, limit is {}",
            self.timing.max_length
        ))
    }

    fn receive_payload(&mut self, index: usize, length: usize) -> MuxResult<()> {
        let outcome = payload::capture(&mut self.channel, length, &self.timing)?;
        match (self.registry.lookup(index), outcome) {
            (Some(session), Capture::Complete(chunk)) => {
                debug!("Port {} received {} bytes", index, length);
                session.receive_queue.push(chunk);
                Ok(())
            }
            (Some(session), Capture::Stalled { received }) => {
                error!(
                    "Port {} payload stalled after {} of {} bytes, closing",
                    index, received, length
                );
                session.force_disconnect();
                Err(MuxError::ReceiveTimeout {
                    index: session.index().get(),
                    expected: length,
                    received,
                })
            }
            (None, Capture::Complete(_)) => Err(MuxError::anomaly(format!(
                "discarded {length} bytes for port {index} without a session"
            ))),
            (None, Capture::Stalled { received }) => Err(MuxError::anomaly(format!(
                "payload for port {index} without a session stalled after {received} of {length} bytes"
            ))),
            (_, Capture::Oversized) => Err(MuxError::anomaly(format!(
                "payload of {length} bytes for port {index} refused"
            ))),
        }
    }

    /// Dispatch a line nobody was waiting for. Only link failures propagate.
    fn note_unsolicited(&mut self, line: &str) -> Result<(), SerialError> {
        match self.handle_unsolicited(line) {
            Ok(_) => Ok(()),
            Err(MuxError::Channel(e)) => Err(e),
            Err(e) => {
                warn!("{}", e);
                Ok(())
            }
        }
    }

    /// Run work deferred while a command was in flight.
    pub(crate) fn run_deferred(&mut self) {
        if !self.shutdown_pending {
            return;
        }
        self.shutdown_pending = false;
        if let Err(e) = self.cipshut() {
            warn!("Deferred context shutdown failed: {}", e);
        }
    }

    /// Wait for the first line `matcher` accepts, dispatching the rest.
    pub(crate) fn await_reply<T>(
        &mut self,
        timeout: Duration,
        mut matcher: impl FnMut(&str) -> Option<T>,
    ) -> Result<Option<T>, SerialError> {
        let idle = self.channel.idle();
        wait::until(
            Deadline::after(timeout),
            idle,
            || -> Result<Step<T>, SerialError> {
                let Some(line) = self.channel.next_line()? else {
                    return Ok(Step::Idle);
                };
                if let Some(value) = matcher(&line) {
                    return Ok(Step::Done(value));
                }
                self.note_unsolicited(&line)?;
                Ok(Step::Progress)
            },
        )
    }

    /// Wait for a line starting with one of `tokens`; returns its position.
    pub(crate) fn terminal(
        &mut self,
        timeout: Duration,
        tokens: &[&str],
    ) -> Result<Option<usize>, SerialError> {
        self.await_reply(timeout, |line| {
            tokens.iter().position(|token| line.starts_with(token))
        })
    }

    /// Wait for the `>` prompt. `Some(false)` if the modem answered `ERROR`.
    pub(crate) fn await_prompt(&mut self, timeout: Duration) -> Result<Option<bool>, SerialError> {
        let idle = self.channel.idle();
        wait::until(
            Deadline::after(timeout),
            idle,
            || -> Result<Step<bool>, SerialError> {
                if self.channel.take_prompt()? {
                    return Ok(Step::Done(true));
                }
                let Some(line) = self.channel.next_line()? else {
                    return Ok(Step::Idle);
                };
                if line.starts_with(ERROR) {
                    return Ok(Step::Done(false));
                }
                self.note_unsolicited(&line)?;
                Ok(Step::Progress)
            },
        )
    }

    /// Wait until the sends on `index` settle or the port drops.
    pub(crate) fn await_transmission(
        &mut self,
        index: PortIndex,
        timeout: Duration,
    ) -> Result<Option<TransmissionState>, SerialError> {
        let was_connected = self
            .registry
            .get(index)
            .is_some_and(|session| session.is_connected());
        let idle = self.channel.idle();
        wait::until(
            Deadline::after(timeout),
            idle,
            || -> Result<Step<TransmissionState>, SerialError> {
                let Some(session) = self.registry.get(index) else {
                    return Ok(Step::Done(TransmissionState::Error));
                };
                match session.transmission_state() {
                    state @ (TransmissionState::Success | TransmissionState::Error) => {
                        return Ok(Step::Done(state))
                    }
                    _ if was_connected && !session.is_connected() => {
                        return Ok(Step::Done(TransmissionState::Error))
                    }
                    _ => {}
                }
                let Some(line) = self.channel.next_line()? else {
                    return Ok(Step::Idle);
                };
                self.note_unsolicited(&line)?;
                Ok(Step::Progress)
            },
        )
    }

    fn expect_ok(&mut self, body: &str, timeout: Duration, step: &'static str) -> MuxResult<()> {
        self.channel.send(body)?;
        match self.terminal(timeout, &[OK, ERROR])? {
            Some(0) => Ok(()),
            _ => {
                warn!("AT{} failed", body);
                Err(MuxError::ContextSetup { step })
            }
        }
    }
}
