//! Line-oriented view of the modem link.
//!
//! The channel buffers whatever the link delivers and hands it out in three
//! shapes: complete text lines, the bare `>` transmit prompt, and exact runs
//! of raw bytes. Raw reads always drain the line buffer first, so a payload
//! announced by a header line is never tokenized.

use crate::serial::{SerialError, SerialPortAdapter};
use crate::wait::{self, Deadline, Step};
use memchr::memchr;
use std::time::Duration;
use tracing::{debug, trace};

/// Size of a single read from the link.
const READ_CHUNK: usize = 256;

/// AT command channel over a serial link.
#[derive(Debug)]
pub struct AtChannel<P: SerialPortAdapter> {
    port: P,
    /// Bytes read from the link but not handed out yet.
    rx: Vec<u8>,
    /// Sleep between empty polls.
    idle: Duration,
}

impl<P: SerialPortAdapter> AtChannel<P> {
    pub fn new(port: P, idle: Duration) -> Self {
        Self {
            port,
            rx: Vec::with_capacity(READ_CHUNK),
            idle,
        }
    }

    /// Idle interval used by bounded waits on this channel.
    pub fn idle(&self) -> Duration {
        self.idle
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }

    /// Send `AT<body>\r\n`.
    pub fn send(&mut self, body: &str) -> Result<(), SerialError> {
        debug!("-> AT{}", body);
        let mut command = Vec::with_capacity(body.len() + 4);
        command.extend_from_slice(b"AT");
        command.extend_from_slice(body.as_bytes());
        command.extend_from_slice(b"\r\n");
        self.write_raw(&command)
    }

    /// Write raw bytes, retrying until the link accepted all of them.
    pub fn write_raw(&mut self, mut data: &[u8]) -> Result<(), SerialError> {
        while !data.is_empty() {
            let written = self.port.write_bytes(data)?;
            if written == 0 {
                return Err(SerialError::Io(std::io::Error::new(
                    std::io::ErrorKind::WriteZero,
                    "serial link accepted no bytes",
                )));
            }
            data = &data[written..];
        }
        Ok(())
    }

    /// Pull whatever the link has right now into the buffer.
    ///
    /// Returns the number of new bytes; an idle link yields zero.
    fn fill(&mut self) -> Result<usize, SerialError> {
        let mut chunk = [0u8; READ_CHUNK];
        match self.port.read_bytes(&mut chunk) {
            Ok(n) => {
                self.rx.extend_from_slice(&chunk[..n]);
                Ok(n)
            }
            Err(e) if e.is_idle() => Ok(0),
            Err(e) => Err(e),
        }
    }

    /// Split off the next non-empty line already sitting in the buffer.
    fn take_buffered_line(&mut self) -> Option<String> {
        while let Some(end) = memchr(b'\n', &self.rx) {
            let raw: Vec<u8> = self.rx.drain(..=end).collect();
            let text = String::from_utf8_lossy(&raw);
            let line = text.trim_end_matches(['\r', '\n']).trim_start_matches('\r');
            if !line.is_empty() {
                trace!("<- {}", line);
                return Some(line.to_string());
            }
        }
        None
    }

    /// Next complete line, reading the link at most once.
    ///
    /// Blank lines are skipped. Never blocks longer than one link read.
    pub fn next_line(&mut self) -> Result<Option<String>, SerialError> {
        if let Some(line) = self.take_buffered_line() {
            return Ok(Some(line));
        }
        if self.fill()? == 0 {
            return Ok(None);
        }
        Ok(self.take_buffered_line())
    }

    /// Consume the `>` transmit prompt if it is at the head of the buffer.
    ///
    /// Leading line terminators are discarded; anything else at the head
    /// means a line has to be dealt with first.
    pub fn take_prompt(&mut self) -> Result<bool, SerialError> {
        if self.rx.is_empty() {
            self.fill()?;
        }
        let skip = self
            .rx
            .iter()
            .take_while(|b| matches!(b, b'\r' | b'\n'))
            .count();
        self.rx.drain(..skip);

        if self.rx.first() != Some(&b'>') {
            return Ok(false);
        }
        let end = if self.rx.get(1) == Some(&b' ') { 2 } else { 1 };
        self.rx.drain(..end);
        trace!("<- >");
        Ok(true)
    }

    /// Fill `buffer` with raw bytes, stopping at `deadline`.
    ///
    /// Returns how many bytes were stored; fewer than `buffer.len()` means
    /// the deadline passed first.
    pub fn read_exact_bytes(
        &mut self,
        buffer: &mut [u8],
        deadline: Deadline,
    ) -> Result<usize, SerialError> {
        let mut filled = 0;
        let idle = self.idle;
        wait::until(deadline, idle, || -> Result<Step<()>, SerialError> {
            if filled < buffer.len() && self.rx.is_empty() && self.fill()? == 0 {
                return Ok(Step::Idle);
            }
            let take = (buffer.len() - filled).min(self.rx.len());
            buffer[filled..filled + take].copy_from_slice(&self.rx[..take]);
            self.rx.drain(..take);
            filled += take;
            Ok(if filled == buffer.len() {
                Step::Done(())
            } else {
                Step::Progress
            })
        })?;
        Ok(filled)
    }

    /// Drop everything received so far, buffered or still in the link.
    pub fn discard_input(&mut self) -> Result<(), SerialError> {
        self.rx.clear();
        self.port.clear_buffers()
    }

    /// Bytes buffered by the channel and not handed out yet.
    pub fn buffered(&self) -> usize {
        self.rx.len()
    }
}
