//! Scripted serial link for testing.
//!
//! `MockSerialPort` stands in for a modem: tests queue bytes the "modem"
//! sends spontaneously, and script replies that are released when the driver
//! writes something containing a trigger.

use super::error::SerialError;
use super::traits::SerialPortAdapter;
use memchr::memmem;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

/// One scripted exchange: once a write contains `trigger`, `reply` becomes
/// readable.
#[derive(Debug, Clone)]
struct ScriptedReply {
    trigger: Vec<u8>,
    reply: Vec<u8>,
}

#[derive(Debug, Default)]
struct MockPortState {
    /// Bytes to be returned by read operations.
    read_queue: VecDeque<u8>,
    /// Every write, in order.
    write_log: Vec<Vec<u8>>,
    /// Replies waiting for their trigger, matched strictly in order.
    script: VecDeque<ScriptedReply>,
    /// Whether the next operation should time out.
    should_timeout: bool,
    timeout: Duration,
    buffers_cleared: bool,
}

/// Mock serial link.
///
/// Clones share state, so a test can keep one clone for inspection while the
/// driver owns another.
///
/// # Example
/// ```
/// use simcom_mux::serial::{MockSerialPort, SerialPortAdapter};
///
/// let mut port = MockSerialPort::new("MOCK0");
/// port.reply_to(b"AT+CIPSHUT", b"\r\nSHUT OK\r\n");
///
/// port.write_bytes(b"AT+CIPSHUT\r\n").unwrap();
///
/// let mut buffer = [0u8; 32];
/// let n = port.read_bytes(&mut buffer).unwrap();
/// assert_eq!(&buffer[..n], b"\r\nSHUT OK\r\n");
/// ```
#[derive(Clone)]
pub struct MockSerialPort {
    name: String,
    state: Arc<Mutex<MockPortState>>,
}

impl MockSerialPort {
    /// Create a new mock link with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(Mutex::new(MockPortState {
                timeout: Duration::from_millis(10),
                ..Default::default()
            })),
        }
    }

    /// Make bytes readable immediately, as if the modem sent them unprompted.
    pub fn enqueue_read(&mut self, data: &[u8]) {
        self.state.lock().read_queue.extend(data);
    }

    /// Release `reply` once a write containing `trigger` is seen.
    ///
    /// Scripted replies fire in the order they were registered; a write only
    /// ever releases the reply at the head of the script.
    pub fn reply_to(&mut self, trigger: &[u8], reply: &[u8]) {
        self.state.lock().script.push_back(ScriptedReply {
            trigger: trigger.to_vec(),
            reply: reply.to_vec(),
        });
    }

    /// Number of scripted replies whose trigger has not been written yet.
    pub fn pending_replies(&self) -> usize {
        self.state.lock().script.len()
    }

    /// Get a copy of every write made to the link.
    pub fn get_write_log(&self) -> Vec<Vec<u8>> {
        self.state.lock().write_log.clone()
    }

    /// All written bytes concatenated, lossily decoded for assertions.
    pub fn written_text(&self) -> String {
        let state = self.state.lock();
        let joined: Vec<u8> = state.write_log.concat();
        String::from_utf8_lossy(&joined).into_owned()
    }

    /// Clear the write log.
    pub fn clear_write_log(&mut self) {
        self.state.lock().write_log.clear();
    }

    /// Set whether the next read/write operation should time out.
    pub fn set_should_timeout(&mut self, should_timeout: bool) {
        self.state.lock().should_timeout = should_timeout;
    }

    /// Whether buffers have been cleared.
    pub fn was_cleared(&self) -> bool {
        self.state.lock().buffers_cleared
    }

    /// Number of bytes still waiting to be read.
    pub fn available_bytes(&self) -> usize {
        self.state.lock().read_queue.len()
    }
}

impl SerialPortAdapter for MockSerialPort {
    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, SerialError> {
        let mut state = self.state.lock();

        if state.should_timeout {
            state.should_timeout = false;
            return Err(SerialError::timeout(state.timeout));
        }

        state.write_log.push(data.to_vec());

        let fired = state
            .script
            .front()
            .is_some_and(|next| memmem::find(data, &next.trigger).is_some());
        if fired {
            if let Some(next) = state.script.pop_front() {
                state.read_queue.extend(next.reply);
            }
        }

        Ok(data.len())
    }

    fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<usize, SerialError> {
        let mut state = self.state.lock();

        if state.should_timeout {
            state.should_timeout = false;
            return Err(SerialError::timeout(state.timeout));
        }

        let mut bytes_read = 0;
        for byte in buffer.iter_mut() {
            match state.read_queue.pop_front() {
                Some(queued) => {
                    *byte = queued;
                    bytes_read += 1;
                }
                None => break,
            }
        }

        if bytes_read == 0 {
            Err(SerialError::Io(std::io::Error::new(
                std::io::ErrorKind::WouldBlock,
                "No data available",
            )))
        } else {
            Ok(bytes_read)
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<(), SerialError> {
        self.state.lock().timeout = timeout;
        Ok(())
    }

    fn clear_buffers(&mut self) -> Result<(), SerialError> {
        let mut state = self.state.lock();
        state.read_queue.clear();
        state.buffers_cleared = true;
        Ok(())
    }

    fn bytes_to_read(&self) -> Option<usize> {
        Some(self.available_bytes())
    }
}

impl std::fmt::Debug for MockSerialPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockSerialPort")
            .field("name", &self.name)
            .field("available_bytes", &self.available_bytes())
            .finish()
    }
}
