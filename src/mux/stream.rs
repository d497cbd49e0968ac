//! Byte-stream view of a port.

use super::error::WriteError;
use super::handle::PortHandle;
use crate::serial::SerialPortAdapter;

/// What a client socket needs from a connection.
///
/// Protocol code written against this trait does not care that the bytes
/// travel through a multiplexed modem port.
pub trait SocketStream {
    /// Queue bytes for sending; returns how many were accepted.
    fn write(&mut self, data: &[u8]) -> Result<usize, WriteError>;

    /// Send everything queued.
    fn flush(&mut self) -> Result<(), WriteError>;

    /// Copy received bytes into `buf`; returns how many were copied.
    fn read(&mut self, buf: &mut [u8]) -> usize;

    /// Unread received bytes.
    fn available(&mut self) -> usize;

    fn connected(&mut self) -> bool;

    fn close(&mut self);

    /// Write all of `data` and flush it.
    fn send_all(&mut self, data: &[u8]) -> Result<(), WriteError> {
        self.write(data)?;
        self.flush()
    }

    /// Drain everything received so far into `out`.
    fn read_to_vec(&mut self, out: &mut Vec<u8>) -> usize {
        let mut chunk = [0u8; 256];
        let mut total = 0;
        loop {
            let n = self.read(&mut chunk);
            if n == 0 {
                return total;
            }
            out.extend_from_slice(&chunk[..n]);
            total += n;
        }
    }
}

impl<P: SerialPortAdapter> SocketStream for PortHandle<'_, P> {
    fn write(&mut self, data: &[u8]) -> Result<usize, WriteError> {
        PortHandle::write(self, data)
    }

    fn flush(&mut self) -> Result<(), WriteError> {
        PortHandle::flush(self)
    }

    fn read(&mut self, buf: &mut [u8]) -> usize {
        PortHandle::read(self, buf)
    }

    fn available(&mut self) -> usize {
        self.available_default()
    }

    fn connected(&mut self) -> bool {
        PortHandle::connected(self)
    }

    fn close(&mut self) {
        PortHandle::close(self)
    }
}
