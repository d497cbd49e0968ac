//! Hardware serial link backed by the `serialport` crate.

use super::error::SerialError;
use super::traits::{LineSettings, SerialPortAdapter};
use std::io::{Read, Write};
use std::time::Duration;

/// Blocking serial link wrapping `serialport::SerialPort`.
pub struct SyncSerialPort {
    port: Box<dyn serialport::SerialPort>,
    name: String,
}

impl SyncSerialPort {
    /// Open the modem device with the given line settings.
    ///
    /// # Example
    /// ```no_run
    /// use simcom_mux::serial::{LineSettings, SyncSerialPort};
    ///
    /// let port = SyncSerialPort::open("/dev/ttyUSB0", LineSettings::default())?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn open(device: &str, settings: LineSettings) -> Result<Self, SerialError> {
        let port = serialport::new(device, settings.baud_rate)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(settings.flow_control.into())
            .timeout(settings.read_timeout)
            .open()
            .map_err(|e| match e.kind() {
                serialport::ErrorKind::NoDevice => SerialError::not_found(device),
                serialport::ErrorKind::InvalidInput => SerialError::config(e.to_string()),
                _ => SerialError::Serial(e),
            })?;

        Ok(Self {
            port,
            name: device.to_string(),
        })
    }
}

impl SerialPortAdapter for SyncSerialPort {
    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, SerialError> {
        self.port.write(data).map_err(SerialError::Io)
    }

    fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<usize, SerialError> {
        self.port.read(buffer).map_err(SerialError::Io)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<(), SerialError> {
        self.port.set_timeout(timeout).map_err(SerialError::Serial)
    }

    fn clear_buffers(&mut self) -> Result<(), SerialError> {
        self.port
            .clear(serialport::ClearBuffer::All)
            .map_err(SerialError::Serial)
    }

    fn bytes_to_read(&self) -> Option<usize> {
        self.port.bytes_to_read().ok().map(|n| n as usize)
    }
}

impl std::fmt::Debug for SyncSerialPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncSerialPort")
            .field("name", &self.name)
            .field("baud_rate", &self.port.baud_rate())
            .finish()
    }
}
