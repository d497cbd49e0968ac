//! SIMCom modem multiplexer library
//!
//! This library drives up to six TCP/UDP connections through a single AT
//! command link to a SIMCom GSM/GPRS modem, keeping unsolicited
//! notifications and raw inbound payloads apart on the shared serial line.
//!
//! # Modules
//!
//! - `config`: Configuration management with TOML support
//! - `serial`: Serial link abstraction (real device and scripted mock)
//! - `at`: Line-oriented AT command channel
//! - `wait`: Bounded polling primitive every wait goes through
//! - `mux`: Port registry, sessions, notification dispatch and port handles
//! - `modem`: The execution context owning the link and the registry
//! - `logging`: Tracing subscriber setup

pub mod at;
pub mod config;
pub mod logging;
pub mod modem;
pub mod mux;
pub mod serial;
pub mod wait;

// Re-export commonly used types for convenience
pub use modem::Modem;
pub use mux::{
    ConnectError, MuxError, MuxResult, PortHandle, PortIndex, PortOptions, SocketStream,
    StatusCachePolicy, TcpStatus, TransmissionState, Transport, WriteError, PORTS,
};
pub use serial::{MockSerialPort, SerialError, SerialPortAdapter, SyncSerialPort};

// Re-export config types
pub use config::{Config, ConfigError, ConfigLoader, ConfigResult};
