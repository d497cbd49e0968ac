//! Serial transport layer.
//!
//! The multiplexer never talks to a device directly; it goes through the
//! `SerialPortAdapter` trait so that real hardware and the scripted mock used
//! by the test-suite are interchangeable.

pub mod error;
pub mod mock;
pub mod sync_port;
pub mod traits;

pub use error::SerialError;
pub use mock::MockSerialPort;
pub use sync_port::SyncSerialPort;
pub use traits::*;
