//! Port multiplexing over one modem link.
//!
//! - `registry`: the fixed table of six port sessions
//! - `session`: per-port queues, counters and options
//! - `dispatch`: classification of unsolicited modem lines
//! - `payload`: raw capture of announced inbound data
//! - `handle`: the operations a caller performs on a port
//! - `stream`: the `SocketStream` trait ports implement

pub mod dispatch;
pub mod error;
pub mod handle;
pub mod payload;
pub mod registry;
pub mod session;
pub mod status;
pub mod stream;

pub use dispatch::{dispatch, Notification};
pub use error::{ConnectError, MuxError, MuxResult, WriteError};
pub use handle::{PortHandle, PortReport, UNACKED_UNKNOWN};
pub use payload::{Capture, ReceiveTiming};
pub use registry::{PortIndex, PortRegistry, PORTS};
pub use session::{PortOptions, PortSession, ReceiveQueue, TransmissionState, Transport};
pub use status::{StatusCachePolicy, TcpStatus};
pub use stream::SocketStream;
