//! Unsolicited notification handling.
//!
//! Every line that is not the answer to the command in flight passes through
//! [`dispatch`]. Port status lines are applied to the registry on the spot;
//! data announcements and context loss are returned to the caller, which
//! owns the link and the deferred work they require.

use super::registry::{PortRegistry, PORTS};
use super::session::TransmissionState;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, trace, warn};

/// `+RECEIVE,<index>,<length>:` header preceding a raw payload.
static RECEIVE_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+RECEIVE,\s*(\d+),\s*(\d+):").expect("valid regex"));

const RECEIVE_MARKER: &str = "+RECEIVE";
const PDP_DEACT_MARKER: &str = "+PDP: DEACT";

const CLOSE_SUFFIX: &str = ", CLOSE";
const SEND_OK_SUFFIX: &str = ", SEND OK";
const SEND_FAIL_SUFFIX: &str = ", SEND FAIL";
const ERROR_SUFFIX: &str = ", ERROR";

/// What a line turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// `length` raw bytes for `index` follow on the link. The index is
    /// unchecked; the payload must be drained either way.
    Incoming { index: usize, length: usize },
    /// The packet data context was dropped by the network.
    ContextDeactivated,
    /// The port's connection went away.
    Closed { index: u8 },
    /// One send was confirmed; `settled` when none remain outstanding.
    SendConfirmed { index: u8, settled: bool },
    /// A send or the connection failed.
    SendFailed { index: u8 },
    /// A notification referenced a bad port or could not be parsed.
    Anomaly(String),
    /// Not a notification this layer acts on.
    Ignored,
}

/// Classify `line` and apply any port state change it carries.
pub fn dispatch(line: &str, registry: &mut PortRegistry) -> Notification {
    if line.starts_with(RECEIVE_MARKER) {
        return parse_receive_header(line);
    }

    if line.starts_with(PDP_DEACT_MARKER) {
        warn!("Packet data context deactivated by the network");
        return Notification::ContextDeactivated;
    }

    if line.starts_with(|c: char| c.is_ascii_digit()) {
        return apply_port_line(line, registry);
    }

    trace!("Ignoring line: {}", line);
    Notification::Ignored
}

fn parse_receive_header(line: &str) -> Notification {
    let parsed = RECEIVE_HEADER.captures(line).and_then(|caps| {
        let index = caps[1].parse::<usize>().ok()?;
        let length = caps[2].parse::<usize>().ok()?;
        Some((index, length))
    });

    match parsed {
        Some((index, length)) => {
            trace!("Port {} announces {} bytes", index, length);
            Notification::Incoming { index, length }
        }
        None => {
            warn!("Malformed data announcement: {}", line);
            Notification::Anomaly(format!("malformed data announcement '{line}'"))
        }
    }
}

fn apply_port_line(line: &str, registry: &mut PortRegistry) -> Notification {
    let digits = line.bytes().take_while(u8::is_ascii_digit).count();
    let Ok(index) = line[..digits].parse::<usize>() else {
        return Notification::Anomaly(format!("unparsable port index in '{line}'"));
    };
    if index >= PORTS {
        warn!("Wrong port index {} in '{}'", index, line);
        return Notification::Anomaly(format!("port index {index} out of range in '{line}'"));
    }

    let suffix = &line[digits..];
    let closed = suffix.starts_with(CLOSE_SUFFIX);
    let sent = suffix.starts_with(SEND_OK_SUFFIX);
    let failed = suffix.starts_with(ERROR_SUFFIX) || suffix.starts_with(SEND_FAIL_SUFFIX);

    if !(closed || sent || failed) {
        trace!("Ignoring port line: {}", line);
        return Notification::Ignored;
    }

    let Some(session) = registry.lookup(index) else {
        warn!("Notification for port {} without a session: {}", index, line);
        return Notification::Anomaly(format!("no session for port {index} in '{line}'"));
    };
    let index = session.index().get();
    let mut outcome = Notification::Ignored;

    if closed {
        debug!("Port {} closed", index);
        session.mark_closed();
        outcome = Notification::Closed { index };
    }
    if sent {
        if session.pending_confirmations() == 0 {
            warn!("Port {} confirmed a send that was never issued", index);
        }
        let settled = session.confirm_send();
        outcome = Notification::SendConfirmed { index, settled };
    }
    if failed {
        warn!("Port {} reported a failed transmission", index);
        session.transmission_state = TransmissionState::Error;
        outcome = Notification::SendFailed { index };
    }
    outcome
}
