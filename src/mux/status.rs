//! Connection status reported by `+CIPSTATUS` and `+CIPACK` parsing.

use serde::{Deserialize, Serialize};

/// Comma-separated field of a `+CIPSTATUS:` line carrying the state keyword.
///
/// `+CIPSTATUS: <n>,<bearer>,<TCP|UDP>,<ip>,<port>,<state>`
const STATUS_FIELD: usize = 5;

/// Field of a `+CIPACK:` line with the unacknowledged byte count.
///
/// `+CIPACK: <sent>,<acked>,<nacked>`
const UNACKED_FIELD: usize = 2;

/// Connection state of one modem port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TcpStatus {
    Initial,
    Connecting,
    Connected,
    RemoteClosing,
    Closing,
    Closed,
    Unknown,
}

impl TcpStatus {
    /// Map the modem's keyword, quotes already stripped.
    pub fn from_keyword(keyword: &str) -> Self {
        match keyword {
            "INITIAL" => Self::Initial,
            "CONNECTING" => Self::Connecting,
            "CONNECTED" => Self::Connected,
            "REMOTE CLOSING" => Self::RemoteClosing,
            "CLOSING" => Self::Closing,
            "CLOSED" => Self::Closed,
            _ => Self::Unknown,
        }
    }
}

impl std::fmt::Display for TcpStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let keyword = match self {
            Self::Initial => "INITIAL",
            Self::Connecting => "CONNECTING",
            Self::Connected => "CONNECTED",
            Self::RemoteClosing => "REMOTE CLOSING",
            Self::Closing => "CLOSING",
            Self::Closed => "CLOSED",
            Self::Unknown => "UNKNOWN",
        };
        f.write_str(keyword)
    }
}

/// Which polled statuses `connected()` may answer from cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusCachePolicy {
    /// Only a CONNECTED answer is reused; anything else is re-polled.
    #[default]
    ConnectedOnly,
    /// Every answer is reused until the window expires.
    All,
}

impl StatusCachePolicy {
    pub fn admits(self, status: TcpStatus) -> bool {
        match self {
            Self::ConnectedOnly => status == TcpStatus::Connected,
            Self::All => true,
        }
    }
}

/// Payload of a reply line after its `+TAG:` prefix, split on commas.
fn fields<'a>(line: &'a str, tag: &str) -> Option<Vec<&'a str>> {
    let rest = line.strip_prefix(tag)?;
    Some(rest.trim_start().split(',').map(str::trim).collect())
}

/// Parse a `+CIPSTATUS:` line. `None` if the line is malformed.
pub fn parse_status_line(line: &str) -> Option<TcpStatus> {
    let fields = fields(line, "+CIPSTATUS:")?;
    let keyword = fields.get(STATUS_FIELD)?.trim_matches('"');
    Some(TcpStatus::from_keyword(keyword))
}

/// Parse a `+CIPACK:` line into the unacknowledged byte count.
pub fn parse_ack_line(line: &str) -> Option<u32> {
    let fields = fields(line, "+CIPACK:")?;
    fields.get(UNACKED_FIELD)?.parse().ok()
}
